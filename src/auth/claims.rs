//! Access-token claims decoding.
//!
//! The backend issues signed JWTs; the client never verifies the signature
//! (the server owns verification) and only reads the payload segment to
//! drive local expiry decisions.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Claims carried in the access token payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Member email; doubles as the account identifier.
    pub email: String,
    #[serde(default)]
    pub nickname: Option<String>,
    /// True for social-login accounts.
    #[serde(default)]
    pub social: bool,
    #[serde(rename = "roleNames", default)]
    pub roles: Vec<String>,
    /// Expiry instant as Unix seconds.
    pub exp: i64,
}

impl Claims {
    /// Expiry instant, if it is representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Expired at or after the expiry instant. Equality counts as expired
    /// so a token is never sent with zero remaining lifetime.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Decode the payload segment of an access token.
///
/// Returns `None` for anything that is not a three-segment token carrying a
/// base64url JSON payload, so callers can treat malformed exactly like
/// expired.
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(header), Some(payload), Some(_signature), None)
            if !header.is_empty() && !payload.is_empty() =>
        {
            payload
        }
        _ => return None,
    };

    // Some issuers pad the segment; the unpadded alphabet rejects that.
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_token(payload: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"typ":"JWT","alg":"HS256"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
        format!("{}.{}.signature", header, body)
    }

    #[test]
    fn test_decode_full_payload() {
        let token = make_token(&serde_json::json!({
            "email": "user@example.com",
            "nickname": "tester",
            "social": false,
            "roleNames": ["USER", "ADMIN"],
            "exp": 1_900_000_000i64,
        }));

        let claims = decode(&token).expect("token decodes");
        assert_eq!(claims.email, "user@example.com");
        assert_eq!(claims.nickname.as_deref(), Some("tester"));
        assert_eq!(claims.roles, vec!["USER", "ADMIN"]);
        assert!(claims.has_role("ADMIN"));
        assert!(!claims.has_role("MANAGER"));
        assert_eq!(claims.exp, 1_900_000_000);
    }

    #[test]
    fn test_decode_minimal_payload() {
        // Social-login tokens may omit nickname and roles entirely.
        let token = make_token(&serde_json::json!({
            "email": "kakao@example.com",
            "exp": 1_900_000_000i64,
        }));

        let claims = decode(&token).expect("token decodes");
        assert!(claims.nickname.is_none());
        assert!(claims.roles.is_empty());
    }

    #[test]
    fn test_decode_tolerates_padded_payload() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"typ":"JWT"}"#);
        let body = base64::engine::general_purpose::URL_SAFE
            .encode(br#"{"email":"a@b.c","exp":1}"#);
        let token = format!("{}.{}.sig", header, body);

        assert!(decode(&token).is_some());
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert!(decode("").is_none());
        assert!(decode("only-one-segment").is_none());
        assert!(decode("two.segments").is_none());
        assert!(decode("a.b.c.d").is_none());
        assert!(decode("header.!!!not-base64!!!.sig").is_none());

        // Valid base64 but not a JSON object
        let garbage = URL_SAFE_NO_PAD.encode(b"plain text");
        assert!(decode(&format!("h.{}.s", garbage)).is_none());
    }

    #[test]
    fn test_expiry_boundary_is_closed() {
        let now = Utc::now();
        let claims = Claims {
            email: "user@example.com".to_string(),
            nickname: None,
            social: false,
            roles: vec![],
            exp: now.timestamp(),
        };

        // Equality counts as expired.
        assert!(claims.is_expired_at(now));

        let future = Claims {
            exp: now.timestamp() + 1,
            ..claims.clone()
        };
        assert!(!future.is_expired_at(now));

        let past = Claims {
            exp: now.timestamp() - 1,
            ..claims
        };
        assert!(past.is_expired_at(now));
    }

    #[test]
    fn test_expires_at_round_trip() {
        let claims = Claims {
            email: "user@example.com".to_string(),
            nickname: None,
            social: false,
            roles: vec![],
            exp: 1_900_000_000,
        };
        let instant = claims.expires_at().expect("representable");
        assert_eq!(instant.timestamp(), 1_900_000_000);
    }
}
