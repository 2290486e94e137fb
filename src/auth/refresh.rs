//! Access-token renewal against the identity backend.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::claims;
use super::session::Credential;

/// Renewal endpoint path on the backend
const REFRESH_PATH: &str = "/api/member/refresh";

/// Default timeout for renewal calls in seconds.
/// Separate from the data-request timeout so a hung identity backend cannot
/// stall the fail-fast-to-login contract.
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum RefreshError {
    /// The backend rejected the renewal token or returned nothing usable.
    /// Unrecoverable for the current session.
    #[error("Renewal denied: {0}")]
    Denied(String),

    /// The identity backend could not be reached.
    #[error("Renewal transport error: {0}")]
    Network(String),
}

/// Exchanges a renewal token for a fresh credential pair.
#[async_trait]
pub trait TokenRefresher: Send + Sync + fmt::Debug {
    async fn refresh(&self, current: &Credential) -> Result<Credential, RefreshError>;
}

/// Renewal response body. Both fields are optional on the wire: the backend
/// has been observed to answer 200 without rotating the pair.
#[derive(Debug, Default, Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken", default)]
    access_token: Option<String>,
    #[serde(rename = "refreshToken", default)]
    refresh_token: Option<String>,
}

/// Refresher backed by the platform's `/api/member/refresh` endpoint.
#[derive(Debug)]
pub struct HttpTokenRefresher {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTokenRefresher {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_REFRESH_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, current: &Credential) -> Result<Credential, RefreshError> {
        let url = format!("{}{}", self.base_url, REFRESH_PATH);

        let response = self
            .http
            .get(&url)
            .query(&[("refreshToken", current.refresh_token.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RefreshError::Denied(format!("status {}: {}", status, body)));
        }

        // Anything that is not a rotated pair falls through to the echo
        // handling below, including an unparseable 200 body.
        let body = response
            .text()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;
        let parsed: RefreshResponse = serde_json::from_str(&body).unwrap_or_default();

        match (parsed.access_token, parsed.refresh_token) {
            (Some(access), Some(renewal)) if !access.is_empty() && !renewal.is_empty() => {
                debug!("renewal endpoint rotated the credential pair");
                Ok(Credential::new(access, renewal))
            }
            _ => {
                // Compatibility shim: the backend answered 200 without a
                // rotated pair. Tolerated only while the current access
                // token is still live; expiry is never papered over.
                match claims::decode(&current.access_token) {
                    Some(c) if !c.is_expired() => {
                        warn!("renewal endpoint returned no rotated pair; re-using current credential");
                        Ok(current.clone())
                    }
                    _ => Err(RefreshError::Denied(
                        "renewal endpoint returned no rotated pair and the access token is expired"
                            .to_string(),
                    )),
                }
            }
        }
    }
}
