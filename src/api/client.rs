//! Authorized API client for the Homekey backend.
//!
//! Every data request runs through the token lifecycle: a pre-flight expiry
//! check (renew before sending, fail fast when no session exists), bearer
//! attachment, reactive rejection detection on the response, and at most one
//! renew-and-resend before collapsing to `ApiError::RequireLogin`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::claims::{self, Claims};
use crate::auth::refresh::{HttpTokenRefresher, TokenRefresher};
use crate::auth::session::{Credential, FileSessionStore, SessionStore};
use crate::config::{Config, APP_NAME};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default timeout for renewal calls in seconds (see `auth::refresh`).
const REFRESH_TIMEOUT_SECS: u64 = 10;

/// Application-level marker the backend's token filter attaches to a
/// rejected access token.
const TOKEN_REJECTED_MARKER: &str = "ERROR_ACCESS_TOKEN";

/// Login path handled by the backend's form-login filter chain
const LOGIN_PATH: &str = "/api/member/login";

// ============================================================================
// Wire types
// ============================================================================

/// Member record returned by a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberInfo {
    pub email: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub social: bool,
    #[serde(rename = "roleNames", default)]
    pub roles: Vec<String>,
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Application-level error envelope (`{"error": "..."}`).
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: String,
}

/// Extract the application-level error marker, if the body is an envelope.
fn error_marker(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error)
}

/// A rejection is either a bare 401 or the backend's JSON marker; both come
/// from the same server-side token filter and take the same renewal branch.
fn is_token_rejection(status: StatusCode, body: &[u8]) -> bool {
    if status == StatusCode::UNAUTHORIZED {
        return true;
    }
    matches!(error_marker(body).as_deref(), Some(TOKEN_REJECTED_MARKER))
}

fn finish(status: StatusCode, body: Vec<u8>) -> Result<Vec<u8>, ApiError> {
    if status.is_success() {
        Ok(body)
    } else {
        Err(ApiError::from_status(status, &String::from_utf8_lossy(&body)))
    }
}

// ============================================================================
// Client
// ============================================================================

/// API client for the Homekey backend.
/// Clone is cheap - the shared state lives behind an `Arc`.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn TokenRefresher>,
    /// Serializes check-expiry-then-renew-then-save across concurrent calls.
    refresh_gate: Mutex<()>,
    timeout: Duration,
}

impl ApiClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let session_dir = config
            .resolve_session_dir()
            .map_err(|e| ApiError::Config(e.to_string()))?;
        Self::builder()
            .base_url(config.api_base_url.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .refresh_timeout(Duration::from_secs(config.refresh_timeout_secs))
            .session_store(Arc::new(FileSessionStore::new(&session_dir)))
            .build()
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Log in with the platform's form endpoint and persist the returned
    /// credential pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<MemberInfo, ApiError> {
        let url = format!("{}{}", self.inner.base_url, LOGIN_PATH);
        let response = self
            .inner
            .http
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .timeout(self.inner.timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?.to_vec();
        if !status.is_success() {
            return Err(ApiError::from_status(status, &String::from_utf8_lossy(&body)));
        }

        // The login handler answers 200 for both outcomes; failures carry an
        // error envelope instead of a member record.
        if let Some(marker) = error_marker(&body) {
            return Err(ApiError::AccessDenied(format!("login rejected: {}", marker)));
        }

        let member: MemberInfo = serde_json::from_slice(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("login response: {}", e)))?;

        let credential = Credential::new(member.access_token.clone(), member.refresh_token.clone());
        if !credential.is_complete() {
            return Err(ApiError::InvalidResponse(
                "login response is missing the token pair".to_string(),
            ));
        }
        self.inner
            .store
            .save(&credential)
            .await
            .map_err(|e| ApiError::Config(e.to_string()))?;

        info!(email = %member.email, "logged in");
        Ok(member)
    }

    /// Drop the stored session. Safe to call when already logged out.
    pub async fn logout(&self) {
        self.inner.store.clear().await;
        info!("logged out");
    }

    /// Claims of the currently stored access token; `None` when logged out
    /// or the stored token is unreadable.
    pub async fn current_user(&self) -> Option<Claims> {
        let credential = self.inner.store.load().await?;
        claims::decode(&credential.access_token)
    }

    /// Whether a session record exists at all. An expired session still
    /// counts: it may be renewable on the next request.
    pub async fn has_session(&self) -> bool {
        self.inner.store.load().await.is_some()
    }

    // ========================================================================
    // Typed request helpers
    // ========================================================================
    //
    // Paths are absolute API paths, e.g. `/api/news/list`.

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.authorized(Method::GET, path, None::<&()>).await?;
        parse_json(&body)
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = self.authorized(Method::POST, path, Some(body)).await?;
        parse_json(&body)
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = self.authorized(Method::PUT, path, Some(body)).await?;
        parse_json(&body)
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.authorized(Method::DELETE, path, None::<&()>).await?;
        Ok(())
    }

    // ========================================================================
    // Token lifecycle orchestration
    // ========================================================================

    /// Run one request through the full lifecycle and return the final
    /// success body.
    async fn authorized<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Vec<u8>, ApiError> {
        let mut access = self.preflight().await?;
        let mut refresh_consumed = false;

        loop {
            let (status, response_body) =
                self.send_once(method.clone(), path, body, &access).await?;

            if !is_token_rejection(status, &response_body) {
                return finish(status, response_body);
            }

            if refresh_consumed {
                // The renewed token was rejected too; one retry is the
                // contract, the caller has to re-authenticate.
                warn!(path = path, "renewed token rejected, giving up");
                return Err(ApiError::RequireLogin);
            }
            refresh_consumed = true;

            debug!(path = path, status = %status, "access token rejected by server, renewing once");
            access = self.refresh_credential(&access).await?.access_token;
        }
    }

    /// Pre-flight: fail with `RequireLogin` before any network traffic when
    /// no session exists; renew when the stored token is expired.
    async fn preflight(&self) -> Result<String, ApiError> {
        let credential = match self.inner.store.load().await {
            Some(credential) => credential,
            None => return Err(ApiError::RequireLogin),
        };

        // An undecodable token counts as expired, not as rejected: the
        // client never verifies signatures, it only reads the expiry.
        let expired = claims::decode(&credential.access_token)
            .map(|c| c.is_expired())
            .unwrap_or(true);
        if !expired {
            return Ok(credential.access_token);
        }

        debug!("access token expired locally, renewing before send");
        let renewed = self.refresh_credential(&credential.access_token).await?;
        Ok(renewed.access_token)
    }

    /// Single-flight renewal. `stale_access` is the access token the caller
    /// observed as unusable; whoever holds the gate first performs the
    /// network renewal, later holders find the freshly saved pair and skip.
    ///
    /// The work runs in a spawned task so a caller that gives up mid-renewal
    /// does not cancel the renewal other calls are waiting on; only the
    /// abandoned call's retry dies with its future.
    async fn refresh_credential(&self, stale_access: &str) -> Result<Credential, ApiError> {
        let inner = Arc::clone(&self.inner);
        let stale_access = stale_access.to_owned();

        let renewal = tokio::spawn(async move {
            let _gate = inner.refresh_gate.lock().await;

            // Always re-read under the gate: the renewal token may have
            // rotated since the failing request was issued.
            let current = match inner.store.load().await {
                Some(credential) => credential,
                None => return Err(ApiError::RequireLogin),
            };
            if current.access_token != stale_access {
                debug!("credential already renewed by a concurrent call");
                return Ok(current);
            }

            match inner.refresher.refresh(&current).await {
                Ok(renewed) => {
                    inner
                        .store
                        .save(&renewed)
                        .await
                        .map_err(|e| ApiError::Config(e.to_string()))?;
                    info!("credential renewed");
                    Ok(renewed)
                }
                Err(e) => {
                    warn!(error = %e, "renewal failed, clearing session");
                    inner.store.clear().await;
                    Err(ApiError::RequireLogin)
                }
            }
        });

        renewal
            .await
            .map_err(|e| ApiError::Config(format!("renewal task failed: {}", e)))?
    }

    async fn send_once<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        access_token: &str,
    ) -> Result<(StatusCode, Vec<u8>), ApiError> {
        let url = format!("{}{}", self.inner.base_url, path);
        let mut request = self
            .inner
            .http
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .timeout(self.inner.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        // Transport failures are not authorization failures; they pass
        // through untouched.
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?.to_vec();
        Ok((status, bytes))
    }
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ApiClient`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    store: Option<Arc<dyn SessionStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    timeout: Option<Duration>,
    refresh_timeout: Option<Duration>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend origin, e.g. `http://localhost:8080`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Inject a session store. Defaults to a [`FileSessionStore`] in the
    /// platform cache directory.
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Inject a token refresher. Defaults to the backend's renewal endpoint.
    pub fn token_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ApiError::Config("base_url is required".to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let timeout = self
            .timeout
            .unwrap_or(Duration::from_secs(REQUEST_TIMEOUT_SECS));
        let refresh_timeout = self
            .refresh_timeout
            .unwrap_or(Duration::from_secs(REFRESH_TIMEOUT_SECS));

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        let store = match self.store {
            Some(store) => store,
            None => {
                let dir = dirs::cache_dir()
                    .map(|d| d.join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from("."));
                Arc::new(FileSessionStore::new(&dir))
            }
        };

        let refresher = match self.refresher {
            Some(refresher) => refresher,
            None => Arc::new(
                HttpTokenRefresher::new(http.clone(), base_url.clone())
                    .with_timeout(refresh_timeout),
            ),
        };

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                store,
                refresher,
                refresh_gate: Mutex::new(()),
                timeout,
            }),
        })
    }
}
