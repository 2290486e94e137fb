//! Core client library for the Homekey real-estate platform.
//!
//! Frontends (web, admin, chatbot) talk to the backend through this crate;
//! it owns the bearer-token lifecycle so callers never handle a token
//! directly:
//!
//! - **Pre-flight**: an access token that is expired (or unreadable) is
//!   renewed before the request leaves the client; a missing session fails
//!   fast with [`ApiError::RequireLogin`] and zero network traffic.
//! - **Reactive**: a server-side rejection (HTTP 401 or the platform's
//!   `ERROR_ACCESS_TOKEN` body marker) triggers exactly one renewal and one
//!   resend of the original request.
//! - **Terminal**: when the renewal token itself is refused, the session is
//!   cleared and the caller receives [`ApiError::RequireLogin`]; surfacing
//!   the login prompt is the caller's job.
//!
//! # Example
//!
//! ```no_run
//! use homekey::ApiClient;
//!
//! # async fn example() -> Result<(), homekey::ApiError> {
//! let client = ApiClient::builder()
//!     .base_url("http://localhost:8080")
//!     .build()?;
//!
//! client.login("user@example.com", "password").await?;
//!
//! // Renewal and the single retry happen behind this call when needed.
//! let news: serde_json::Value = client.get("/api/news/list").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiError, ClientBuilder, MemberInfo};
pub use auth::{
    Claims, Credential, FileSessionStore, HttpTokenRefresher, MemorySessionStore, RefreshError,
    SessionStore, TokenRefresher,
};
pub use config::Config;
