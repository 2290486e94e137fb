//! REST API client module for the Homekey backend.
//!
//! This module provides the `ApiClient` that wraps every call in the
//! bearer-token lifecycle: pre-flight expiry check, automatic renewal, and
//! a single reactive retry when the server rejects a token.
//!
//! The backend uses JWT bearer authentication; tokens are obtained through
//! the member login endpoint and renewed through the refresh endpoint.

pub mod client;
pub mod error;

pub use client::{ApiClient, ClientBuilder, MemberInfo};
pub use error::ApiError;
