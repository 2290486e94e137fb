//! Client configuration management.
//!
//! This module handles loading and saving the client configuration,
//! which includes the backend origin and the two request timeouts.
//!
//! Configuration is stored at `~/.config/homekey/config.json`. Every field
//! has a default, so embedders can also build a `Config` in code and hand
//! it to `ApiClient::from_config`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/session directory paths
pub(crate) const APP_NAME: &str = "homekey";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default backend origin (the platform serves its API on 8080)
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

/// Default data-request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default renewal-call timeout in seconds.
/// Kept short: a hung renewal must not stall the fail-fast-to-login path.
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_refresh_timeout() -> u64 {
    DEFAULT_REFRESH_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
    /// Directory holding the session record; platform cache dir when unset.
    #[serde(default)]
    pub session_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
            refresh_timeout_secs: default_refresh_timeout(),
            session_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the persisted session record.
    pub fn resolve_session_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.session_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:8080");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.refresh_timeout_secs, 10);
        assert!(config.session_dir.is_none());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_base_url": "https://api.homekey.kr"}"#).unwrap();
        assert_eq!(config.api_base_url, "https://api.homekey.kr");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.refresh_timeout_secs, 10);
    }

    #[test]
    fn test_explicit_session_dir_wins() {
        let config = Config {
            session_dir: Some(PathBuf::from("/tmp/homekey-test")),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_session_dir().unwrap(),
            PathBuf::from("/tmp/homekey-test")
        );
    }
}
