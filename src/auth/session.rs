//! Session persistence for the credential pair.
//!
//! The session is a single named slot holding one serialized credential
//! record. It is only ever replaced wholesale: there is deliberately no way
//! to update one token of the pair without the other.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Session file name in the session directory
const SESSION_FILE: &str = "session.json";

/// The stored access/renewal token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// A half-populated pair is invalid and reads as absent everywhere.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

/// Owner of the durable session record.
///
/// The client takes this as an injected dependency; nothing else writes the
/// record.
#[async_trait]
pub trait SessionStore: Send + Sync + fmt::Debug {
    /// Read the stored credential. Missing, unparseable, and half-populated
    /// records all read as `None`.
    async fn load(&self) -> Option<Credential>;

    /// Replace the stored credential wholesale.
    async fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove the stored credential. Clearing an empty store is a no-op.
    async fn clear(&self);
}

// ============================================================================
// FileSessionStore
// ============================================================================

/// File-backed session store: one JSON record, replaced atomically.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    cached: RwLock<Option<Credential>>,
}

impl FileSessionStore {
    pub fn new(session_dir: &Path) -> Self {
        Self {
            path: session_dir.join(SESSION_FILE),
            cached: RwLock::new(None),
        }
    }

    /// Create with an explicit record path.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            cached: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_record(&self) -> Option<Credential> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Credential>(&contents) {
            Ok(credential) if credential.is_complete() => Some(credential),
            Ok(_) => {
                warn!("stored session is missing a token, treating as absent");
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to parse stored session, treating as absent");
                None
            }
        }
    }

    fn write_record(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create session directory")?;
        }
        let contents = serde_json::to_string_pretty(credential)?;

        // Write-then-rename keeps the slot whole-record atomic.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace session file")?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Option<Credential> {
        {
            let cached = self.cached.read().await;
            if cached.is_some() {
                return cached.clone();
            }
        }

        let loaded = self.read_record();
        if loaded.is_some() {
            let mut cached = self.cached.write().await;
            *cached = loaded.clone();
        }
        loaded
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if !credential.is_complete() {
            bail!("refusing to store a half-populated credential");
        }
        self.write_record(credential)?;
        let mut cached = self.cached.write().await;
        *cached = Some(credential.clone());
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    async fn clear(&self) {
        {
            let mut cached = self.cached.write().await;
            *cached = None;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("session cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "failed to remove session file"),
        }
    }
}

// ============================================================================
// MemorySessionStore
// ============================================================================

/// In-memory session store for tests and short-lived embedders.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    credential: RwLock<Option<Credential>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(Some(credential)),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Option<Credential> {
        let credential = self.credential.read().await;
        credential.clone().filter(Credential::is_complete)
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if !credential.is_complete() {
            bail!("refusing to store a half-populated credential");
        }
        let mut slot = self.credential.write().await;
        *slot = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) {
        let mut slot = self.credential.write().await;
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn credential() -> Credential {
        Credential::new("access-token", "refresh-token")
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        assert!(store.load().await.is_none());

        store.save(&credential()).await.unwrap();
        assert_eq!(store.load().await, Some(credential()));

        // A fresh store over the same directory sees the same record.
        let reopened = FileSessionStore::new(dir.path());
        assert_eq!(reopened.load().await, Some(credential()));
    }

    #[tokio::test]
    async fn test_file_store_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        // Clearing an empty store is a no-op, not an error.
        store.clear().await;

        store.save(&credential()).await.unwrap();
        store.clear().await;
        store.clear().await;
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_file_store_unparseable_record_reads_absent() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_half_populated_record_reads_absent() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        std::fs::write(
            store.path(),
            r#"{"accessToken": "only-access", "refreshToken": ""}"#,
        )
        .unwrap();

        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_save_refuses_half_populated_credential() {
        let store = MemorySessionStore::new();
        let result = store.save(&Credential::new("access", "")).await;
        assert!(result.is_err());
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemorySessionStore::with_credential(credential());
        assert_eq!(store.load().await, Some(credential()));

        let replaced = Credential::new("new-access", "new-refresh");
        store.save(&replaced).await.unwrap();
        assert_eq!(store.load().await, Some(replaced));

        store.clear().await;
        assert!(store.load().await.is_none());
    }
}
