//! JSON file backend
//!
//! The whole store is a single JSON object `{ key: { value, expires_at } }`.
//! Writes go to a temp file first and are renamed into place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{expiry_after, KvStore, StoreResult};
use crate::gate::Clock;
use crate::utils::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

type FileState = HashMap<String, FileEntry>;

/// Store persisted to a local JSON file
pub struct FileStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store backed by `path`; the file is created on first write
    pub fn new(path: &Path, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.to_path_buf(),
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StoreResult<FileState> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(FileState::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::Corrupt(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileState::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &FileState) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        tokio::fs::write(&temp_path, bytes).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::debug!(path = %self.path.display(), "State file saved");
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let _guard = self.lock.lock().await;
        let now = self.clock.now();
        let state = self.load().await?;
        Ok(state
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let _guard = self.lock.lock().await;
        let now = self.clock.now();
        let expires_at = expiry_after(now, ttl)?;

        let mut state = self.load().await?;
        state.retain(|_, e| e.expires_at > now);
        state.insert(
            key.to_string(),
            FileEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        self.save(&state).await
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
