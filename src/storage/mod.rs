//! Key-value storage for the post marker
//!
//! The gate only needs `get` and `put`-with-expiry on string values. Three
//! backends are provided:
//!
//! - [`MemoryStore`]: process-local, lost on restart
//! - [`FileStore`]: a small JSON document on disk
//! - [`RedisStore`]: shared Redis, keys namespaced by a prefix
//!
//! # Example
//!
//! ```rust,ignore
//! use wikitimelines::storage::{open_store, KvStore};
//!
//! let store = open_store(&config.store, clock.clone()).await?;
//! store.put("last_post_at", "2024-06-01T12:00:00Z", ttl).await?;
//! ```

pub mod file;
pub mod redis;

pub use self::file::FileStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::{StoreBackend, StoreConfig};
use crate::gate::Clock;
use crate::utils::error::StoreError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// String key-value store with per-key expiry
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key; expired or absent keys read as `None`
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a key that expires after `ttl`
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Backend name for logs
    fn backend(&self) -> &'static str;
}

/// Open the configured backend
///
/// # Errors
///
/// Returns an error if the Redis pool cannot be created or the server does
/// not answer PING.
pub async fn open_store(
    config: &StoreConfig,
    clock: Arc<dyn Clock>,
) -> StoreResult<Arc<dyn KvStore>> {
    let store: Arc<dyn KvStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new(clock)),
        StoreBackend::File => Arc::new(FileStore::new(&config.file_path, clock)),
        StoreBackend::Redis => Arc::new(RedisStore::connect(config).await?),
    };

    tracing::info!(backend = store.backend(), "Marker store ready");
    Ok(store)
}

/// Compute the absolute expiry of a write made at `now`
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> StoreResult<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| StoreError::Corrupt(format!("ttl of {}s is out of range", ttl.as_secs())))
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local store
///
/// Expiry is evaluated lazily against the injected clock.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Whether the store has no live entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let expires_at = expiry_after(self.clock.now(), ttl)?;
        self.entries.write().await.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
