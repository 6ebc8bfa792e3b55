//! Redis backend
//!
//! Values are plain strings written with `SET ... EX`, so Redis handles
//! expiry and an absent key is the "never posted" state.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use std::time::Duration;

use super::{KvStore, StoreResult};
use crate::config::StoreConfig;
use crate::utils::error::StoreError;

/// Redis-backed store
pub struct RedisStore {
    /// Connection pool
    pool: Pool,
    /// Key prefix for namespacing
    key_prefix: String,
}

impl RedisStore {
    /// Create the pool and verify connectivity
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let pool_config = PoolConfig::from_url(&config.redis_url);
        let pool = pool_config
            .builder()
            .map_err(|e| StoreError::Connection(format!("Failed to create pool builder: {e}")))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Connection(format!("Failed to create Redis pool: {e}")))?;

        let store = Self {
            pool,
            key_prefix: config.key_prefix.clone(),
        };

        if !store.health_check().await? {
            return Err(StoreError::Connection("Redis did not answer PING".to_string()));
        }

        tracing::info!(url = %config.redis_url, prefix = %store.key_prefix, "Connected to Redis");
        Ok(store)
    }

    /// Namespaced key
    fn key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    async fn conn(&self) -> StoreResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let result: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(result == "PONG")
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(self.key(key)).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        // SET EX rejects 0
        let secs = ttl.as_secs().max(1);
        let _: () = conn.set_ex(self.key(key), value, secs).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
