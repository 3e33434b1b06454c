//! Storage layer: key-value store, resolution cache, object store and the
//! deferred cleanup queue.
//!
//! The key-value store is the only shared mutable state in the service. It
//! holds cached resolutions (with TTL), the request counter and the pending
//! remote deletions. Production uses Redis; [`MemoryStore`] mirrors the same
//! semantics in-process for development and tests.

pub mod cache;
pub mod cleanup;
pub mod memory;
pub mod redis_store;
pub mod uploads;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use cache::{cache_key, CacheEntry, RequestCounter, ResolutionCache};
pub use cleanup::{CleanupScheduler, CleanupWorker};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Errors from the key-value store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt value under '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Minimal key-value surface the service needs.
///
/// Mirrors the Redis commands it maps to (GET, SET EX, INCR, ZADD,
/// ZRANGEBYSCORE, ZREM) so that `MemoryStore` and `RedisStore` behave the same.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Backend name for logs and the health endpoint
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `value` and expires it after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Atomically increments an integer counter, creating it at 0 first.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Adds (or reschedules) `member` in a sorted set with `score`.
    async fn zadd(&self, key: &str, member: &str, score: i64) -> StoreResult<()>;

    /// Members with score <= `max_score`, lowest first, at most `limit`.
    async fn zrange_due(&self, key: &str, max_score: i64, limit: usize) -> StoreResult<Vec<String>>;

    /// Removes `member`; returns true only for the caller that removed it.
    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn ping(&self) -> StoreResult<()>;

    /// Drops expired values. Backends that expire keys themselves do nothing.
    async fn purge_expired(&self) -> usize {
        0
    }
}

/// Connects the configured store: Redis when a URL is given, otherwise the
/// in-process fallback.
pub async fn connect(redis_url: Option<&str>) -> StoreResult<Arc<dyn KvStore>> {
    match redis_url {
        Some(url) => {
            let store = RedisStore::connect(url).await?;
            log::info!("Connected to redis store");
            Ok(Arc::new(store))
        }
        None => {
            log::warn!("No redis URL configured, using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
