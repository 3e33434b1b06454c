use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{KvStore, StoreError, StoreResult};
use crate::core::types::MediaFormat;

/// Key of the process-wide request counter
pub const TOTAL_REQUESTS_KEY: &str = "total_requests";

/// Cached result of one resolution.
///
/// Serialized with the field names `url` / `thumbnail` / `publicId`, which is
/// how entries already sitting in the store are laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "url")]
    pub media_url: String,
    #[serde(rename = "thumbnail", default)]
    pub thumbnail_url: Option<String>,
    #[serde(rename = "publicId", default, skip_serializing_if = "Option::is_none")]
    pub storage_id: Option<String>,
}

/// Store key for a (source url, format) pair.
pub fn cache_key(url: &str, format: MediaFormat) -> String {
    format!("instagram:{}:{}", urlencoding::encode(url), format)
}

/// Resolution cache on top of the key-value store.
#[derive(Clone)]
pub struct ResolutionCache {
    store: Arc<dyn KvStore>,
}

impl ResolutionCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Returns the cached entry, or None if absent or expired.
    pub async fn lookup(&self, url: &str, format: MediaFormat) -> StoreResult<Option<CacheEntry>> {
        let key = cache_key(url, format);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key,
                reason: e.to_string(),
            })
    }

    /// Caches an entry for `ttl`. No update path: a live entry is only
    /// replaced by a fresh resolution after it expired.
    pub async fn remember(&self, url: &str, format: MediaFormat, entry: &CacheEntry, ttl: Duration) -> StoreResult<()> {
        let key = cache_key(url, format);
        let value = serde_json::to_string(entry).map_err(|e| StoreError::Corrupt {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.store.set_ex(&key, &value, ttl).await?;
        log::info!("Cached {} resolution under {}", format, key);
        Ok(())
    }
}

/// Process-wide request counter persisted in the store.
#[derive(Clone)]
pub struct RequestCounter {
    store: Arc<dyn KvStore>,
}

impl RequestCounter {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn increment(&self) -> StoreResult<i64> {
        self.store.incr(TOTAL_REQUESTS_KEY).await
    }

    /// Current count; 0 when nothing was counted yet.
    pub async fn current(&self) -> StoreResult<i64> {
        match self.store.get(TOTAL_REQUESTS_KEY).await? {
            Some(raw) => raw.trim().parse::<i64>().map_err(|e| StoreError::Corrupt {
                key: TOTAL_REQUESTS_KEY.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(0),
        }
    }
}
