use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use super::{KvStore, StoreError, StoreResult};

/// Value stored with an optional expiry deadline
#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

#[derive(Default)]
struct Inner {
    values: HashMap<String, StoredValue>,
    sorted_sets: HashMap<String, HashMap<String, i64>>,
}

/// In-process key-value store with TTL.
///
/// A single mutex guards all state, which is what makes `incr` and `zrem`
/// atomic here. Nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired values. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let before = inner.values.len();
        inner.values.retain(|_, v| v.is_live(now));
        let removed = before - inner.values.len();
        log::debug!("Cleaned up {} expired store entries", removed);
        removed
    }

    /// Number of members currently in a sorted set.
    pub async fn sorted_set_len(&self, key: &str) -> usize {
        self.inner.lock().await.sorted_sets.get(key).map_or(0, HashMap::len)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        match inner.values.get(key) {
            Some(stored) if stored.is_live(now) => Ok(Some(stored.value.clone())),
            Some(_) => {
                inner.values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.values.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        let current = match inner.values.get(key) {
            Some(stored) if stored.is_live(now) => stored.value.parse::<i64>().map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?,
            _ => 0,
        };

        let next = current + 1;
        inner.values.insert(
            key.to_string(),
            StoredValue {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .sorted_sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrange_due(&self, key: &str, max_score: i64, limit: usize) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().await;
        let Some(set) = inner.sorted_sets.get(key) else {
            return Ok(Vec::new());
        };

        let mut due: Vec<(&String, i64)> = set
            .iter()
            .filter(|(_, score)| **score <= max_score)
            .map(|(member, &score)| (member, score))
            .collect();
        due.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        Ok(due.into_iter().take(limit).map(|(member, _)| member.clone()).collect())
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .sorted_sets
            .get_mut(key)
            .and_then(|set| set.remove(member))
            .is_some())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn purge_expired(&self) -> usize {
        self.cleanup().await
    }
}
