//! Deferred deletion of uploaded objects.
//!
//! An mp3 upload is kept alive for a short window so the client can fetch it,
//! then deleted. Instead of an in-process timer, each deletion is recorded in
//! the store as a sorted-set member scored by its due time (unix seconds), and
//! [`CleanupWorker`] polls for due members. With Redis behind the store a
//! restart does not lose pending deletions.
//!
//! There is no retry: a failed delete is logged and dropped.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::uploads::{ObjectStore, ResourceType};
use super::{KvStore, StoreResult};
use crate::core::metrics;

/// Sorted set holding pending deletions
pub const CLEANUP_QUEUE_KEY: &str = "cleanup:pending";

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Records deletions to run later.
#[derive(Clone)]
pub struct CleanupScheduler {
    store: Arc<dyn KvStore>,
    delay: Duration,
}

impl CleanupScheduler {
    pub fn new(store: Arc<dyn KvStore>, delay: Duration) -> Self {
        Self { store, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules deletion of `storage_id` one delay from now. Returns the due
    /// time in unix seconds.
    pub async fn schedule(&self, storage_id: &str) -> StoreResult<i64> {
        self.schedule_from(storage_id, unix_now()).await
    }

    /// Same as [`schedule`](Self::schedule) with an explicit "now".
    pub async fn schedule_from(&self, storage_id: &str, now: i64) -> StoreResult<i64> {
        let delay = i64::try_from(self.delay.as_secs()).unwrap_or(i64::MAX);
        let due_at = now.saturating_add(delay);
        self.store.zadd(CLEANUP_QUEUE_KEY, storage_id, due_at).await?;
        log::info!("Scheduled deletion of {} at {} (+{}s)", storage_id, due_at, delay);
        Ok(due_at)
    }
}

/// Background worker that runs due deletions.
pub struct CleanupWorker {
    store: Arc<dyn KvStore>,
    object_store: Arc<dyn ObjectStore>,
    resource_type: ResourceType,
    poll_interval: Duration,
    batch_size: usize,
}

impl CleanupWorker {
    pub fn new(
        store: Arc<dyn KvStore>,
        object_store: Arc<dyn ObjectStore>,
        resource_type: ResourceType,
        poll_interval: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            object_store,
            resource_type,
            poll_interval,
            batch_size: batch_size.max(1),
        }
    }

    /// Runs every deletion due now. Returns how many objects were deleted.
    pub async fn run_once(&self) -> StoreResult<usize> {
        self.run_due(unix_now()).await
    }

    /// Runs every deletion due at `now`.
    ///
    /// A member is only acted on by the worker whose `zrem` removed it, so
    /// several instances sharing one Redis never delete the same object twice.
    pub async fn run_due(&self, now: i64) -> StoreResult<usize> {
        let due = self.store.zrange_due(CLEANUP_QUEUE_KEY, now, self.batch_size).await?;
        let mut deleted = 0;

        for storage_id in due {
            if !self.store.zrem(CLEANUP_QUEUE_KEY, &storage_id).await? {
                log::debug!("Deletion of {} claimed by another worker", storage_id);
                continue;
            }

            match self.object_store.delete(&storage_id, self.resource_type).await {
                Ok(()) => {
                    log::info!("Deleted {} from {}", storage_id, self.object_store.name());
                    metrics::record_cleanup(true);
                    deleted += 1;
                }
                Err(e) => {
                    log::error!("Failed to delete {} from {}: {}", storage_id, self.object_store.name(), e);
                    metrics::record_cleanup(false);
                }
            }
        }

        Ok(deleted)
    }

    /// Polls until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        log::info!(
            "Cleanup worker started (poll every {}s)",
            self.poll_interval.as_secs()
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("Cleanup worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        log::error!("Cleanup poll failed: {}", e);
                    }
                }
            }
        }
    }
}
