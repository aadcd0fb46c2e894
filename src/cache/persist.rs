// src/cache/persist.rs

//! Background mirror of hot-cache status changes into the durable store.
//!
//! The drain runs on a fixed interval rather than per event: scheduler
//! callbacks arrive far too often for one store write each. Every tick it
//!
//! 1. takes the deduplicated pending map from the cache,
//! 2. groups task ids by target status,
//! 3. writes each group in chunks of at most `batch_size` ids,
//! 4. re-queues a chunk whose write failed.
//!
//! ```ignore
//! let drain = PersistenceDrain::new(cache, store).with_interval(Duration::from_millis(500));
//! tokio::spawn(drain.run(shutdown_token));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::HotCache;
use crate::model::TaskId;
use crate::status::TaskStatus;
use crate::store::Store;

pub const DEFAULT_DRAIN_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Counters for a single drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub batches: usize,
    pub written: usize,
    pub requeued: usize,
}

pub struct PersistenceDrain {
    cache: Arc<HotCache>,
    store: Arc<dyn Store>,
    interval: Duration,
    batch_size: usize,
}

impl PersistenceDrain {
    pub fn new(cache: Arc<HotCache>, store: Arc<dyn Store>) -> Self {
        Self {
            cache,
            store,
            interval: Duration::from_millis(DEFAULT_DRAIN_INTERVAL_MS),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Tick period. Anything below one millisecond is raised to it.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Cap on ids per store write. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run one drain pass.
    pub async fn drain_once(&self) -> DrainStats {
        let pending = self.cache.take_pending();
        let mut stats = DrainStats::default();
        if pending.is_empty() {
            return stats;
        }

        let mut groups: BTreeMap<TaskStatus, Vec<TaskId>> = BTreeMap::new();
        for (id, status) in pending {
            groups.entry(status).or_default().push(id);
        }

        for (status, mut ids) in groups {
            ids.sort();
            for chunk in ids.chunks(self.batch_size) {
                stats.batches += 1;
                match self.store.batch_update_task_status(chunk, status).await {
                    Ok(updated) => {
                        stats.written += chunk.len();
                        debug!(?status, ids = chunk.len(), updated, "persisted task statuses");
                    }
                    Err(err) => {
                        warn!(?status, ids = chunk.len(), error = %err, "status batch write failed; re-queueing");
                        stats.requeued += chunk.len();
                        self.cache.requeue(chunk.iter().map(|id| (*id, status)));
                    }
                }
            }
        }

        stats
    }

    /// Drain on every tick until `shutdown` fires, then drain one last time.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            batch_size = self.batch_size,
            "persistence drain starting"
        );

        let mut interval = tokio::time::interval(self.interval);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    break;
                }

                _ = interval.tick() => {
                    let stats = self.drain_once().await;
                    if stats.batches > 0 {
                        debug!(?stats, "drain pass complete");
                    }
                }
            }
        }

        let stats = self.drain_once().await;
        info!(?stats, "persistence drain stopped after final pass");
    }
}
