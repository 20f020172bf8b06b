//! Background expiration sweeper.
//!
//! Lazy expiry on reads keeps results correct; the sweeper only reclaims
//! memory held by expired entries nobody reads again, and releases request
//! regions that were never cleared. A panic inside one sweep is logged and
//! the task carries on with the next tick.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use stash_core::{CacheBackend, PurgeBatch};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::region::RegionRegistry;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired entries removed from the global keyspace.
    pub expired: usize,
    /// Idle request regions released.
    pub regions_reclaimed: usize,
}

/// Sweeper settings derived from the cache configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub batch_size: usize,
    /// `None` disables idle region reclamation.
    pub region_idle: Option<Duration>,
}

#[derive(Debug, Clone)]
pub(crate) struct Sweeper {
    backend: Arc<dyn CacheBackend>,
    regions: Arc<RegionRegistry>,
    config: SweeperConfig,
}

impl Sweeper {
    pub(crate) fn new(
        backend: Arc<dyn CacheBackend>,
        regions: Arc<RegionRegistry>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            backend,
            regions,
            config,
        }
    }

    /// Start the sweeper in a background task.
    ///
    /// The task runs until `true` is sent on `shutdown` or its sender is dropped.
    pub(crate) fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_ms = self.config.interval.as_millis() as u64,
                batch_size = self.config.batch_size,
                "Cache sweeper started"
            );

            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Cache sweeper shutting down");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let report = self.sweep_yielding().await;
                        if report != SweepReport::default() {
                            debug!(
                                expired = report.expired,
                                regions_reclaimed = report.regions_reclaimed,
                                "Cache sweep completed"
                            );
                        }
                    }
                }
            }
        })
    }

    /// Runs one full sweep, yielding to the scheduler between batches.
    async fn sweep_yielding(&self) -> SweepReport {
        let mut report = SweepReport::default();
        loop {
            let Some(batch) = self.purge_batch() else {
                break;
            };
            report.expired += batch.removed;
            if batch.examined < self.config.batch_size {
                break;
            }
            tokio::task::yield_now().await;
        }
        report.regions_reclaimed = self.reclaim_regions();
        report
    }

    /// Runs one full sweep on the calling thread.
    pub(crate) fn sweep_now(&self) -> SweepReport {
        let mut report = SweepReport::default();
        while let Some(batch) = self.purge_batch() {
            report.expired += batch.removed;
            if batch.examined < self.config.batch_size {
                break;
            }
        }
        report.regions_reclaimed = self.reclaim_regions();
        report
    }

    /// Purges one batch. Returns `None` if the batch panicked.
    fn purge_batch(&self) -> Option<PurgeBatch> {
        let batch_size = self.config.batch_size;
        match catch_unwind(AssertUnwindSafe(|| self.backend.purge_expired(batch_size))) {
            Ok(batch) => Some(batch),
            Err(panic) => {
                error!(panic = %panic_message(&*panic), "Expired entry sweep failed");
                None
            }
        }
    }

    fn reclaim_regions(&self) -> usize {
        let Some(threshold) = self.config.region_idle else {
            return 0;
        };
        match catch_unwind(AssertUnwindSafe(|| self.regions.reclaim_idle(threshold))) {
            Ok(reclaimed) => reclaimed,
            Err(panic) => {
                error!(panic = %panic_message(&*panic), "Request cache reclamation failed");
                0
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use stash_core::CacheValue;

    fn sweeper(store: Arc<MemoryStore>, regions: Arc<RegionRegistry>, batch_size: usize) -> Sweeper {
        Sweeper::new(
            store,
            regions,
            SweeperConfig {
                interval: Duration::from_millis(100),
                batch_size,
                region_idle: Some(Duration::from_secs(60)),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_now_drains_all_batches() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..10 {
            store
                .set(&format!("k{i}"), CacheValue::from(i), Some(Duration::from_secs(1)))
                .unwrap();
        }
        tokio::time::advance(Duration::from_secs(2)).await;

        let report = sweeper(Arc::clone(&store), Arc::new(RegionRegistry::new()), 3).sweep_now();
        assert_eq!(report.expired, 10);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_reclaims_memory() {
        let store = Arc::new(MemoryStore::new());
        let regions = Arc::new(RegionRegistry::new());
        store
            .set("temp", CacheValue::from(1), Some(Duration::from_millis(250)))
            .unwrap();
        regions.get_or_create("forgotten");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = sweeper(Arc::clone(&store), Arc::clone(&regions), 16).spawn(shutdown_rx);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.len(), 0);
        assert!(regions.is_empty());

        shutdown_tx.send_replace(true);
        handle.await.unwrap();
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
