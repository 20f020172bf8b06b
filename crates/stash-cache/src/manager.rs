//! The cache manager façade.
//!
//! A [`CacheManager`] owns one global keyspace, one request-region registry
//! and the background sweeper. It is constructed explicitly at startup and
//! shared with request handlers behind an `Arc`; there is no process-wide
//! instance.
//!
//! ```
//! use std::time::Duration;
//! use stash_cache::{CacheConfig, CacheManager};
//!
//! let cache = CacheManager::new(CacheConfig::default()).unwrap();
//! cache.set("product:1", "widget", Some(Duration::from_secs(60))).unwrap();
//! assert!(cache.exists("product:1"));
//!
//! let request = cache.request_cache("req-42");
//! request.set("user", "alice").unwrap();
//! cache.clear_request_cache("req-42");
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use stash_core::{
    CacheBackend, CacheError, CacheResult, CacheStats, CacheValue, EntryInfo, GlobPattern, Ttl,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::batch;
use crate::config::{BackendKind, CacheConfig};
use crate::counter::negate_delta;
use crate::region::{RegionRegistry, RegionStats, RequestCache};
use crate::store::MemoryStore;
use crate::sweeper::{SweepReport, Sweeper};

/// Combined statistics for the keyspace and the region registry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManagerStats {
    pub store: CacheStats,
    /// Percentage of global-keyspace reads that found a live value.
    pub hit_rate: f64,
    pub regions: RegionStats,
}

/// Layered in-process cache: global keyspace, counters, batch operations,
/// pattern invalidation and request-scoped regions.
#[derive(Debug)]
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    regions: Arc<RegionRegistry>,
    config: CacheConfig,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheManager {
    /// Create a manager with the built-in memory store and no background sweeper.
    ///
    /// Lazy expiry keeps reads correct without a sweeper; call
    /// [`CacheManager::start_sweeper`] or use [`CacheManager::start`] to also
    /// reclaim memory in the background.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::InvalidConfig` if the configuration is invalid or
    /// names a custom backend.
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        if config.backend == BackendKind::Custom {
            return Err(CacheError::invalid_config(
                "cache.backend = \"custom\" requires CacheManager::with_backend",
            ));
        }
        let backend = Arc::new(MemoryStore::with_max_entries(config.max_entries));
        Self::with_backend(config, backend)
    }

    /// Create a manager over a caller-supplied backend.
    pub fn with_backend(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> CacheResult<Self> {
        config.validate().map_err(CacheError::invalid_config)?;
        Ok(Self {
            backend,
            regions: Arc::new(RegionRegistry::new()),
            config,
            shutdown_tx: watch::Sender::new(false),
            sweeper: Mutex::new(None),
        })
    }

    /// Create a manager and start its background sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: CacheConfig) -> CacheResult<Self> {
        let manager = Self::new(config)?;
        manager.start_sweeper()?;
        Ok(manager)
    }

    /// Spawn the background sweeper if it is not already running.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Internal` when called outside a tokio runtime or
    /// after [`CacheManager::shutdown`].
    pub fn start_sweeper(&self) -> CacheResult<()> {
        if *self.shutdown_tx.borrow() {
            return Err(CacheError::internal("cache manager has been shut down"));
        }
        tokio::runtime::Handle::try_current()
            .map_err(|e| CacheError::internal(format!("sweeper needs a tokio runtime: {e}")))?;

        let mut slot = self.sweeper.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }
        let sweeper = Sweeper::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.regions),
            self.config.sweeper(),
        );
        *slot = Some(sweeper.spawn(self.shutdown_tx.subscribe()));
        Ok(())
    }

    /// Returns `true` while the background sweeper task is alive.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Cache sweeper task ended abnormally");
            }
        }
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Store a value.
    ///
    /// `ttl = None` applies the configured default TTL; `Some(Duration::ZERO)`
    /// stores the value without expiration.
    pub fn set(
        &self,
        key: &str,
        value: impl Into<CacheValue>,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        self.backend.set(key, value.into(), self.resolve_ttl(ttl))
    }

    /// Get a live value. Absence is `Ok(None)`.
    pub fn get(&self, key: &str) -> CacheResult<Option<Arc<CacheValue>>> {
        self.backend.get(key)
    }

    /// Get a live value, treating absence as `CacheError::NotFound`.
    pub fn get_required(&self, key: &str) -> CacheResult<Arc<CacheValue>> {
        self.backend
            .get(key)?
            .ok_or_else(|| CacheError::not_found(key))
    }

    pub fn exists(&self, key: &str) -> bool {
        self.backend.exists(key)
    }

    /// Remove a key. Returns `true` if a live value was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.backend.delete(key)
    }

    pub fn ttl(&self, key: &str) -> CacheResult<Ttl> {
        self.backend.ttl(key)
    }

    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        self.backend.entry_info(key)
    }

    /// Atomically add `delta` to a counter, creating it at zero if absent.
    pub fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.backend
            .increment(key, delta, self.config.default_ttl())
    }

    /// Atomically subtract `delta` from a counter.
    pub fn decrement(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.increment(key, negate_delta(key, delta)?)
    }

    /// Write several keys with the same TTL. See [`CacheManager::set`] for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::PartialBatch` if any key failed; the others are written.
    pub fn set_multiple<I, K, V>(&self, entries: I, ttl: Option<Duration>) -> CacheResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CacheValue>,
    {
        batch::set_multiple(self.backend.as_ref(), entries, self.resolve_ttl(ttl))
    }

    /// Read several keys. Absent keys are omitted from the result.
    pub fn get_multiple<I, K>(&self, keys: I) -> CacheResult<HashMap<String, Arc<CacheValue>>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        batch::get_multiple(self.backend.as_ref(), keys)
    }

    /// Delete several keys. Returns how many live values were removed.
    pub fn delete_multiple<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        batch::delete_multiple(self.backend.as_ref(), keys)
    }

    /// Remove every live key matching a `*` glob. Returns the number removed.
    pub fn invalidate(&self, pattern: &str) -> CacheResult<usize> {
        let pattern = GlobPattern::parse(pattern)?;
        self.backend.invalidate(&pattern)
    }

    /// Remove every key from the global keyspace. Request regions are untouched.
    pub fn clear(&self) {
        self.backend.clear();
    }

    /// Handle to the region for `request_id`, created empty on first use.
    pub fn request_cache(&self, request_id: &str) -> RequestCache {
        self.regions.get_or_create(request_id)
    }

    /// Release the region for `request_id`. Unknown ids are a no-op.
    pub fn clear_request_cache(&self, request_id: &str) {
        self.regions.clear(request_id);
    }

    /// Run one sweep on the calling thread.
    pub fn sweep_now(&self) -> SweepReport {
        Sweeper::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.regions),
            self.config.sweeper(),
        )
        .sweep_now()
    }

    pub fn stats(&self) -> ManagerStats {
        let store = self.backend.stats();
        ManagerStats {
            hit_rate: store.hit_rate(),
            store,
            regions: self.regions.stats(),
        }
    }

    fn resolve_ttl(&self, ttl: Option<Duration>) -> Option<Duration> {
        match ttl {
            Some(d) if d.is_zero() => None,
            Some(d) => Some(d),
            None => self.config.default_ttl(),
        }
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
