//! Request-scoped cache regions.
//!
//! Each inbound request gets its own isolated key/value region, created on
//! first use and released when the request ends. Regions never expire on
//! their own; regions left behind by callers that forget to clear them are
//! reclaimed by the sweeper once they have been idle long enough.
//!
//! ## Lifecycle
//!
//! ```text
//! absent ──request_cache(id)──▶ active ──clear_request_cache(id)──▶ cleared
//!                                  │
//!                                  └──idle > threshold (sweeper)──▶ cleared
//! ```
//!
//! A handle that outlives its region rejects writes with
//! `CacheError::RegionNotFound` and reads as empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use stash_core::{CacheError, CacheResult, CacheValue};
use time::OffsetDateTime;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct RegionState {
    entries: HashMap<String, Arc<CacheValue>>,
    cleared: bool,
}

#[derive(Debug)]
struct Region {
    request_id: String,
    state: RwLock<RegionState>,
    created_at: Instant,
    created_wall: OffsetDateTime,
    /// Milliseconds after `created_at` of the most recent access.
    last_access_ms: AtomicU64,
}

impl Region {
    fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            state: RwLock::new(RegionState::default()),
            created_at: Instant::now(),
            created_wall: OffsetDateTime::now_utc(),
            last_access_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = Instant::now().saturating_duration_since(self.created_at);
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.last_access_ms.fetch_max(millis, Ordering::Relaxed);
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let last = self.created_at
            + Duration::from_millis(self.last_access_ms.load(Ordering::Relaxed));
        now.saturating_duration_since(last)
    }

    fn retire(&self) {
        let mut state = self.state.write();
        state.cleared = true;
        state.entries = HashMap::new();
    }
}

/// Handle to one request's isolated cache region.
///
/// Handles are cheap to clone; every handle for the same request id shares
/// the same underlying region.
#[derive(Debug, Clone)]
pub struct RequestCache {
    region: Arc<Region>,
}

impl RequestCache {
    /// The request identifier this region belongs to.
    pub fn request_id(&self) -> &str {
        &self.region.request_id
    }

    /// Wall-clock time the region was created.
    pub fn created_at(&self) -> OffsetDateTime {
        self.region.created_wall
    }

    /// Stores a value in this region, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::RegionNotFound` if the region has been cleared.
    pub fn set(&self, key: impl Into<String>, value: impl Into<CacheValue>) -> CacheResult<()> {
        self.region.touch();
        let mut state = self.region.state.write();
        if state.cleared {
            return Err(CacheError::region_not_found(&self.region.request_id));
        }
        state.entries.insert(key.into(), Arc::new(value.into()));
        Ok(())
    }

    /// Returns the value stored under `key` in this region.
    pub fn get(&self, key: &str) -> Option<Arc<CacheValue>> {
        self.region.touch();
        self.region.state.read().entries.get(key).cloned()
    }

    /// Removes `key` from this region. Returns `true` if it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.region.touch();
        self.region.state.write().entries.remove(key).is_some()
    }

    /// Keys currently stored in this region, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.region.state.read().entries.keys().cloned().collect()
    }

    /// Number of keys in this region.
    pub fn len(&self) -> usize {
        self.region.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate serialized size of the region's keys and values, in bytes.
    pub fn size(&self) -> usize {
        self.region
            .state
            .read()
            .entries
            .iter()
            .map(|(key, value)| key.len() + value.estimated_size())
            .sum()
    }

    /// Returns `false` once the region has been cleared or reclaimed.
    pub fn is_active(&self) -> bool {
        !self.region.state.read().cleared
    }
}

/// Registry statistics for monitoring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegionStats {
    /// Regions currently registered.
    pub active: usize,
    /// Regions created since startup.
    pub created: u64,
    /// Regions released by an explicit clear.
    pub cleared: u64,
    /// Regions reclaimed after sitting idle.
    pub reclaimed: u64,
}

/// Registry mapping request ids to their regions.
#[derive(Debug, Default)]
pub struct RegionRegistry {
    regions: DashMap<String, Arc<Region>>,
    created: AtomicU64,
    cleared: AtomicU64,
    reclaimed: AtomicU64,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the region for `request_id`, creating an empty one if needed.
    pub fn get_or_create(&self, request_id: &str) -> RequestCache {
        // Touch under the shard lock so `reclaim_idle` cannot retire the
        // region between lookup and return.
        let guard = self
            .regions
            .entry(request_id.to_string())
            .or_insert_with(|| {
                self.created.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(request_id = %request_id, "request cache created");
                Arc::new(Region::new(request_id))
            });
        guard.touch();
        RequestCache {
            region: Arc::clone(&guard),
        }
    }

    /// Returns the region for `request_id` without creating one.
    pub fn get(&self, request_id: &str) -> Option<RequestCache> {
        let guard = self.regions.get(request_id)?;
        guard.touch();
        Some(RequestCache {
            region: Arc::clone(&guard),
        })
    }

    /// Releases the region for `request_id`. Unknown ids are a no-op.
    pub fn clear(&self, request_id: &str) -> bool {
        match self.regions.remove(request_id) {
            Some((_, region)) => {
                region.retire();
                self.cleared.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Reclaims regions idle for at least `threshold`. Returns how many were removed.
    pub fn reclaim_idle(&self, threshold: Duration) -> usize {
        let now = Instant::now();
        let mut reclaimed = 0;

        self.regions.retain(|_, region| {
            if region.idle_for(now) >= threshold {
                region.retire();
                reclaimed += 1;
                false
            } else {
                true
            }
        });

        if reclaimed > 0 {
            self.reclaimed
                .fetch_add(reclaimed as u64, Ordering::Relaxed);
            tracing::debug!(reclaimed, "idle request caches reclaimed");
        }
        reclaimed
    }

    /// Number of registered regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn stats(&self) -> RegionStats {
        RegionStats {
            active: self.regions.len(),
            created: self.created.load(Ordering::Relaxed),
            cleared: self.cleared.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
        }
    }
}
