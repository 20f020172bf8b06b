//! Atomic counters on top of the entry store.
//!
//! The read-modify-write runs inside the DashMap entry guard for the key, so
//! concurrent increments on the same key serialize on its shard lock and no
//! update is lost.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use stash_core::{CacheError, CacheResult, CacheValue};
use time::OffsetDateTime;
use tokio::time::Instant;

use crate::store::{MemoryStore, StoredEntry, deadline};

/// Adds `delta` to the counter value held by `value`.
fn checked_apply(key: &str, value: &CacheValue, delta: i64) -> CacheResult<i64> {
    let current = value
        .as_integer()
        .ok_or_else(|| CacheError::type_mismatch(key, value.kind()))?;
    current
        .checked_add(delta)
        .ok_or_else(|| CacheError::overflow(key, current, delta))
}

/// Negates a decrement amount, rejecting `i64::MIN`.
pub(crate) fn negate_delta(key: &str, delta: i64) -> CacheResult<i64> {
    delta
        .checked_neg()
        .ok_or_else(|| CacheError::overflow(key, 0, delta))
}

impl MemoryStore {
    pub(crate) fn apply_delta(
        &self,
        key: &str,
        delta: i64,
        ttl_if_created: Option<Duration>,
    ) -> CacheResult<i64> {
        // Capacity is checked before taking the entry guard; `len()` would
        // otherwise deadlock on our own shard.
        self.ensure_capacity(key)?;

        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
                let next = checked_apply(key, &occupied.get().value, delta)?;
                let entry = occupied.get_mut();
                entry.value = Arc::new(CacheValue::Integer(next));
                entry.updated_at = OffsetDateTime::now_utc();
                Ok(next)
            }
            Entry::Occupied(mut occupied) => {
                // Expired counters restart from zero with a fresh lifetime.
                if let Some(at) = occupied.get().expires_at {
                    self.expiry.remove(at, key);
                }
                self.expired.fetch_add(1, Ordering::Relaxed);
                occupied.insert(self.fresh_counter(key, delta, now, ttl_if_created));
                Ok(delta)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.fresh_counter(key, delta, now, ttl_if_created));
                Ok(delta)
            }
        }
    }

    fn fresh_counter(
        &self,
        key: &str,
        initial: i64,
        now: Instant,
        ttl: Option<Duration>,
    ) -> StoredEntry {
        let expires_at = deadline(now, ttl);
        if let Some(at) = expires_at {
            self.expiry.insert(at, key);
        }
        StoredEntry::new(CacheValue::Integer(initial), expires_at)
    }
}
