//! In-memory entry store for the global keyspace.
//!
//! ## Expiration
//!
//! Expiry is checked lazily on every read path: an entry whose deadline has
//! passed is removed and reported absent. Entries with a TTL are also
//! recorded in an [`ExpiryIndex`] so the background sweeper can reclaim
//! memory for keys nobody reads again.
//!
//! ## Locking
//!
//! Per-key operations take a single DashMap shard lock. The expiry index is
//! only ever locked while a shard lock is held, or with no shard lock at
//! all, never the other way round.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use stash_core::{
    CacheBackend, CacheError, CacheResult, CacheStats, CacheValue, EntryInfo, GlobPattern,
    PurgeBatch, Ttl,
};
use time::OffsetDateTime;
use tokio::time::Instant;

use crate::expiry::ExpiryIndex;

/// Batch size used when the store purges expired entries on its own.
const CAPACITY_PURGE_BATCH: usize = 1024;

/// Deadline for a TTL starting at `now`.
///
/// A TTL too large for the clock to represent is stored without expiration.
pub(crate) fn deadline(now: Instant, ttl: Option<Duration>) -> Option<Instant> {
    ttl.and_then(|d| now.checked_add(d))
}

/// A stored value with its lifetime metadata.
#[derive(Debug, Clone)]
pub(crate) struct StoredEntry {
    pub(crate) value: Arc<CacheValue>,
    pub(crate) expires_at: Option<Instant>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl StoredEntry {
    pub(crate) fn new(value: CacheValue, expires_at: Option<Instant>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            value: Arc::new(value),
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if this entry has expired.
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn ttl(&self, now: Instant) -> Ttl {
        match self.expires_at {
            None => Ttl::Persistent,
            Some(at) => Ttl::Remaining(at.saturating_duration_since(now)),
        }
    }
}

/// Thread-safe in-memory keyspace backed by DashMap.
///
/// This is the default [`CacheBackend`]. It can be shared across threads and
/// async tasks behind an `Arc`.
#[derive(Debug)]
pub struct MemoryStore {
    pub(crate) entries: DashMap<String, StoredEntry>,
    pub(crate) expiry: ExpiryIndex,
    /// Soft bound on the number of keys; 0 means unlimited.
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    pub(crate) expired: AtomicU64,
    invalidated: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::with_max_entries(0)
    }

    /// Create a store that rejects new keys beyond `max_entries` (0 = unlimited).
    ///
    /// Live entries are never evicted to make room; expired entries are
    /// purged first and the write fails only if the store is still full.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            expiry: ExpiryIndex::new(),
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            invalidated: AtomicU64::new(0),
        }
    }

    /// Number of deadlines tracked by the expiry index, stale ones included.
    pub fn pending_deadlines(&self) -> usize {
        self.expiry.len()
    }

    /// Makes room for a new key if the store is bounded.
    ///
    /// Must not be called while holding a shard guard: `len()` locks every shard.
    pub(crate) fn ensure_capacity(&self, key: &str) -> CacheResult<()> {
        if self.max_entries == 0 || self.entries.contains_key(key) {
            return Ok(());
        }
        if self.entries.len() < self.max_entries {
            return Ok(());
        }

        while self.purge_expired(CAPACITY_PURGE_BATCH).examined == CAPACITY_PURGE_BATCH {}

        if self.entries.len() >= self.max_entries {
            tracing::warn!(
                max_entries = self.max_entries,
                key = %key,
                "Cache at capacity, rejecting new key"
            );
            return Err(CacheError::capacity_exceeded(self.max_entries));
        }
        Ok(())
    }

    /// Removes `key` if its entry has expired.
    fn remove_if_expired(&self, key: &str, now: Instant) {
        if let Some((key, entry)) = self.entries.remove_if(key, |_, entry| entry.is_expired(now)) {
            if let Some(at) = entry.expires_at {
                self.expiry.remove(at, &key);
            }
            self.expired.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %key, "expired entry removed on read");
        }
    }

    /// Removes `key` unconditionally. Returns `true` if the removed entry was live.
    fn remove_entry(&self, key: &str, now: Instant) -> bool {
        match self.entries.remove(key) {
            Some((key, entry)) => {
                if let Some(at) = entry.expires_at {
                    self.expiry.remove(at, &key);
                }
                !entry.is_expired(now)
            }
            None => false,
        }
    }
}

impl CacheBackend for MemoryStore {
    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> CacheResult<()> {
        self.ensure_capacity(key)?;

        let now = Instant::now();
        let expires_at = deadline(now, ttl);
        let mut fresh = StoredEntry::new(value, expires_at);

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.get();
                if let Some(at) = previous.expires_at {
                    self.expiry.remove(at, key);
                }
                if !previous.is_expired(now) {
                    fresh.created_at = previous.created_at;
                }
                if let Some(at) = expires_at {
                    self.expiry.insert(at, key);
                }
                occupied.insert(fresh);
            }
            Entry::Vacant(vacant) => {
                if let Some(at) = expires_at {
                    self.expiry.insert(at, key);
                }
                vacant.insert(fresh);
            }
        }
        Ok(())
    }

    fn get(&self, key: &str) -> CacheResult<Option<Arc<CacheValue>>> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(Arc::clone(&entry.value)));
            }
            // Entry expired, remove it
            drop(entry);
            self.remove_if_expired(key, now);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return true,
            Some(_) => true,
            None => false,
        };
        if expired {
            self.remove_if_expired(key, now);
        }
        false
    }

    fn delete(&self, key: &str) -> bool {
        self.remove_entry(key, Instant::now())
    }

    fn ttl(&self, key: &str) -> CacheResult<Ttl> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(entry.ttl(now)),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.remove_if_expired(key, now);
        }
        Ok(Ttl::Missing)
    }

    fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl_if_created: Option<Duration>,
    ) -> CacheResult<i64> {
        self.apply_delta(key, delta, ttl_if_created)
    }

    fn invalidate(&self, pattern: &GlobPattern) -> CacheResult<usize> {
        let now = Instant::now();

        let removed = if pattern.is_literal() {
            usize::from(self.remove_entry(pattern.as_str(), now))
        } else {
            let prefix = pattern.literal_prefix();
            let matched: Vec<String> = self
                .entries
                .iter()
                .filter(|item| item.key().starts_with(prefix) && pattern.matches(item.key()))
                .map(|item| item.key().clone())
                .collect();

            matched
                .iter()
                .filter(|key| self.remove_entry(key, now))
                .count()
        };

        self.invalidated
            .fetch_add(removed as u64, Ordering::Relaxed);
        tracing::debug!(pattern = %pattern, removed, "cache invalidated");
        Ok(removed)
    }

    fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        Some(EntryInfo {
            kind: entry.value.kind(),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            ttl: entry.ttl(now),
        })
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&self) {
        // Index first: a racing set can leave a stale deadline behind, never
        // an entry the sweeper cannot find.
        self.expiry.clear();
        self.entries.clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
        }
    }

    fn purge_expired(&self, limit: usize) -> PurgeBatch {
        let now = Instant::now();
        let due = self.expiry.drain_due(now, limit);

        let removed = due
            .iter()
            .filter(|(_, key)| {
                self.entries
                    .remove_if(key, |_, entry| entry.is_expired(now))
                    .is_some()
            })
            .count();

        if removed > 0 {
            self.expired.fetch_add(removed as u64, Ordering::Relaxed);
        }

        PurgeBatch {
            examined: due.len(),
            removed,
        }
    }
}
