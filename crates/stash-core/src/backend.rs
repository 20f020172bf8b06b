//! Backend contract for the global keyspace.
//!
//! The manager talks to the keyspace only through [`CacheBackend`], so an
//! alternative store can be plugged in without changing callers.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::CacheError;
use crate::pattern::GlobPattern;
use crate::value::{CacheValue, ValueKind};

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key exists and never expires.
    Persistent,
    /// The key exists and expires after this duration.
    Remaining(Duration),
    /// The key is absent or already expired.
    Missing,
}

impl Ttl {
    /// Returns the remaining duration, if the key expires.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Ttl::Remaining(d) => Some(*d),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Ttl::Missing)
    }
}

/// Metadata about a live entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub kind: ValueKind,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub ttl: Ttl,
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Entries physically resident, including expired ones not yet swept.
    pub entries: usize,
    /// Number of reads that found a live value.
    pub hits: u64,
    /// Number of reads that found nothing.
    pub misses: u64,
    /// Entries removed because their TTL passed (lazily or by the sweeper).
    pub expired: u64,
    /// Entries removed by pattern invalidation.
    pub invalidated: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Result of draining one batch of due deadlines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeBatch {
    /// Deadlines taken from the expiry index.
    pub examined: usize,
    /// Entries actually removed.
    pub removed: usize,
}

/// Storage contract for the global keyspace.
///
/// Implementations must be thread-safe and linearizable per key. A `ttl` of
/// `None` means the entry never expires; default TTLs are resolved by the
/// caller before reaching the backend.
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    /// Inserts or replaces a value.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::CapacityExceeded` if a new key would exceed the
    /// backend's entry bound.
    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Returns the live value for `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Result<Option<Arc<CacheValue>>, CacheError>;

    /// Returns `true` if `key` holds a live value.
    fn exists(&self, key: &str) -> bool;

    /// Removes `key`. Returns `true` if a live value was removed.
    fn delete(&self, key: &str) -> bool;

    /// Remaining lifetime of `key`.
    fn ttl(&self, key: &str) -> Result<Ttl, CacheError>;

    /// Atomically adds `delta` to the integer at `key`.
    ///
    /// An absent or expired key starts from zero and is created with
    /// `ttl_if_created`. An existing entry keeps its TTL.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::TypeMismatch` for non-integer values and
    /// `CacheError::Overflow` if the result leaves the i64 range.
    fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl_if_created: Option<Duration>,
    ) -> Result<i64, CacheError>;

    /// Removes every live key matching `pattern`. Returns the number removed.
    fn invalidate(&self, pattern: &GlobPattern) -> Result<usize, CacheError>;

    /// Metadata for a live entry.
    fn entry_info(&self, key: &str) -> Option<EntryInfo>;

    /// Number of physically resident entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    fn clear(&self);

    /// Get cache statistics for monitoring.
    fn stats(&self) -> CacheStats;

    /// Removes up to `limit` expired entries.
    ///
    /// This is called by the background sweeper.
    /// Default implementation is a no-op (for backends with native TTL).
    fn purge_expired(&self, _limit: usize) -> PurgeBatch {
        PurgeBatch::default()
    }
}
