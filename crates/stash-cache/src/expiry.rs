//! Time-ordered index of entry deadlines.
//!
//! The sweeper drains due deadlines from the front of the index instead of
//! scanning the whole keyspace. The index may hold stale pairs for keys that
//! were overwritten or deleted; callers re-check the stored entry before
//! removing anything.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub(crate) struct ExpiryIndex {
    deadlines: Mutex<BTreeSet<(Instant, String)>>,
}

impl ExpiryIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, at: Instant, key: &str) {
        self.deadlines.lock().insert((at, key.to_string()));
    }

    pub(crate) fn remove(&self, at: Instant, key: &str) {
        self.deadlines.lock().remove(&(at, key.to_string()));
    }

    /// Pops up to `limit` pairs whose deadline is at or before `now`.
    pub(crate) fn drain_due(&self, now: Instant, limit: usize) -> Vec<(Instant, String)> {
        let mut deadlines = self.deadlines.lock();
        let mut due = Vec::new();
        while due.len() < limit {
            if !deadlines.first().is_some_and(|(at, _)| *at <= now) {
                break;
            }
            if let Some(pair) = deadlines.pop_first() {
                due.push(pair);
            }
        }
        due
    }

    pub(crate) fn len(&self) -> usize {
        self.deadlines.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.deadlines.lock().clear();
    }
}
