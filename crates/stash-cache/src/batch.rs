//! Multi-key operations composed from single-key backend calls.
//!
//! Each key is applied atomically on its own; a batch as a whole is not a
//! transaction. A failing key does not stop the rest of a write batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use stash_core::{CacheBackend, CacheError, CacheResult, CacheValue, KeyFailure};

/// Writes every pair with the same TTL.
///
/// # Errors
///
/// Returns `CacheError::PartialBatch` listing the keys that failed; every
/// other key has been written.
pub(crate) fn set_multiple<I, K, V>(
    backend: &dyn CacheBackend,
    entries: I,
    ttl: Option<Duration>,
) -> CacheResult<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<CacheValue>,
{
    let mut applied = 0;
    let mut failed = Vec::new();

    for (key, value) in entries {
        let key = key.into();
        match backend.set(&key, value.into(), ttl) {
            Ok(()) => applied += 1,
            Err(error) => failed.push(KeyFailure::new(key, error)),
        }
    }

    if failed.is_empty() {
        return Ok(());
    }
    tracing::warn!(applied, failed = failed.len(), "batch set partially applied");
    Err(CacheError::PartialBatch { applied, failed })
}

/// Reads every key; absent or expired keys are left out of the result.
pub(crate) fn get_multiple<I, K>(
    backend: &dyn CacheBackend,
    keys: I,
) -> CacheResult<HashMap<String, Arc<CacheValue>>>
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    let mut found = HashMap::new();
    for key in keys {
        let key = key.as_ref();
        if let Some(value) = backend.get(key)? {
            found.insert(key.to_string(), value);
        }
    }
    Ok(found)
}

/// Deletes every key. Returns how many live entries were removed.
pub(crate) fn delete_multiple<I, K>(backend: &dyn CacheBackend, keys: I) -> usize
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    keys.into_iter()
        .filter(|key| backend.delete(key.as_ref()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_batch_round_trip() {
        let store = MemoryStore::new();
        set_multiple(&store, [("a", 1), ("b", 2), ("c", 3)], None).unwrap();

        let found = get_multiple(&store, ["a", "b", "c"]).unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found["b"].as_integer(), Some(2));

        let partial = get_multiple(&store, ["a", "missing"]).unwrap();
        assert_eq!(partial.len(), 1);
        assert!(partial.contains_key("a"));
    }

    #[test]
    fn test_failed_key_does_not_abort_batch() {
        let store = MemoryStore::with_max_entries(2);
        store.set("a", CacheValue::from(0), None).unwrap();

        let err = set_multiple(&store, vec![("x", 1), ("y", 2), ("a", 3)], None).unwrap_err();
        match err {
            CacheError::PartialBatch { applied, failed } => {
                assert_eq!(applied, 2);
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].key, "y");
                assert!(failed[0].error.is_capacity_exceeded());
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(store.get("a").unwrap().unwrap().as_integer(), Some(3));
        assert!(store.exists("x"));
        assert!(!store.exists("y"));
    }

    #[test]
    fn test_delete_multiple() {
        let store = MemoryStore::new();
        set_multiple(&store, [("a", "1"), ("b", "2")], None).unwrap();

        assert_eq!(delete_multiple(&store, ["a", "b", "c"]), 2);
        assert!(store.is_empty());
    }
}
