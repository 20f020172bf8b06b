use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use stash_cache::{
    CacheBackend, CacheConfig, CacheError, CacheManager, CacheStats, CacheValue, EntryInfo,
    GlobPattern, MemoryStore, PurgeBatch, Ttl, ValueKind,
};

fn manager() -> CacheManager {
    CacheManager::new(CacheConfig::default()).expect("default config is valid")
}

#[tokio::test(start_paused = true)]
async fn ttl_entries_expire_without_sweeper() {
    let cache = manager();
    cache
        .set("temp:data", "x", Some(Duration::from_secs(2)))
        .unwrap();
    assert!(cache.exists("temp:data"));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(cache.exists("temp:data"));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(!cache.exists("temp:data"));
    assert!(cache.get("temp:data").unwrap().is_none());
    assert_eq!(cache.ttl("temp:data").unwrap(), Ttl::Missing);
}

#[tokio::test(start_paused = true)]
async fn zero_ttl_never_expires() {
    let cache = CacheManager::new(CacheConfig {
        default_ttl_secs: 10,
        ..CacheConfig::default()
    })
    .unwrap();
    cache.set("config:flag", "on", Some(Duration::ZERO)).unwrap();

    tokio::time::advance(Duration::from_secs(60 * 60 * 24 * 365)).await;
    assert!(cache.exists("config:flag"));
    assert_eq!(cache.ttl("config:flag").unwrap(), Ttl::Persistent);
}

#[test]
fn huge_ttls_are_stored_without_expiration() {
    let cache = manager();
    cache
        .set("k", "v", Some(Duration::from_secs(u64::MAX)))
        .unwrap();
    assert!(cache.exists("k"));
    assert_eq!(cache.ttl("k").unwrap(), Ttl::Persistent);

    let err = CacheManager::new(CacheConfig {
        default_ttl_secs: u64::MAX,
        ..CacheConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, CacheError::InvalidConfig { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_are_exact() {
    let cache = Arc::new(manager());
    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.increment("hits", 1) })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(cache.get_required("hits").unwrap().as_integer(), Some(100));
}

#[test]
fn increment_and_decrement_on_absent_key() {
    let cache = manager();
    assert_eq!(cache.increment("page:views", 1).unwrap(), 1);
    assert_eq!(cache.increment("page:views", 5).unwrap(), 6);
    assert_eq!(cache.decrement("page:views", 2).unwrap(), 4);
}

#[test]
fn batch_round_trip() {
    let cache = manager();
    cache
        .set_multiple([("a", 1), ("b", 2), ("c", 3)], Some(Duration::ZERO))
        .unwrap();

    let all = cache.get_multiple(["a", "b", "c"]).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all["a"].as_integer(), Some(1));
    assert_eq!(all["b"].as_integer(), Some(2));
    assert_eq!(all["c"].as_integer(), Some(3));

    let some = cache.get_multiple(["a", "missing"]).unwrap();
    assert_eq!(some.len(), 1);
    assert!(some.contains_key("a"));

    assert_eq!(cache.delete_multiple(["a", "b", "missing"]), 2);
    assert!(cache.exists("c"));
}

#[test]
fn pattern_invalidation_targets_matching_keys() {
    let cache = manager();
    for key in ["cache:user:1", "cache:user:2", "cache:product:1"] {
        cache.set(key, key, None).unwrap();
    }

    assert_eq!(cache.invalidate("cache:user:*").unwrap(), 2);
    assert!(!cache.exists("cache:user:1"));
    assert!(!cache.exists("cache:user:2"));
    assert!(cache.exists("cache:product:1"));
    assert_eq!(cache.stats().store.invalidated, 2);

    let err = cache.invalidate("").unwrap_err();
    assert!(matches!(err, CacheError::InvalidPattern { .. }));
}

#[test]
fn regions_are_isolated_from_global_keyspace() {
    let cache = manager();
    cache.set("k", "global", None).unwrap();
    let r1 = cache.request_cache("r1");
    r1.set("k", "region").unwrap();

    assert_eq!(r1.get("k").unwrap().as_text(), Some("region"));
    assert_eq!(cache.get_required("k").unwrap().as_text(), Some("global"));
    assert!(cache.request_cache("r2").get("k").is_none());
}

#[test]
fn region_handles_share_one_region() {
    let cache = manager();
    let first = cache.request_cache("r1");
    let second = cache.request_cache("r1");

    first.set("user", "alice").unwrap();
    assert_eq!(second.get("user").unwrap().as_text(), Some("alice"));
    assert_eq!(second.keys(), vec!["user".to_string()]);
    assert!(second.size() > 0);
}

#[test]
fn clearing_a_region_is_terminal() {
    let cache = manager();
    let old = cache.request_cache("r1");
    old.set("user", "alice").unwrap();

    cache.clear_request_cache("r1");
    assert!(!old.is_active());
    assert!(old.set("user", "bob").unwrap_err().is_region_not_found());

    let fresh = cache.request_cache("r1");
    assert!(fresh.is_empty());
    assert!(fresh.get("user").is_none());

    // Unknown ids are a no-op.
    cache.clear_request_cache("never-created");
}

#[test]
fn type_mismatch_leaves_value_unchanged() {
    let cache = manager();
    cache
        .set("k", "not-a-number", Some(Duration::ZERO))
        .unwrap();

    let err = cache.increment("k", 1).unwrap_err();
    assert!(err.is_type_mismatch());
    assert_eq!(cache.get_required("k").unwrap().as_text(), Some("not-a-number"));
    assert_eq!(cache.entry_info("k").map(|info| info.kind), Some(ValueKind::Text));
}

#[test]
fn missing_keys_are_absent_not_errors() {
    let cache = manager();
    assert!(cache.get("nope").unwrap().is_none());
    assert!(cache.get_required("nope").unwrap_err().is_not_found());
    assert!(!cache.delete("nope"));
}

#[test]
fn capacity_bound_rejects_new_keys() {
    let cache = CacheManager::new(CacheConfig {
        max_entries: 1,
        ..CacheConfig::default()
    })
    .unwrap();
    cache.set("a", 1, None).unwrap();
    cache.set("a", 2, None).unwrap();

    let err = cache.set("b", 1, None).unwrap_err();
    assert!(err.is_capacity_exceeded());
    assert!(cache.increment("c", 1).unwrap_err().is_capacity_exceeded());
}

#[tokio::test(start_paused = true)]
async fn background_sweeper_reclaims_expired_entries_and_idle_regions() {
    let cache = CacheManager::start(CacheConfig {
        sweep_interval_ms: 100,
        region_idle_secs: 1,
        ..CacheConfig::default()
    })
    .unwrap();
    cache.set("short", "x", Some(Duration::from_millis(50))).unwrap();
    cache.request_cache("abandoned").set("k", 1).unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let stats = cache.stats();
    assert_eq!(stats.store.entries, 0);
    assert_eq!(stats.store.expired, 1);
    assert_eq!(stats.regions.active, 0);
    assert_eq!(stats.regions.reclaimed, 1);

    cache.shutdown().await;
    assert!(!cache.is_sweeping());
}

/// Memory store whose sweep always panics.
#[derive(Debug, Default)]
struct PanickingSweepStore {
    inner: MemoryStore,
    purge_calls: AtomicUsize,
}

impl CacheBackend for PanickingSweepStore {
    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.inner.set(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<Arc<CacheValue>>, CacheError> {
        self.inner.get(key)
    }

    fn exists(&self, key: &str) -> bool {
        self.inner.exists(key)
    }

    fn delete(&self, key: &str) -> bool {
        self.inner.delete(key)
    }

    fn ttl(&self, key: &str) -> Result<Ttl, CacheError> {
        self.inner.ttl(key)
    }

    fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl_if_created: Option<Duration>,
    ) -> Result<i64, CacheError> {
        self.inner.increment(key, delta, ttl_if_created)
    }

    fn invalidate(&self, pattern: &GlobPattern) -> Result<usize, CacheError> {
        self.inner.invalidate(pattern)
    }

    fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        self.inner.entry_info(key)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    fn purge_expired(&self, _limit: usize) -> PurgeBatch {
        self.purge_calls.fetch_add(1, Ordering::SeqCst);
        panic!("sweep exploded");
    }
}

#[tokio::test(start_paused = true)]
async fn sweeper_survives_panicking_backend() {
    let backend = Arc::new(PanickingSweepStore::default());
    let cache = CacheManager::with_backend(
        CacheConfig {
            sweep_interval_ms: 100,
            ..CacheConfig::default()
        },
        backend.clone(),
    )
    .unwrap();
    cache.start_sweeper().unwrap();

    tokio::time::sleep(Duration::from_millis(550)).await;

    assert!(backend.purge_calls.load(Ordering::SeqCst) >= 3);
    assert!(cache.is_sweeping());

    // Foreground operations are unaffected.
    cache.set("k", 1, Some(Duration::from_secs(1))).unwrap();
    assert!(cache.exists("k"));
    assert_eq!(cache.sweep_now().expired, 0);

    cache.shutdown().await;
}
