use std::time::Duration;

use chrono::{TimeZone, Utc};
use tagwatch_core::cache::cache_key_prefix;
use tagwatch_core::{cache_key, CacheStats, ResultCache};

#[tokio::test]
async fn entry_is_served_until_ttl_elapses() {
    let cache: ResultCache<Vec<u64>> = ResultCache::new();
    cache.put("k", vec![1, 2, 3], Duration::from_millis(80));

    assert_eq!(cache.get("k"), Some(vec![1, 2, 3]));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.get("k"), None);
    assert!(cache.is_empty(), "expired entry is evicted on lookup");
}

#[test]
fn stats_count_hits_and_misses() {
    let cache: ResultCache<u32> = ResultCache::new();
    cache.put("a", 1, Duration::from_secs(60));

    for _ in 0..3 {
        assert!(cache.get("a").is_some());
    }
    for _ in 0..2 {
        assert!(cache.get("b").is_none());
    }
    assert!(cache.contains("a"), "peeking does not count");

    assert_eq!(
        cache.stats(),
        CacheStats {
            hits: 3,
            misses: 2,
            total: 5
        }
    );
}

#[test]
fn hit_ratio_is_zero_before_any_lookup() {
    let cache: ResultCache<u32> = ResultCache::new();
    assert_eq!(cache.stats().hit_ratio(), 0.0);

    cache.put("a", 1, Duration::from_secs(60));
    cache.get("a");
    cache.get("a");
    cache.get("a");
    cache.get("b");
    assert_eq!(cache.stats().hit_ratio(), 0.75);
}

#[tokio::test]
async fn purge_expired_drops_only_stale_entries() {
    let cache: ResultCache<u32> = ResultCache::new();
    cache.put("short", 1, Duration::from_millis(20));
    cache.put("long", 2, Duration::from_secs(60));

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.purge_expired(), 1);
    assert!(!cache.contains("short"));
    assert!(cache.contains("long"));
    assert_eq!(cache.stats().total, 0, "purging is not a lookup");
}

#[test]
fn clear_keeps_lifetime_counters() {
    let cache: ResultCache<u32> = ResultCache::new();
    cache.put("a", 1, Duration::from_secs(60));
    cache.get("a");
    cache.get("z");
    cache.clear();

    assert!(cache.get("a").is_none());
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.total), (1, 2, 3));
}

#[test]
fn put_replaces_and_invalidate_removes() {
    let cache: ResultCache<&'static str> = ResultCache::new();
    cache.put("k", "old", Duration::from_secs(60));
    cache.put("k", "new", Duration::from_secs(60));
    assert_eq!(cache.get("k"), Some("new"));

    assert!(cache.invalidate("k"));
    assert!(!cache.invalidate("k"));
    assert_eq!(cache.get("k"), None);
}

#[test]
fn huge_ttl_does_not_panic() {
    let cache: ResultCache<u8> = ResultCache::new();
    cache.put("k", 7, Duration::MAX);
    assert_eq!(cache.get("k"), Some(7));
}

#[test]
fn keys_rotate_with_the_hour_bucket() {
    let hour = Duration::from_secs(3600);
    let at = |h, m| Utc.with_ymd_and_hms(2024, 10, 21, h, m, 0).unwrap();

    let k1 = cache_key("Rust", 1, 5, at(7, 5), hour);
    let k2 = cache_key("rust", 1, 5, at(7, 55), hour);
    let k3 = cache_key("rust", 1, 5, at(8, 0), hour);

    assert_eq!(k1, "questions_rust_p1_size5_2024102107");
    assert_eq!(k1, k2);
    assert_ne!(k1, k3);
    assert_ne!(k1, cache_key("rust", 1, 20, at(7, 5), hour));
    assert_ne!(k1, cache_key("go", 1, 5, at(7, 5), hour));
    assert!(k1.starts_with(&cache_key_prefix("rust")));
}

#[test]
fn invalidate_prefix_only_touches_one_tag() {
    let cache: ResultCache<u8> = ResultCache::new();
    cache.put(format!("{}a", cache_key_prefix("rust")), 1, Duration::from_secs(60));
    cache.put(format!("{}b", cache_key_prefix("rust")), 2, Duration::from_secs(60));
    cache.put(format!("{}a", cache_key_prefix("go")), 3, Duration::from_secs(60));

    assert_eq!(cache.invalidate_prefix(&cache_key_prefix("rust")), 2);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_store() {
    let cache: ResultCache<usize> = ResultCache::new();
    let mut tasks = Vec::new();
    for worker in 0..8usize {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..100usize {
                let key = format!("k{}", i % 10);
                cache.put(key.clone(), worker, Duration::from_secs(60));
                assert!(cache.get(&key).is_some());
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(cache.len(), 10);
    assert_eq!(cache.stats().hits, 800);
}
