use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::question::Question;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    // `None` when the ttl overflows the clock; such entries never expire.
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Lifetime hit/miss counters. `clear()` never resets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.hits as f64 / self.total as f64
        }
    }
}

/// String-keyed store with per-entry TTL, safe to share between the
/// monitoring loop and foreground queries.
#[derive(Debug, Clone)]
pub struct ResultCache<V = Vec<Question>> {
    entries: Arc<DashMap<String, CacheEntry<V>>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl<V: Clone> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ResultCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let found = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            _ => None,
        };
        match found {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.entries.remove_if(key, |_, entry| entry.is_expired(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Peeks without touching the counters.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Stores or replaces `key`.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let expires_at = Instant::now().checked_add(ttl);
        debug!(key = %key, ?ttl, "cache put");
        self.entries.insert(key, CacheEntry { value, expires_at });
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops entries whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            hits,
            misses,
            total: hits + misses,
        }
    }
}

/// Prefix shared by every key of `tag`.
pub fn cache_key_prefix(tag: &str) -> String {
    format!("questions_{}_", tag.trim().to_lowercase())
}

/// Key for a page of questions. The time bucket makes keys rotate every
/// `bucket` regardless of entry ttl.
pub fn cache_key(tag: &str, page: u32, page_size: u32, now: DateTime<Utc>, bucket: Duration) -> String {
    format!(
        "{}p{}_size{}_{}",
        cache_key_prefix(tag),
        page,
        page_size,
        time_bucket(now, bucket)
    )
}

fn time_bucket(now: DateTime<Utc>, bucket: Duration) -> String {
    let width = bucket.as_secs().max(1) as i64;
    let ts = now.timestamp();
    let start = ts - ts.rem_euclid(width);
    let start = Utc.timestamp_opt(start, 0).single().unwrap_or(now);
    if width % 3600 == 0 {
        start.format("%Y%m%d%H").to_string()
    } else {
        start.format("%Y%m%d%H%M%S").to_string()
    }
}
