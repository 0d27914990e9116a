//! L1: an in-process bounded LRU with per-entry TTL (spec §4.5).

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;

struct Entry {
    value: Value,
    inserted_at: Instant,
}

/// Bounded, TTL-expiring LRU keyed by customer id.
pub struct L1Cache {
    cache: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
    /// Access-frequency counters feeding the warmer (spec §4.6 step 1:
    /// "top-K access-frequency customers"). Never evicted by the LRU's own
    /// bound; reset is the warmer's job if it ever grows unbounded in a
    /// long-lived process, which in practice it does not: customer
    /// cardinality is bounded by the warehouse.
    access_counts: DashMap<String, u64>,
}

impl L1Cache {
    #[must_use]
    pub fn new(max_size: usize, ttl_ms: u64) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::new(1).expect("1 is nonzero"));
        Self { cache: Mutex::new(LruCache::new(capacity)), ttl: Duration::from_millis(ttl_ms), access_counts: DashMap::new() }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        *self.access_counts.entry(key.to_string()).or_insert(0) += 1;
        let mut cache = self.cache.lock();
        let expired = cache.get(key).is_some_and(|entry| entry.inserted_at.elapsed() >= self.ttl);
        if expired {
            cache.pop(key);
            return None;
        }
        cache.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: &str, value: Value) {
        self.cache.lock().put(key.to_string(), Entry { value, inserted_at: Instant::now() });
    }

    /// Milliseconds until `key`'s TTL expires, if present (spec §4.6 step
    /// 1: "customers whose L1 TTL is within a refresh buffer").
    #[must_use]
    pub fn ttl_remaining_ms(&self, key: &str) -> Option<u64> {
        let cache = self.cache.lock();
        let entry = cache.peek(key)?;
        let elapsed = entry.inserted_at.elapsed();
        Some(self.ttl.saturating_sub(elapsed).as_millis() as u64)
    }

    /// The `top_k` customers by access frequency since process start.
    #[must_use]
    pub fn top_accessed(&self, top_k: usize) -> Vec<String> {
        let mut counts: Vec<(String, u64)> = self.access_counts.iter().map(|e| (e.key().clone(), *e.value())).collect();
        counts.sort_unstable_by(|a, b| b.1.cmp(&a.1));
        counts.into_iter().take(top_k).map(|(key, _)| key).collect()
    }

    /// All keys currently resident, for the TTL-refresh-buffer scan.
    #[must_use]
    pub fn resident_keys(&self) -> Vec<String> {
        self.cache.lock().iter().map(|(key, _)| key.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_round_trips() {
        let l1 = L1Cache::new(10, 60_000);
        l1.set("cust-1", json!({"a": 1}));
        assert_eq!(l1.get("cust-1"), Some(json!({"a": 1})));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let l1 = L1Cache::new(10, 0);
        l1.set("cust-1", json!({"a": 1}));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(l1.get("cust-1"), None);
    }

    #[test]
    fn eviction_respects_bounded_size() {
        let l1 = L1Cache::new(1, 60_000);
        l1.set("cust-1", json!(1));
        l1.set("cust-2", json!(2));
        assert_eq!(l1.len(), 1);
        assert_eq!(l1.get("cust-1"), None);
        assert_eq!(l1.get("cust-2"), Some(json!(2)));
    }

    #[test]
    fn top_accessed_orders_by_frequency() {
        let l1 = L1Cache::new(10, 60_000);
        l1.set("cust-1", json!(1));
        l1.set("cust-2", json!(2));
        l1.get("cust-1");
        l1.get("cust-1");
        l1.get("cust-2");
        let top = l1.top_accessed(1);
        assert_eq!(top, vec!["cust-1".to_string()]);
    }
}
