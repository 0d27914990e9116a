//! The two-tier context cache (spec §4.5): L1 -> L2 -> miss, gated by a
//! negative-existence filter.

use serde_json::Value;

use crate::config::CacheConfig;
use crate::l1::L1Cache;
use crate::l2::L2Cache;
use crate::metrics::{CacheMetrics, MetricsSnapshot};
use crate::negative::NegativeFilter;

pub struct ContextCache {
    l1: L1Cache,
    l2: L2Cache,
    negative: NegativeFilter,
    metrics: CacheMetrics,
    ttl_ms: u64,
}

impl ContextCache {
    #[must_use]
    pub fn new(config: CacheConfig, l2: L2Cache) -> Self {
        Self { l1: L1Cache::new(config.l1_max_size, config.l1_ttl_ms), l2, negative: NegativeFilter::new(), metrics: CacheMetrics::new(), ttl_ms: config.l1_ttl_ms }
    }

    /// `get(c)` per spec §4.5 steps 1-4. A `None` means "caller should
    /// decide whether to query the warehouse" — it is never an error.
    pub async fn get(&self, customer: &str) -> Option<Value> {
        let timer = CacheMetrics::start_timer();
        if !self.negative.may_exist(customer) {
            self.metrics.record_negative_hit();
            return None;
        }
        if let Some(value) = self.l1.get(customer) {
            self.metrics.record_hit(timer);
            return Some(value);
        }
        if let Some(value) = self.l2.get(customer).await {
            self.l1.set(customer, value.clone());
            self.metrics.record_hit(timer);
            return Some(value);
        }
        if !self.l2.is_configured() {
            self.metrics.record_l2_unavailable();
        }
        self.metrics.record_miss(timer);
        None
    }

    /// `set(c, v)` per spec §4.5: always updates L1, fires-and-forgets L2.
    pub fn set(&self, customer: &str, value: Value) {
        self.negative.mark_positive(customer);
        self.l1.set(customer, value.clone());
        self.l2.set(customer, value, self.ttl_ms);
    }

    pub fn preload(&self, customers: impl IntoIterator<Item = String>) {
        self.negative.set_preload(customers);
    }

    #[must_use]
    pub fn l1(&self) -> &L1Cache {
        &self.l1
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // `L2Cache::connect` with `host: None` does no I/O, so awaiting it
    // directly inside a `#[tokio::test]` is fine without a real Redis.
    async fn cache() -> ContextCache {
        let l2 = L2Cache::connect(None, 0, None, 0, "test".to_string(), 15).await;
        ContextCache::new(CacheConfig::default(), l2)
    }

    #[tokio::test]
    async fn negative_filter_short_circuits_unknown_customers() {
        let cache = cache().await;
        assert_eq!(cache.get("never-seen").await, None);
        assert_eq!(cache.metrics().negative_hits, 1);
    }

    #[tokio::test]
    async fn set_then_get_hits_l1() {
        let cache = cache().await;
        cache.set("cust-1", json!({"a": 1}));
        assert_eq!(cache.get("cust-1").await, Some(json!({"a": 1})));
        assert_eq!(cache.metrics().hits, 1);
    }

    #[tokio::test]
    async fn preloaded_customer_is_visible_before_any_write() {
        let cache = cache().await;
        cache.preload(["cust-2".to_string()]);
        // passes the negative filter, but still an L1/L2 miss
        assert_eq!(cache.get("cust-2").await, None);
        assert_eq!(cache.metrics().misses, 1);
    }
}
