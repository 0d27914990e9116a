//! The cache warmer (spec §4.6): periodically refreshes L1/L2 from the
//! warehouse for the customers most likely to be asked about next.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::ContextCache;
use crate::config::WarmerConfig;

/// Abstracts the warehouse round-trip the warmer needs: a bulk
/// `customer -> context` read. Implemented by `actstream-db` in the
/// umbrella crate; kept as a trait here so this crate never depends on
/// `tokio-postgres` directly.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn recently_active(&self, limit: usize) -> Vec<String>;
    async fn bulk_get_context(&self, customers: &[String]) -> Vec<(String, Value)>;
}

pub struct CacheWarmer<S: ContextSource> {
    cache: Arc<ContextCache>,
    source: Arc<S>,
    config: WarmerConfig,
    running: Mutex<bool>,
}

impl<S: ContextSource> CacheWarmer<S> {
    #[must_use]
    pub fn new(cache: Arc<ContextCache>, source: Arc<S>, config: WarmerConfig) -> Self {
        Self { cache, source, config, running: Mutex::new(false) }
    }

    /// The warmer's own tuning, so the owning process can schedule
    /// `run_once` on `config().interval_ms` without duplicating it.
    #[must_use]
    pub const fn config(&self) -> &WarmerConfig {
        &self.config
    }

    /// Runs one warming cycle. Serializable with itself: a cycle already
    /// in flight causes a new call to return immediately without doing
    /// work (spec §4.6: "safely serializable with itself").
    pub async fn run_once(&self) {
        {
            let mut running = self.running.lock();
            if *running {
                debug!("cache warmer cycle already in progress, skipping");
                return;
            }
            *running = true;
        }
        self.warm().await;
        *self.running.lock() = false;
    }

    async fn warm(&self) {
        let top_frequency = self.cache.l1().top_accessed(self.config.top_k);
        let recently_active = self.source.recently_active(self.config.top_k).await;
        let refresh_due: Vec<String> = self
            .cache
            .l1()
            .resident_keys()
            .into_iter()
            .filter(|key| self.cache.l1().ttl_remaining_ms(key).is_some_and(|remaining| remaining <= self.config.refresh_buffer_ms))
            .collect();

        let mut targets: Vec<String> = Vec::new();
        for customer in top_frequency.into_iter().chain(recently_active).chain(refresh_due) {
            if !targets.contains(&customer) {
                targets.push(customer);
            }
        }
        targets.truncate(self.config.top_k);
        self.cache.preload(targets.clone());

        for batch in targets.chunks(self.config.batch_size) {
            let rows = self.source.bulk_get_context(batch).await;
            if rows.len() < batch.len() {
                warn!(requested = batch.len(), returned = rows.len(), "cache warmer batch returned fewer rows than requested");
            }
            for (customer, value) in rows {
                self.cache.set(&customer, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::l2::L2Cache;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        bulk_calls: AtomicUsize,
    }

    #[async_trait]
    impl ContextSource for FakeSource {
        async fn recently_active(&self, _limit: usize) -> Vec<String> {
            vec!["cust-active".to_string()]
        }

        async fn bulk_get_context(&self, customers: &[String]) -> Vec<(String, Value)> {
            self.bulk_calls.fetch_add(1, Ordering::Relaxed);
            customers.iter().map(|c| (c.clone(), json!({"customer": c}))).collect()
        }
    }

    #[tokio::test]
    async fn warming_populates_the_cache_for_recently_active_customers() {
        let l2 = L2Cache::connect(None, 0, None, 0, "test".to_string(), 15).await;
        let cache = Arc::new(ContextCache::new(crate::config::CacheConfig::default(), l2));
        let source = Arc::new(FakeSource { bulk_calls: AtomicUsize::new(0) });
        let warmer = CacheWarmer::new(Arc::clone(&cache), source, WarmerConfig::default());
        warmer.run_once().await;
        assert_eq!(cache.get("cust-active").await, Some(json!({"customer": "cust-active"})));
    }

    #[tokio::test]
    async fn concurrent_cycles_do_not_overlap() {
        let l2 = L2Cache::connect(None, 0, None, 0, "test".to_string(), 15).await;
        let cache = Arc::new(ContextCache::new(crate::config::CacheConfig::default(), l2));
        let source = Arc::new(FakeSource { bulk_calls: AtomicUsize::new(0) });
        let warmer = Arc::new(CacheWarmer::new(cache, source, WarmerConfig::default()));
        let w1 = Arc::clone(&warmer);
        let w2 = Arc::clone(&warmer);
        let (r1, r2) = tokio::join!(w1.run_once(), w2.run_once());
        let _ = (r1, r2);
    }
}
