//! Per-identity breaker registry, keyed by warehouse account username.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::breaker::{IdentityBreaker, Snapshot};
use crate::config::BreakerConfig;

/// Lazily creates one [`IdentityBreaker`] per identity the pool has ever
/// touched, and periodically evicts the ones that have gone quiet (spec
/// §4.3: "A cleanup pass runs periodically ... to evict metrics for
/// identities quiescent for 2x window").
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<String, IdentityBreaker>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self { config, breakers: DashMap::new() }
    }

    fn entry(&self, identity: &str) -> dashmap::mapref::one::RefMut<'_, String, IdentityBreaker> {
        self.breakers.entry(identity.to_string()).or_insert_with(|| IdentityBreaker::new(self.config))
    }

    /// `canExecute()` for the named identity (spec §4.4 step 1: the pool
    /// consults the breaker before attempting to hand out a connection).
    #[must_use]
    pub fn can_execute(&self, identity: &str, now: DateTime<Utc>) -> bool {
        self.entry(identity).can_execute(now)
    }

    pub fn record_success(&self, identity: &str, now: DateTime<Utc>) {
        self.entry(identity).record_success(now);
    }

    pub fn record_failure(&self, identity: &str, now: DateTime<Utc>) {
        self.entry(identity).record_failure(now);
    }

    #[must_use]
    pub fn snapshot(&self, identity: &str) -> Option<Snapshot> {
        self.breakers.get(identity).map(|b| b.snapshot())
    }

    /// All known identities and their current snapshot, for the metrics
    /// endpoint (spec §4.5).
    #[must_use]
    pub fn all_snapshots(&self) -> Vec<(String, Snapshot)> {
        self.breakers.iter().map(|entry| (entry.key().clone(), entry.value().snapshot())).collect()
    }

    /// Evicts breakers quiescent for at least `2 * failure_window_ms`.
    /// Returns the number evicted. Intended to run on a periodic tick from
    /// the owning pool, at least once per `failure_window_ms`.
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let idle_threshold = self.config.failure_window_ms.saturating_mul(2);
        let stale: Vec<String> = self
            .breakers
            .iter()
            .filter(|entry| entry.value().is_quiescent_since(now, idle_threshold))
            .map(|entry| entry.key().clone())
            .collect();
        for key in &stale {
            self.breakers.remove(key);
        }
        stale.len()
    }
}

/// Spawns a background task that runs [`BreakerRegistry::cleanup`] once per
/// `interval`, at least once per `failure_window_ms` (spec §4.3).
pub fn spawn_cleanup(registry: Arc<BreakerRegistry>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let evicted = registry.cleanup(Utc::now());
            if evicted > 0 {
                debug!(evicted, "breaker registry cleanup pass evicted quiescent identities");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_identity_starts_closed_and_executable() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        assert!(registry.can_execute("acct-a", Utc::now()));
    }

    #[test]
    fn failures_are_tracked_independently_per_identity() {
        let registry = BreakerRegistry::new(BreakerConfig { failure_threshold: 2, ..BreakerConfig::default() });
        let now = Utc::now();
        registry.record_failure("acct-a", now);
        registry.record_failure("acct-a", now);
        assert!(!registry.can_execute("acct-a", now));
        assert!(registry.can_execute("acct-b", now));
    }

    #[test]
    fn cleanup_evicts_only_quiescent_identities() {
        let registry = BreakerRegistry::new(BreakerConfig { failure_window_ms: 1_000, ..BreakerConfig::default() });
        let now = Utc::now();
        registry.record_failure("stale", now);
        registry.record_failure("fresh", now + chrono::Duration::milliseconds(5_000));
        let evicted = registry.cleanup(now + chrono::Duration::milliseconds(5_000));
        assert_eq!(evicted, 1);
        assert!(registry.snapshot("stale").is_none());
        assert!(registry.snapshot("fresh").is_some());
    }
}
