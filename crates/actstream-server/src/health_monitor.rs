//! Health monitor (spec §2, §4.4): periodically probes every known
//! identity, aggregates pool and breaker metrics, and emits alerts via
//! `tracing` when an identity trips its breaker.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use actstream_db::PoolManager;

/// Spawns the periodic probe loop. One tick probes every identity the
/// pool manager has already seen (an identity with no pool yet is simply
/// skipped — it has never been selected, so there is nothing to probe).
pub fn spawn(pool: Arc<PoolManager>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let identities: Vec<String> = pool.pool_stats().into_iter().map(|(identity, _)| identity).collect();
            for identity in identities {
                match pool.probe(&identity).await {
                    Ok(()) => info!(identity, "liveness probe succeeded"),
                    Err(e) => warn!(identity, error = %e, "liveness probe failed"),
                }
                let breaker_open = pool.breakers().snapshot(&identity).is_some_and(|s| s.failure_count > 0);
                if breaker_open {
                    warn!(identity, "identity has recorded failures since last probe");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    // The probe loop requires a live `PoolManager` wired to a reachable
    // warehouse, so it is covered by the crate's integration tests rather
    // than a unit test here.
}
