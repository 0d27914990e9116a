//! Periodic liveness probe (spec §4.4: "Periodic liveness probe (every
//! 30 s) evicts broken connections; lazy replacement on next checkout").

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::manager::PoolManager;

/// Spawns a background task that probes every identity the manager has
/// built a pool for, once per `interval`. A broken connection surfaced by
/// the probe is simply dropped by `deadpool` on return; the next checkout
/// transparently opens a replacement.
pub fn spawn_liveness_probe(manager: Arc<PoolManager>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let identities: Vec<String> = manager.pool_stats().into_iter().map(|(identity, _)| identity).collect();
            for identity in identities {
                match manager.probe(&identity).await {
                    Ok(()) => debug!(identity, "liveness probe ok"),
                    Err(e) => warn!(identity, error = %e, "liveness probe failed"),
                }
            }
        }
    })
}
