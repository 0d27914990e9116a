//! A single identity's bounded connection pool, wrapping
//! `deadpool_postgres::Pool`.

use std::sync::atomic::{AtomicU64, Ordering};

use deadpool_postgres::{Config as DeadpoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;

use actstream_error::CoreError;

use crate::config::PoolConfig;

/// One warehouse identity's connection pool plus the query-tag prefix
/// used to stamp every session (spec §6: "Every session sets a query tag
/// `<prefix>_<16-hex>` for traceability").
pub struct IdentityPool {
    pub identity: String,
    pool: Pool,
    config: PoolConfig,
    slot_counter: AtomicU64,
}

impl IdentityPool {
    /// Builds the pool for one identity. Does not eagerly connect —
    /// `deadpool` connects lazily on first checkout.
    pub fn new(identity: String, connection_string: &str, config: PoolConfig) -> actstream_error::Result<Self> {
        let mut cfg = DeadpoolConfig::new();
        cfg.url = Some(connection_string.to_string());
        cfg.manager = Some(ManagerConfig { recycling_method: RecyclingMethod::Fast });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(config.max_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| CoreError::internal_with_source("failed to build identity pool", e))?;
        Ok(Self { identity, pool, config, slot_counter: AtomicU64::new(0) })
    }

    /// Checks out a connection, bounded by the acquisition timeout (spec
    /// §4.4 step 3). Stamps a per-session slot tag identifying which
    /// logical slot handed it out, for the metrics endpoint.
    pub async fn checkout(&self) -> actstream_error::Result<(deadpool_postgres::Object, String)> {
        let slot = self.slot_counter.fetch_add(1, Ordering::Relaxed);
        let session_tag = format!("{}_{:04x}", self.identity, slot % 0xffff);
        let timeout = std::time::Duration::from_millis(self.config.acquisition_timeout_ms);
        let object = tokio::time::timeout(timeout, self.pool.get())
            .await
            .map_err(|_| CoreError::timeout("timed out acquiring a pool connection", self.config.acquisition_timeout_ms))?
            .map_err(|e| CoreError::unavailable(format!("pool exhausted for identity {}: {e}", self.identity)))?;
        Ok((object, session_tag))
    }

    #[must_use]
    pub fn status(&self) -> deadpool_postgres::Status {
        self.pool.status()
    }
}
