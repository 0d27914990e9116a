//! `GetConnection` (spec §4.4): walks vault-ranked identities, consulting
//! each identity's breaker, and hands back a pooled connection plus the
//! identity that served it.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::warn;

use actstream_breaker::BreakerRegistry;
use actstream_error::CoreError;
use actstream_secrets::Vault;
use actstream_templates::{registry, Param};

use crate::config::PoolConfig;
use crate::dsn::WarehouseDsn;
use crate::pool::IdentityPool;
use crate::sql;

/// Owns one [`IdentityPool`] per warehouse identity the vault has ever
/// handed out, built lazily on first use.
pub struct PoolManager {
    dsn: WarehouseDsn,
    vault: Arc<Vault>,
    breakers: Arc<BreakerRegistry>,
    pools: DashMap<String, Arc<IdentityPool>>,
    primary_config: PoolConfig,
}

/// The result of a successful `get_connection` call.
pub struct Checkout {
    pub connection: deadpool_postgres::Object,
    pub identity: String,
    pub session_tag: String,
}

impl PoolManager {
    #[must_use]
    pub fn new(dsn: WarehouseDsn, vault: Arc<Vault>, breakers: Arc<BreakerRegistry>, primary_config: PoolConfig) -> Self {
        Self { dsn, vault, breakers, pools: DashMap::new(), primary_config }
    }

    fn pool_for(&self, identity: &str, password: &str, rank: usize) -> actstream_error::Result<Arc<IdentityPool>> {
        if let Some(existing) = self.pools.get(identity) {
            return Ok(Arc::clone(&existing));
        }
        let config = if rank == 0 { self.primary_config } else { PoolConfig::backup(&self.primary_config) };
        let conn_str = self.dsn.connection_string(identity, password);
        let pool = Arc::new(IdentityPool::new(identity.to_string(), &conn_str, config)?);
        self.pools.insert(identity.to_string(), Arc::clone(&pool));
        Ok(pool)
    }

    /// Implements the §4.4 `GetConnection(preferred)` algorithm.
    pub async fn get_connection(&self, preferred: Option<&str>) -> actstream_error::Result<Checkout> {
        let now = Utc::now();
        let mut ordered: Vec<String> = Vec::new();
        if let Some(preferred) = preferred {
            ordered.push(preferred.to_string());
        }
        for candidate in self.vault.candidates(self.primary_config.max_candidate_identities) {
            if !ordered.contains(&candidate) {
                ordered.push(candidate);
            }
        }
        ordered.truncate(self.primary_config.max_candidate_identities);

        let mut last_error = None;
        for (rank, identity) in ordered.iter().enumerate() {
            let Some(record) = self.vault.snapshot(identity) else { continue };
            if !record.is_eligible(now) {
                continue;
            }
            if !self.breakers.can_execute(identity, now) {
                continue;
            }
            let pool = match self.pool_for(identity, &record.password, rank) {
                Ok(pool) => pool,
                Err(e) => {
                    warn!(identity, error = %e, "failed to build identity pool");
                    last_error = Some(e);
                    continue;
                },
            };
            match pool.checkout().await {
                Ok((connection, session_tag)) => {
                    self.vault.record_success(identity);
                    self.breakers.record_success(identity, now);
                    return Ok(Checkout { connection, identity: identity.clone(), session_tag });
                },
                Err(e) => {
                    warn!(identity, error = %e, "connection checkout failed, trying next identity");
                    self.vault.record_failure(identity);
                    self.breakers.record_failure(identity, now);
                    last_error = Some(e);
                },
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::unavailable("no eligible warehouse identity available")))
    }

    /// Issues `CHECK_HEALTH` against one identity's pool (spec §4.4:
    /// "Periodic liveness probe ... evicts broken connections").
    pub async fn probe(&self, identity: &str) -> actstream_error::Result<()> {
        let checkout = self.get_connection(Some(identity)).await?;
        let template = registry().get("CHECK_HEALTH")?;
        let bound = template.validate(&[])?;
        let owned = sql::bind(&bound);
        let refs = sql::as_refs(&owned);
        let query_timeout_ms = self.primary_config.query_timeout_ms;
        tokio::time::timeout(std::time::Duration::from_millis(query_timeout_ms), checkout.connection.query(template.sql_text, &refs))
            .await
            .map_err(|_| CoreError::timeout("liveness probe timed out", query_timeout_ms))?
            .map_err(|e| CoreError::internal_with_source("liveness probe failed", e))?;
        Ok(())
    }

    /// Pool occupancy for every identity touched so far, for the metrics
    /// endpoint (spec §6 "pool stats").
    #[must_use]
    pub fn pool_stats(&self) -> Vec<(String, deadpool_postgres::Status)> {
        self.pools.iter().map(|entry| (entry.key().clone(), entry.value().status())).collect()
    }

    #[must_use]
    pub const fn vault(&self) -> &Arc<Vault> {
        &self.vault
    }

    #[must_use]
    pub const fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Executes a known template end-to-end: look up, validate, bind, run.
    /// This is the single chokepoint through which warehouse SQL is issued
    /// (spec §4.1: "nothing else is permitted to build SQL text").
    pub async fn execute(
        &self,
        template_name: &str,
        params: &[Param],
        preferred_identity: Option<&str>,
    ) -> actstream_error::Result<Vec<tokio_postgres::Row>> {
        let template = registry().get(template_name)?;
        let bound = template.validate(params)?;
        let checkout = self.get_connection(preferred_identity).await?;
        let owned = sql::bind(&bound);
        let refs = sql::as_refs(&owned);
        let query_timeout_ms = self.primary_config.query_timeout_ms;
        tokio::time::timeout(std::time::Duration::from_millis(query_timeout_ms), checkout.connection.query(template.sql_text, &refs))
            .await
            .map_err(|_| CoreError::timeout(format!("query timed out for template '{template_name}'"), query_timeout_ms))?
            .map_err(|e| CoreError::internal_with_source(format!("query failed for template '{template_name}'"), e))
    }
}
