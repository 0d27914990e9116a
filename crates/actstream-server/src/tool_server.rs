//! `AppState`: the assembled process, and the `ToolServer` trait it
//! implements (spec §4.9). Both the in-process caller and the `axum` JSON
//! adapter in [`crate::http`] call through this one implementation, so
//! the latency-budget logic is never duplicated.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use actstream_breaker::BreakerRegistry;
use actstream_cache::{CacheWarmer, ContextCache, L2Cache};
use actstream_db::PoolManager;
use actstream_error::Result;
use actstream_queue::QueueWriter;
use actstream_secrets::Vault;

use crate::config::ServerConfig;
use crate::context_source::WarehouseContextSource;
use crate::metrics::{BreakerSnapshot, MetricsDocument, PoolStatSnapshot, ServerMetrics};
use crate::tickets::TicketManager;

/// The assembled process: every component of §2 wired together.
pub struct AppState {
    pub vault: Arc<Vault>,
    pub breakers: Arc<BreakerRegistry>,
    pub pool: Arc<PoolManager>,
    pub cache: Arc<ContextCache>,
    pub queue: Arc<QueueWriter>,
    pub tickets: Arc<TicketManager>,
    pub metrics: Arc<ServerMetrics>,
    pub perf: crate::config::PerfBudgets,
}

impl AppState {
    /// Boots every component from `config`, returning a ready-to-serve
    /// state plus the warmer (owned separately so the caller decides its
    /// own schedule).
    pub async fn bootstrap(config: ServerConfig) -> Result<(Arc<Self>, CacheWarmer<WarehouseContextSource>)> {
        // The encrypted file is authoritative once it exists; the CSV env
        // vars are only replayed into it to rotate or add identities
        // (spec §4.2 bootstrap note).
        let vault = if let Some(path) = &config.vault_path {
            let vault = Vault::load_or_empty(path.clone(), config.vault_key.clone())?;
            for identity in &config.identities {
                vault.upsert(identity.clone());
            }
            Arc::new(vault)
        } else {
            Arc::new(Vault::from_identities(config.identities.clone(), config.vault_key.clone()))
        };

        let breakers = Arc::new(BreakerRegistry::new(config.breaker));
        let pool = Arc::new(PoolManager::new(config.dsn.clone(), Arc::clone(&vault), Arc::clone(&breakers), config.pool));

        let l2 = L2Cache::connect(
            config.l2.host.as_deref(),
            config.l2.port,
            config.l2.password.as_deref(),
            config.l2.db,
            config.l2.prefix.clone(),
            config.cache.l2_timeout_ms,
        )
        .await;
        let cache = Arc::new(ContextCache::new(config.cache, l2));

        let queue = Arc::new(QueueWriter::open(config.queue)?);
        let tickets = Arc::new(TicketManager::new(config.ticket_ttl_ms));
        let metrics = Arc::new(ServerMetrics::new());

        let source = Arc::new(WarehouseContextSource::new(Arc::clone(&pool)));
        let warmer = CacheWarmer::new(Arc::clone(&cache), source, config.warmer);

        Ok((Arc::new(Self { vault, breakers, pool, cache, queue, tickets, metrics, perf: config.perf }), warmer))
    }

    /// Assembles the `/metrics` response document (spec §6).
    pub fn metrics_document(&self) -> MetricsDocument {
        let pool_stats = self
            .pool
            .pool_stats()
            .into_iter()
            .map(|(identity, status)| PoolStatSnapshot {
                identity,
                max_size: status.max_size,
                size: status.size,
                available: status.available,
                waiting: status.waiting,
            })
            .collect();
        let breaker_states = self
            .breakers
            .all_snapshots()
            .into_iter()
            .map(|(identity, snapshot)| BreakerSnapshot {
                identity,
                state: format!("{:?}", snapshot.state),
                failure_count: snapshot.failure_count,
                success_count: snapshot.success_count,
            })
            .collect();
        MetricsDocument {
            operations: self.metrics.snapshot(),
            cache: self.cache.metrics(),
            queue_depth: self.queue.current_segment_event_count(),
            queue_serialize_errors: self.queue.serialize_error_count(),
            pool_stats,
            breaker_states,
            tickets_in_flight: self.tickets.len(),
        }
    }
}

/// The four-operation RPC surface invoked from the assistant (spec §4.9).
/// `customer` is threaded through every operation from the caller's
/// session context — it is not part of the model-visible tool schema, but
/// every event and cache lookup is scoped to it.
#[async_trait]
pub trait ToolServer {
    async fn log_event(&self, customer: &str, activity: &str, features: Option<Value>, link: Option<String>) -> Result<Uuid>;

    async fn get_context(&self, customer: &str, max_bytes: Option<u64>) -> Result<Option<Value>>;

    async fn submit_query(&self, template: &str, params: HashMap<String, Value>, byte_cap: Option<u64>) -> Result<Uuid>;

    async fn log_insight(&self, customer: &str, subject: &str, metric: &str, value: Value, provenance_hash: &str) -> Result<Uuid>;
}

#[async_trait]
impl ToolServer for AppState {
    async fn log_event(&self, customer: &str, activity: &str, features: Option<Value>, link: Option<String>) -> Result<Uuid> {
        crate::handlers::log_event::handle(self, customer, activity, features, link).await
    }

    async fn get_context(&self, customer: &str, max_bytes: Option<u64>) -> Result<Option<Value>> {
        crate::handlers::get_context::handle(self, customer, max_bytes).await
    }

    async fn submit_query(&self, template: &str, params: HashMap<String, Value>, byte_cap: Option<u64>) -> Result<Uuid> {
        crate::handlers::submit_query::handle(self, template, params, byte_cap).await
    }

    async fn log_insight(&self, customer: &str, subject: &str, metric: &str, value: Value, provenance_hash: &str) -> Result<Uuid> {
        crate::handlers::log_insight::handle(self, customer, subject, metric, value, provenance_hash).await
    }
}

/// Every session sets a query tag `<prefix>_<16-hex>` for traceability
/// (spec §6 "Warehouse surface").
#[must_use]
pub fn query_tag(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..16])
}
