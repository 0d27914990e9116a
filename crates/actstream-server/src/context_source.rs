//! Warehouse-backed [`ContextSource`] for the cache warmer (spec §4.6):
//! "recently active" customers and bulk context reads, both issued
//! through the same template registry as the request paths.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use actstream_cache::ContextSource;
use actstream_db::PoolManager;
use actstream_templates::Param;

pub struct WarehouseContextSource {
    pool: std::sync::Arc<PoolManager>,
}

impl WarehouseContextSource {
    #[must_use]
    pub const fn new(pool: std::sync::Arc<PoolManager>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContextSource for WarehouseContextSource {
    async fn recently_active(&self, limit: usize) -> Vec<String> {
        let rows = match self.pool.execute("GET_ACTIVE_CUSTOMERS", &[Param::I64(limit as i64)], None).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "cache warmer failed to fetch recently active customers");
                return Vec::new();
            },
        };
        rows.iter().map(|row| row.get::<_, String>("customer")).collect()
    }

    async fn bulk_get_context(&self, customers: &[String]) -> Vec<(String, Value)> {
        let mut results = Vec::with_capacity(customers.len());
        for customer in customers {
            let rows = match self.pool.execute("GET_CONTEXT", &[Param::Str(customer.clone())], None).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(customer, error = %e, "cache warmer failed to bulk-read context");
                    continue;
                },
            };
            if let Some(row) = rows.first() {
                let blob: serde_json::Value = row.get("context_blob");
                results.push((customer.clone(), blob));
            }
        }
        results
    }
}
