//! L2: an optional shared Redis-compatible cache (spec §4.5). Every call
//! site races against a 15 ms hard deadline and degrades to "no L2"
//! silently — callers never see an L2 error.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::debug;

/// Shared cache client. `None` fields mean L2 was never configured or its
/// initial connection failed; every method then behaves as a permanent
/// miss.
pub struct L2Cache {
    manager: Option<ConnectionManager>,
    prefix: String,
    timeout: Duration,
}

impl L2Cache {
    /// Connects to L2 if `host` is `Some`. A connection failure here is
    /// logged and treated as "no L2 configured" rather than a startup
    /// failure (spec §4.5: "If unavailable at any call site, degrade to
    /// L1-only silently").
    pub async fn connect(host: Option<&str>, port: u16, password: Option<&str>, db: i64, prefix: String, timeout_ms: u64) -> Self {
        let manager = match host {
            None => None,
            Some(host) => {
                let url = match password {
                    Some(pw) => format!("redis://:{pw}@{host}:{port}/{db}"),
                    None => format!("redis://{host}:{port}/{db}"),
                };
                match redis::Client::open(url) {
                    Ok(client) => match client.get_connection_manager().await {
                        Ok(manager) => Some(manager),
                        Err(e) => {
                            debug!(error = %e, "L2 cache connection failed, degrading to L1-only");
                            None
                        },
                    },
                    Err(e) => {
                        debug!(error = %e, "L2 cache URL invalid, degrading to L1-only");
                        None
                    },
                }
            },
        };
        Self { manager, prefix, timeout: Duration::from_millis(timeout_ms) }
    }

    fn key(&self, customer: &str) -> String {
        format!("{}:{}", self.prefix, customer)
    }

    /// Bounded by the hard L2 timeout; any error or timeout is a silent
    /// miss.
    pub async fn get(&self, customer: &str) -> Option<Value> {
        let mut manager = self.manager.clone()?;
        let key = self.key(customer);
        let fetch = async move { manager.get::<_, Option<String>>(&key).await };
        match tokio::time::timeout(self.timeout, fetch).await {
            Ok(Ok(Some(raw))) => serde_json::from_str(&raw).ok(),
            Ok(Ok(None)) | Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Fire-and-forget write with TTL; failures are logged, never
    /// propagated (spec §4.5: "`set(c, v)` ... fires-and-forgets L2").
    pub fn set(&self, customer: &str, value: Value, ttl_ms: u64) {
        let Some(manager) = self.manager.clone() else { return };
        let key = self.key(customer);
        let timeout = self.timeout;
        tokio::spawn(async move {
            let Ok(raw) = serde_json::to_string(&value) else { return };
            let mut manager = manager;
            let write = async move {
                let ttl_seconds = (ttl_ms / 1_000).max(1);
                let _: Result<(), redis::RedisError> = manager.set_ex(&key, raw, ttl_seconds).await;
            };
            if tokio::time::timeout(timeout, write).await.is_err() {
                debug!("L2 cache write timed out");
            }
        });
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.manager.is_some()
    }
}
