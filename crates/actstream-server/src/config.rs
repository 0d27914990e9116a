//! Process configuration, assembled from the environment variables of
//! spec §6, with a `--config` TOML override for local development in an
//! env-wins-at-deployment cascade; the file only fills gaps when set.

use std::env;
use std::path::{Path, PathBuf};

use actstream_breaker::BreakerConfig;
use actstream_cache::{CacheConfig, WarmerConfig};
use actstream_db::{PoolConfig, WarehouseDsn};
use actstream_error::CoreError;
use actstream_queue::QueueConfig;
use actstream_secrets::bootstrap::identities_from_csv;
use actstream_secrets::envelope::VaultKey;
use actstream_secrets::ledger::CredentialRecord;
use serde::Deserialize;

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Per-operation latency budgets (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct PerfBudgets {
    pub get_context_p95_ms: u64,
    pub log_event_ms: u64,
    pub submit_query_ms: u64,
    pub db_query_ms: u64,
    pub connection_ms: u64,
}

impl Default for PerfBudgets {
    fn default() -> Self {
        Self { get_context_p95_ms: 25, log_event_ms: 10, submit_query_ms: 50, db_query_ms: 1_000, connection_ms: 5_000 }
    }
}

impl PerfBudgets {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            get_context_p95_ms: env_u64("PERF_GET_CONTEXT_P95_MS", defaults.get_context_p95_ms),
            log_event_ms: env_u64("PERF_LOG_EVENT_MS", defaults.log_event_ms),
            submit_query_ms: env_u64("PERF_SUBMIT_QUERY_MS", defaults.submit_query_ms),
            db_query_ms: env_u64("PERF_DB_QUERY_MS", defaults.db_query_ms),
            connection_ms: env_u64("PERF_CONNECTION_MS", defaults.connection_ms),
        }
    }
}

/// L2 shared-cache connection coordinates (spec §6 `L2_HOST/PORT/...`).
#[derive(Debug, Clone, Default)]
pub struct L2Settings {
    pub host: Option<String>,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    pub prefix: String,
}

impl L2Settings {
    fn from_env() -> Self {
        Self {
            host: env_var("L2_HOST"),
            port: env_var("L2_PORT").and_then(|v| v.parse().ok()).unwrap_or(6379),
            password: env_var("L2_PASSWORD"),
            db: env_var("L2_DB").and_then(|v| v.parse().ok()).unwrap_or(0),
            prefix: env_var("L2_PREFIX").unwrap_or_else(|| "actstream".to_string()),
        }
    }
}

/// A local-development override file, loaded with `--config` and applied
/// only where the environment is silent (spec `SPEC_FULL.md` §6).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverrideFile {
    pub queue_path: Option<PathBuf>,
    pub l2_host: Option<String>,
    pub cache_max_size: Option<usize>,
    pub cache_ttl_ms: Option<u64>,
}

impl ConfigOverrideFile {
    pub fn from_file(path: &Path) -> actstream_error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::internal_with_source("failed to read config override file", e))?;
        toml::from_str(&content).map_err(|e| CoreError::internal_with_source("failed to parse config override file", e))
    }
}

/// The assembled process configuration.
pub struct ServerConfig {
    pub dsn: WarehouseDsn,
    pub identities: Vec<CredentialRecord>,
    pub vault_key: VaultKey,
    pub vault_path: Option<PathBuf>,
    pub pool: PoolConfig,
    pub breaker: BreakerConfig,
    pub cache: CacheConfig,
    pub warmer: WarmerConfig,
    pub l2: L2Settings,
    pub queue: QueueConfig,
    pub perf: PerfBudgets,
    pub ticket_ttl_ms: u64,
    pub http_bind: String,
}

impl ServerConfig {
    /// Builds configuration from the environment, optionally layering a
    /// `--config` TOML override on top for values the environment leaves
    /// unset (file never overrides an explicitly set env var).
    pub fn load(override_path: Option<&Path>) -> actstream_error::Result<Self> {
        let overrides = override_path.map(ConfigOverrideFile::from_file).transpose()?.unwrap_or_default();

        let dsn = WarehouseDsn {
            host: env_var("WAREHOUSE_ACCOUNT").unwrap_or_else(|| "localhost".to_string()),
            port: env_var("WAREHOUSE_PORT").and_then(|v| v.parse().ok()).unwrap_or(5432),
            database: env_var("WAREHOUSE_DATABASE").unwrap_or_else(|| "analytics".to_string()),
            schema: env_var("WAREHOUSE_SCHEMA"),
            role: env_var("WAREHOUSE_ROLE"),
        };

        let identities = if let (Some(accounts), Some(passwords)) = (env_var("WAREHOUSE_ACCOUNTS"), env_var("WAREHOUSE_PASSWORDS")) {
            identities_from_csv(
                &accounts,
                &passwords,
                &env_var("WAREHOUSE_ACCOUNT_PRIORITIES").unwrap_or_default(),
                &env_var("WAREHOUSE_MAX_FAILURES").unwrap_or_default(),
                &env_var("WAREHOUSE_COOLDOWN_MS").unwrap_or_default(),
            )?
        } else {
            let user = env_var("WAREHOUSE_USER").unwrap_or_else(|| "ingest".to_string());
            let password = env_var("WAREHOUSE_PASSWORD").unwrap_or_default();
            vec![CredentialRecord::new(user, password, 1)]
        };

        let vault_key = VaultKey::new(env_var("VAULT_ENCRYPTION_KEY").unwrap_or_else(|| "dev-only-insecure-key".to_string()));
        let vault_path = env_var("VAULT_PATH").map(PathBuf::from);

        let l2 = {
            let mut l2 = L2Settings::from_env();
            if l2.host.is_none() {
                l2.host = overrides.l2_host.clone();
            }
            l2
        };

        let mut cache = CacheConfig::default();
        cache.l1_max_size = env_usize("CACHE_MAX_SIZE", overrides.cache_max_size.unwrap_or(cache.l1_max_size));
        cache.l1_ttl_ms = env_u64("CACHE_TTL_MS", overrides.cache_ttl_ms.unwrap_or(cache.l1_ttl_ms));

        let queue_path = env_var("QUEUE_PATH").map(PathBuf::from).or_else(|| overrides.queue_path.clone()).unwrap_or_else(|| PathBuf::from("./queue"));
        let mut queue = QueueConfig::new(queue_path);
        queue.max_size_bytes = env_u64("QUEUE_MAX_SIZE", queue.max_size_bytes);
        queue.max_age_ms = env_u64("QUEUE_MAX_AGE_MS", queue.max_age_ms);
        queue.max_events = env_u64("QUEUE_MAX_EVENTS", queue.max_events);

        let perf = PerfBudgets::from_env();
        // `PERF_CONNECTION_MS` bounds pool acquisition (spec §5: "warehouse
        // checkout/query (query timeout argument)"); `PERF_DB_QUERY_MS`
        // bounds the query itself once a connection is in hand (spec §4.9
        // `get_context`). Both flow from the same env-driven budgets so a
        // deployment tunes them in one place.
        let pool = PoolConfig { acquisition_timeout_ms: perf.connection_ms, query_timeout_ms: perf.db_query_ms, ..PoolConfig::default() };

        Ok(Self {
            dsn,
            identities,
            vault_key,
            vault_path,
            pool,
            breaker: BreakerConfig::default(),
            cache,
            warmer: WarmerConfig::default(),
            l2,
            queue,
            perf,
            ticket_ttl_ms: env_u64("TICKET_TTL_MS", 5 * 60 * 1_000),
            http_bind: env_var("HTTP_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_override_file_parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actstream.toml");
        std::fs::write(&path, "cache_max_size = 42\n").unwrap();
        let overrides = ConfigOverrideFile::from_file(&path).unwrap();
        assert_eq!(overrides.cache_max_size, Some(42));
        assert_eq!(overrides.l2_host, None);
    }
}
