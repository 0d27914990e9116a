//! Pool sizing and timeout configuration (spec §4.4, §6).

/// Per-identity pool tuning. Primary identities get a larger `max_size`
/// than backups (spec §4.4: "Pool size derives from identity metadata
/// (primary ~15, backups smaller)").
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_size: usize,
    pub acquisition_timeout_ms: u64,
    pub liveness_probe_interval_ms: u64,
    pub connection_timeout_ms: u64,
    /// Hard deadline on the warehouse query itself, once a connection is in
    /// hand (spec §4.9 `get_context`: "p95 of a cache miss is bounded by
    /// the 1-second database query timeout"; `PERF_DB_QUERY_MS`, default
    /// 1000). Distinct from `acquisition_timeout_ms`, which only bounds
    /// waiting for a pool slot.
    pub query_timeout_ms: u64,
    /// How many candidate identities `get_connection` will walk through
    /// before giving up (spec §4.4 step 2: "repeat up to N identities").
    pub max_candidate_identities: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 15,
            acquisition_timeout_ms: 5_000,
            liveness_probe_interval_ms: 30_000,
            connection_timeout_ms: 5_000,
            query_timeout_ms: 1_000,
            max_candidate_identities: 5,
        }
    }
}

impl PoolConfig {
    /// A smaller pool sized for a backup/failover identity.
    #[must_use]
    pub fn backup(primary: &Self) -> Self {
        Self { max_size: (primary.max_size / 3).max(2), ..*primary }
    }
}
