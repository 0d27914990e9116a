//! Breaker configuration (spec §4.3).

/// Tuning knobs for one [`crate::breaker::IdentityBreaker`]. Defaults follow
/// the exponential-backoff shape applied to spec §4.3's breaker state
/// table.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures in `CLOSED` before tripping to `OPEN`.
    pub failure_threshold: u32,
    /// Consecutive successes in `HALF_OPEN` before resetting to `CLOSED`.
    pub success_threshold: u32,
    /// Base recovery timeout before the first probe is allowed.
    pub recovery_timeout_ms: u64,
    /// Backoff multiplier applied per additional `HALF_OPEN` failure.
    pub backoff_multiplier: f64,
    /// Hard cap on the computed backoff.
    pub max_backoff_ms: u64,
    /// Sliding window after which accumulated failures decay to zero.
    pub failure_window_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout_ms: 30_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 300_000,
            failure_window_ms: 60_000,
        }
    }
}
