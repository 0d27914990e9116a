//! Per-identity circuit breaker state machine (spec §4.3 transition table).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;

use crate::config::BreakerConfig;

/// Breaker state (spec §4.3, §9 "circuit state per identity").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
struct Inner {
    state: State,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    next_retry: Option<DateTime<Utc>>,
}

impl Inner {
    fn new() -> Self {
        Self { state: State::Closed, failure_count: 0, success_count: 0, last_failure: None, last_success: None, next_retry: None }
    }
}

/// One identity's breaker. Cheap to construct; intended to live inside a
/// [`crate::registry::BreakerRegistry`] keyed by identity username.
pub struct IdentityBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

/// A snapshot of breaker state for metrics/health reporting (spec §4.5
/// "breaker states" in the metrics endpoint).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub state: State,
    pub failure_count: u32,
    pub success_count: u32,
}

impl IdentityBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self { config, inner: Mutex::new(Inner::new()) }
    }

    /// Decays failures older than the sliding window to zero (spec §4.3:
    /// "Failures older than the sliding time window are decayed to zero").
    fn decay(inner: &mut Inner, now: DateTime<Utc>, window_ms: u64) {
        if let Some(last_failure) = inner.last_failure {
            let elapsed = (now - last_failure).num_milliseconds().max(0) as u64;
            if elapsed >= window_ms && inner.state == State::Closed {
                inner.failure_count = 0;
            }
        }
    }

    /// `canExecute()` (spec §4.3): in `CLOSED`/`HALF_OPEN` this is a pure
    /// read; in `OPEN` it performs the `OPEN -> HALF_OPEN` transition as a
    /// side effect once `next_retry` has elapsed, and rejects otherwise.
    pub fn can_execute(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock();
        Self::decay(&mut inner, now, self.config.failure_window_ms);
        match inner.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                if inner.next_retry.is_some_and(|t| now >= t) {
                    inner.state = State::HalfOpen;
                    inner.success_count = 0;
                    true
                } else {
                    false
                }
            },
        }
    }

    /// Records a successful call.
    pub fn record_success(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.last_success = Some(now);
        match inner.state {
            State::Closed => {
                inner.failure_count = 0;
            },
            State::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = State::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.next_retry = None;
                }
            },
            State::Open => {},
        }
    }

    /// Records a failed call.
    pub fn record_failure(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(now);
        match inner.state {
            State::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = State::Open;
                    inner.next_retry = Some(now + chrono::Duration::milliseconds(self.config.recovery_timeout_ms as i64));
                }
            },
            State::HalfOpen => {
                inner.state = State::Open;
                let over_threshold = inner.failure_count.saturating_sub(self.config.failure_threshold);
                let backoff_ms = compute_backoff(
                    self.config.recovery_timeout_ms,
                    self.config.backoff_multiplier,
                    over_threshold,
                    self.config.max_backoff_ms,
                );
                inner.failure_count += 1;
                inner.next_retry = Some(now + chrono::Duration::milliseconds(backoff_ms as i64));
            },
            State::Open => {},
        }
    }

    /// Whether this breaker has been quiescent (no activity) for at least
    /// `idle_ms` — used by the registry's cleanup pass (spec §4.3: "evict
    /// metrics for identities quiescent for 2x window").
    #[must_use]
    pub fn is_quiescent_since(&self, now: DateTime<Utc>, idle_ms: u64) -> bool {
        let inner = self.inner.lock();
        let last_activity = match (inner.last_failure, inner.last_success) {
            (Some(f), Some(s)) => f.max(s),
            (Some(f), None) => f,
            (None, Some(s)) => s,
            (None, None) => return true,
        };
        (now - last_activity).num_milliseconds().max(0) as u64 >= idle_ms
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot { state: inner.state, failure_count: inner.failure_count, success_count: inner.success_count }
    }
}

/// Exponential backoff with a multiplicative cap and ±20% jitter, used on
/// the `HALF_OPEN -> OPEN` transition.
fn compute_backoff(base_ms: u64, multiplier: f64, exponent: u32, max_ms: u64) -> u64 {
    let raw = (base_ms as f64) * multiplier.powi(exponent as i32);
    let capped = raw.min(max_ms as f64);
    let jitter_fraction = rand::thread_rng().gen_range(-0.2..=0.2);
    let jittered = capped * (1.0 + jitter_fraction);
    jittered.max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> BreakerConfig {
        BreakerConfig { failure_threshold: 3, success_threshold: 2, recovery_timeout_ms: 1_000, ..BreakerConfig::default() }
    }

    #[test]
    fn closed_stays_closed_below_threshold() {
        let breaker = IdentityBreaker::new(cfg());
        let now = Utc::now();
        breaker.record_failure(now);
        breaker.record_failure(now);
        assert_eq!(breaker.snapshot().state, State::Closed);
        assert!(breaker.can_execute(now));
    }

    #[test]
    fn closed_trips_to_open_at_threshold() {
        let breaker = IdentityBreaker::new(cfg());
        let now = Utc::now();
        breaker.record_failure(now);
        breaker.record_failure(now);
        breaker.record_failure(now);
        assert_eq!(breaker.snapshot().state, State::Open);
        assert!(!breaker.can_execute(now));
    }

    #[test]
    fn open_rejects_before_next_retry_and_probes_after() {
        let breaker = IdentityBreaker::new(cfg());
        let now = Utc::now();
        for _ in 0..3 {
            breaker.record_failure(now);
        }
        assert!(!breaker.can_execute(now + chrono::Duration::milliseconds(500)));
        assert!(breaker.can_execute(now + chrono::Duration::milliseconds(1_001)));
        assert_eq!(breaker.snapshot().state, State::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let breaker = IdentityBreaker::new(cfg());
        let now = Utc::now();
        for _ in 0..3 {
            breaker.record_failure(now);
        }
        let probe_time = now + chrono::Duration::milliseconds(1_001);
        assert!(breaker.can_execute(probe_time));
        breaker.record_success(probe_time);
        assert_eq!(breaker.snapshot().state, State::HalfOpen);
        breaker.record_success(probe_time);
        assert_eq!(breaker.snapshot().state, State::Closed);
    }

    #[test]
    fn half_open_failure_reopens_with_growing_backoff() {
        let breaker = IdentityBreaker::new(cfg());
        let now = Utc::now();
        for _ in 0..3 {
            breaker.record_failure(now);
        }
        let probe_time = now + chrono::Duration::milliseconds(1_001);
        assert!(breaker.can_execute(probe_time));
        breaker.record_failure(probe_time);
        assert_eq!(breaker.snapshot().state, State::Open);
        // immediately after reopening, still rejected
        assert!(!breaker.can_execute(probe_time));
    }

    #[test]
    fn never_hands_out_a_connection_before_next_retry_elapses() {
        let breaker = IdentityBreaker::new(cfg());
        let now = Utc::now();
        for _ in 0..3 {
            breaker.record_failure(now);
        }
        for step_ms in [0, 100, 500, 999] {
            assert!(!breaker.can_execute(now + chrono::Duration::milliseconds(step_ms)));
        }
    }

    #[test]
    fn backoff_is_capped_at_max() {
        let value = compute_backoff(1_000, 2.0, 20, 30_000);
        assert!(value <= 30_000 + 30_000 / 5, "jitter should not exceed ~20% of the cap");
    }
}
