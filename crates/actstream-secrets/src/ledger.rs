//! Credential record and per-identity failure ledger (spec §3 "Credential
//! record", §9 reshaping note: "the vault's per-identity failure ledger is
//! modeled as a tagged variant ... rather than a flat flag, to make the
//! breaker transitions exhaustive").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted, encrypted-at-rest shape of one warehouse identity (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub username: String,
    pub password: String,
    /// 1 (highest) through 10 (lowest).
    pub priority: u8,
    pub max_failures: u32,
    pub cooldown_ms: u64,
    pub max_connections: u32,
    pub consecutive_failures: u32,
    pub in_cooldown: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl CredentialRecord {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>, priority: u8) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            priority,
            max_failures: 3,
            cooldown_ms: 30_000,
            max_connections: 15,
            consecutive_failures: 0,
            in_cooldown: false,
            cooldown_until: None,
            last_success: None,
            last_failure: None,
            is_active: true,
        }
    }

    /// Derives the exhaustive failure-ledger view of this record's mutable
    /// state, so decision logic can match on it instead of juggling three
    /// flat flags independently.
    #[must_use]
    pub fn ledger(&self, now: DateTime<Utc>) -> FailureLedger {
        if self.in_cooldown {
            if let Some(until) = self.cooldown_until {
                if now < until {
                    return FailureLedger::OpenUntil(until);
                }
            }
        }
        if self.consecutive_failures == 0 {
            FailureLedger::Healthy
        } else {
            FailureLedger::Degraded(self.consecutive_failures)
        }
    }

    /// Whether this identity is eligible for selection: active, and not
    /// presently cooling down (spec §4.2 `NextAccount`).
    #[must_use]
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !matches!(self.ledger(now), FailureLedger::OpenUntil(_))
    }

    /// Resets failure tracking on a successful operation (§4.2
    /// `RecordSuccess`). Always applied in-memory, even if a concurrent
    /// persistence write fails — "a momentary disk failure does not defeat
    /// the breaker".
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.in_cooldown = false;
        self.cooldown_until = None;
        self.last_success = Some(now);
    }

    /// Records a failure (§4.2 `RecordFailure`), entering cooldown once
    /// `consecutive_failures >= max_failures`.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures += 1;
        self.last_failure = Some(now);
        if self.consecutive_failures >= self.max_failures {
            self.in_cooldown = true;
            self.cooldown_until = Some(now + chrono::Duration::milliseconds(self.cooldown_ms as i64));
        }
    }

    /// Administrative unlock (§4.2 `UnlockAccount`): clears cooldown and
    /// failure count unconditionally.
    pub fn unlock(&mut self) {
        self.consecutive_failures = 0;
        self.in_cooldown = false;
        self.cooldown_until = None;
    }
}

/// Exhaustive view over a credential's failure state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureLedger {
    /// No recent failures.
    Healthy,
    /// Accumulating failures, still below the cooldown threshold.
    Degraded(u32),
    /// In cooldown until the given instant.
    OpenUntil(DateTime<Utc>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_failure_state() {
        let now = Utc::now();
        let mut record = CredentialRecord::new("u", "p", 1);
        record.record_failure(now);
        record.record_failure(now);
        record.record_success(now);
        assert_eq!(record.ledger(now), FailureLedger::Healthy);
    }

    #[test]
    fn reaching_max_failures_enters_cooldown() {
        let now = Utc::now();
        let mut record = CredentialRecord::new("u", "p", 1);
        record.max_failures = 3;
        record.cooldown_ms = 1_000;
        record.record_failure(now);
        record.record_failure(now);
        assert!(matches!(record.ledger(now), FailureLedger::Degraded(2)));
        record.record_failure(now);
        assert!(matches!(record.ledger(now), FailureLedger::OpenUntil(_)));
        assert!(!record.is_eligible(now));
    }

    #[test]
    fn cooldown_expires_after_its_window() {
        let now = Utc::now();
        let mut record = CredentialRecord::new("u", "p", 1);
        record.max_failures = 1;
        record.cooldown_ms = 1_000;
        record.record_failure(now);
        assert!(!record.is_eligible(now));
        let later = now + chrono::Duration::milliseconds(1_001);
        assert!(matches!(record.ledger(later), FailureLedger::Degraded(1)));
    }

    #[test]
    fn unlock_clears_cooldown_and_failures() {
        let now = Utc::now();
        let mut record = CredentialRecord::new("u", "p", 1);
        record.max_failures = 1;
        record.record_failure(now);
        record.unlock();
        assert!(record.is_eligible(now));
        assert_eq!(record.consecutive_failures, 0);
    }
}
