//! The credential vault (spec §4.2): a priority-ordered list of warehouse
//! identities with per-identity failure ledger, persisted encrypted with a
//! salt-per-file envelope.

use std::path::PathBuf;

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use tracing::warn;

use actstream_error::CoreError;

use crate::envelope::{self, VaultKey};
use crate::ledger::CredentialRecord;

/// Encrypted, priority-ordered store of warehouse identities.
pub struct Vault {
    path: Option<PathBuf>,
    key: VaultKey,
    identities: SyncMutex<Vec<CredentialRecord>>,
}

impl Vault {
    /// Builds a vault in memory from an already-constructed identity list
    /// (used by the CSV bootstrap path, §6).
    #[must_use]
    pub fn from_identities(identities: Vec<CredentialRecord>, key: VaultKey) -> Self {
        Self { path: None, key, identities: SyncMutex::new(identities) }
    }

    /// Loads a vault from its encrypted file, or returns an empty vault if
    /// the file does not yet exist (first boot).
    pub fn load_or_empty(path: PathBuf, key: VaultKey) -> actstream_error::Result<Self> {
        if !path.exists() {
            return Ok(Self { path: Some(path), key, identities: SyncMutex::new(Vec::new()) });
        }
        let envelope = std::fs::read(&path).map_err(|e| CoreError::internal_with_source("failed to read vault file", e))?;
        let plaintext = envelope::decrypt(&envelope, &key)?;
        let identities: Vec<CredentialRecord> =
            serde_json::from_slice(&plaintext).map_err(|e| CoreError::internal_with_source("vault file is corrupt", e))?;
        Ok(Self { path: Some(path), key, identities: SyncMutex::new(identities) })
    }

    /// Persists the current identity list. Persistence errors are logged
    /// and surfaced, but the in-memory state (already updated by the
    /// caller) is never rolled back — "a momentary disk failure does not
    /// defeat the breaker" (spec §4.2).
    pub fn persist(&self) -> actstream_error::Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let plaintext = {
            let identities = self.identities.lock();
            serde_json::to_vec(&*identities).map_err(|e| CoreError::internal_with_source("failed to serialize vault", e))?
        };
        let envelope = envelope::encrypt(&plaintext, &self.key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::internal_with_source("failed to create vault dir", e))?;
        }
        std::fs::write(path, envelope).map_err(|e| {
            let err = CoreError::internal_with_source("failed to persist vault file", e);
            warn!(error = %err, "credential vault persistence failed; in-memory state remains authoritative");
            err
        })
    }

    /// `NextAccount()` (spec §4.2): filter to active, non-cooldown
    /// identities, order by priority ascending, prefer the
    /// last-successful identity when tied.
    #[must_use]
    pub fn next_account(&self) -> Option<String> {
        let now = Utc::now();
        let identities = self.identities.lock();
        identities
            .iter()
            .filter(|c| c.is_eligible(now))
            .min_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.last_success.cmp(&a.last_success))
            })
            .map(|c| c.username.clone())
    }

    /// Up to `n` eligible identities in priority order, for the connection
    /// pool's fallback walk (spec §4.4 step 2: "repeat up to N
    /// identities").
    #[must_use]
    pub fn candidates(&self, n: usize) -> Vec<String> {
        let now = Utc::now();
        let mut identities: Vec<&CredentialRecord> = self.identities.lock().iter().filter(|c| c.is_eligible(now)).collect::<Vec<_>>().into_iter().collect();
        identities.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| b.last_success.cmp(&a.last_success)));
        identities.into_iter().take(n).map(|c| c.username.clone()).collect()
    }

    /// `RecordSuccess(u)` (spec §4.2).
    pub fn record_success(&self, username: &str) {
        let now = Utc::now();
        {
            let mut identities = self.identities.lock();
            if let Some(record) = identities.iter_mut().find(|c| c.username == username) {
                record.record_success(now);
            }
        }
        if let Err(err) = self.persist() {
            warn!(%username, error = %err, "failed to persist credential success");
        }
    }

    /// `RecordFailure(u, err)` (spec §4.2).
    pub fn record_failure(&self, username: &str) {
        let now = Utc::now();
        {
            let mut identities = self.identities.lock();
            if let Some(record) = identities.iter_mut().find(|c| c.username == username) {
                record.record_failure(now);
            }
        }
        if let Err(err) = self.persist() {
            warn!(%username, error = %err, "failed to persist credential failure");
        }
    }

    /// `UnlockAccount(u)` (spec §4.2): administrative operation.
    pub fn unlock_account(&self, username: &str) -> actstream_error::Result<()> {
        {
            let mut identities = self.identities.lock();
            let record = identities
                .iter_mut()
                .find(|c| c.username == username)
                .ok_or_else(|| CoreError::not_found(format!("identity '{username}' not found in vault")))?;
            record.unlock();
        }
        self.persist()
    }

    /// Snapshot of a single identity, for health-monitor reporting.
    #[must_use]
    pub fn snapshot(&self, username: &str) -> Option<CredentialRecord> {
        self.identities.lock().iter().find(|c| c.username == username).cloned()
    }

    /// All identities, for bootstrap/diagnostics.
    #[must_use]
    pub fn all(&self) -> Vec<CredentialRecord> {
        self.identities.lock().clone()
    }

    /// Adds or replaces an identity (used by the CSV bootstrap path and by
    /// administrative rotation).
    pub fn upsert(&self, record: CredentialRecord) {
        let mut identities = self.identities.lock();
        if let Some(existing) = identities.iter_mut().find(|c| c.username == record.username) {
            *existing = record;
        } else {
            identities.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault_with(records: Vec<CredentialRecord>) -> Vault {
        Vault::from_identities(records, VaultKey::new("test-key"))
    }

    #[test]
    fn next_account_prefers_lowest_priority() {
        let vault = vault_with(vec![
            CredentialRecord::new("secondary", "p", 5),
            CredentialRecord::new("primary", "p", 1),
        ]);
        assert_eq!(vault.next_account().as_deref(), Some("primary"));
    }

    #[test]
    fn next_account_skips_cooling_down_identities() {
        let mut primary = CredentialRecord::new("primary", "p", 1);
        primary.max_failures = 1;
        primary.record_failure(Utc::now());
        let vault = vault_with(vec![primary, CredentialRecord::new("secondary", "p", 2)]);
        assert_eq!(vault.next_account().as_deref(), Some("secondary"));
    }

    #[test]
    fn failover_then_recovery_updates_last_success() {
        let mut primary = CredentialRecord::new("primary", "p", 1);
        primary.max_failures = 3;
        primary.record_failure(Utc::now());
        primary.record_failure(Utc::now());
        primary.record_failure(Utc::now());
        let vault = vault_with(vec![primary, CredentialRecord::new("secondary", "p", 2)]);

        assert_eq!(vault.next_account().as_deref(), Some("secondary"));
        vault.record_success("secondary");
        assert!(vault.snapshot("secondary").unwrap().last_success.is_some());
    }

    #[test]
    fn persist_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.enc");
        let key = VaultKey::new("round-trip-key");
        let vault = Vault::from_identities(vec![CredentialRecord::new("u1", "p1", 1)], key.clone());
        // Re-point the path and persist.
        let vault = Vault { path: Some(path.clone()), ..vault };
        vault.persist().unwrap();

        let reloaded = Vault::load_or_empty(path, key).unwrap();
        assert_eq!(reloaded.next_account().as_deref(), Some("u1"));
    }

    #[test]
    fn unlock_account_restores_eligibility() {
        let mut primary = CredentialRecord::new("primary", "p", 1);
        primary.max_failures = 1;
        primary.record_failure(Utc::now());
        let vault = vault_with(vec![primary]);
        assert_eq!(vault.next_account(), None);
        vault.unlock_account("primary").unwrap();
        assert_eq!(vault.next_account().as_deref(), Some("primary"));
    }
}
