//! Credential vault (spec §4.2): encrypted-at-rest, priority-ranked
//! warehouse identities with per-identity failure ledger.

// Test modules assert against fixture data they just constructed; a panic
// there is the test failing, not a user-facing unwrap.
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bootstrap;
pub mod envelope;
pub mod ledger;
pub mod vault;

pub use bootstrap::identities_from_csv;
pub use envelope::VaultKey;
pub use ledger::{CredentialRecord, FailureLedger};
pub use vault::Vault;
