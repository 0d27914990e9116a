//! Data model and safe-template registry (spec §3, §4.1).
//!
//! This crate owns every type that crosses the warehouse boundary and the
//! closed set of parameterized SQL templates that are the *only* way
//! anything in this workspace talks to the warehouse. No other crate is
//! permitted to format SQL text.

// Test modules assert against fixture data they just constructed; a panic
// there is the test failing, not a user-facing unwrap.
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod canonical;
pub mod registry;
pub mod types;
pub mod validate;

pub use canonical::{canonical_json_string, canonicalize, derive_event_id};
pub use registry::{fingerprint, registry, Param, Registry, Template};
pub use types::{
    ArtifactReference, ContextRecord, Event, InsightAtom, StorageTarget, Ticket, TicketStatus,
    FEATURES_MAX_BYTES, FEATURES_MAX_DEPTH, PROVENANCE_HASH_LEN,
};
