//! Data model (spec §3): `Event`, `ContextRecord`, `InsightAtom`,
//! `ArtifactReference`, `Ticket`. Field shapes and invariants follow the
//! specification verbatim; validation of those invariants lives in
//! [`crate::validate`] so the registry's per-template validators and the
//! queue's ingest path share one implementation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Maximum nesting depth of [`Event::features`] (spec §3).
pub const FEATURES_MAX_DEPTH: usize = 5;

/// Maximum serialized size of [`Event::features`] in bytes (spec §3).
pub const FEATURES_MAX_BYTES: usize = 64 * 1024;

/// Exact length of a provenance hash / fingerprint, in hex characters.
pub const PROVENANCE_HASH_LEN: usize = 16;

/// Keys that could mutate a JSON object's prototype if deserialized naively
/// by a downstream consumer; rejected anywhere `features` is validated.
pub const RESERVED_JSON_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Which warehouse target templates address (spec §9 Open Question,
/// resolved in `DESIGN.md`: this deployment targets `ActivitiesTable`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageTarget {
    /// `CLAUDE_LOGS.ACTIVITIES` — the resolved, authoritative target.
    ActivitiesTable,
}

impl Default for StorageTarget {
    fn default() -> Self {
        Self::ActivitiesTable
    }
}

/// The unit flowing through the append queue (spec §3 "Event").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 128-bit unique identifier, client-generated. Idempotency key.
    pub event_id: Uuid,

    /// Namespaced activity name: `<product>.<verb_phrase>`, lowercase,
    /// dot-and-underscore only.
    pub activity: String,

    /// Opaque stable identifier for the subject of the event.
    pub customer: String,

    /// Event time; server-supplied if absent at the RPC boundary.
    pub ts: DateTime<Utc>,

    /// 1-based ordinal of this `(customer, activity)` pair, derived
    /// warehouse-side (§5) — the core only ever stores `None` here; it is
    /// never computed in-process.
    #[serde(default)]
    pub occurrence: Option<u64>,

    /// Time of the next event with the same `(customer, activity)`,
    /// derived warehouse-side; always `None` as produced by this core.
    #[serde(default)]
    pub repeated_at: Option<DateTime<Utc>>,

    /// Optional URL reference.
    #[serde(default)]
    pub link: Option<String>,

    /// Optional signed numeric in a single fixed currency unit.
    #[serde(default)]
    pub revenue_impact: Option<i64>,

    /// Bounded-depth, bounded-size JSON object.
    #[serde(default)]
    pub features: Value,

    /// Extension fields; stored with an underscore prefix at the boundary.
    #[serde(default)]
    pub source_system: Option<String>,
    #[serde(default)]
    pub source_version: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub query_tag: Option<String>,
}

/// The cacheable aggregate per customer (spec §3 "Context record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRecord {
    pub customer: String,
    pub context_blob: Value,
    pub updated_at: DateTime<Utc>,
}

/// A structured memory triple (spec §3 "Insight atom").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightAtom {
    pub atom_id: Uuid,
    pub customer: String,
    pub subject: String,
    pub metric: String,
    pub value: Value,
    /// Exactly 16 hex characters.
    pub provenance_hash: String,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Metadata pointer to a large result held in external object storage
/// (spec §3 "Artifact reference").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub artifact_id: Uuid,
    pub object_url: String,
    pub byte_size: u64,
    /// At most 10 rows, at most 128 KiB, embedded inline for convenience.
    pub sample: Vec<Value>,
}

/// Status of an asynchronously executing query (spec §3 "Ticket").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Running,
    Done,
    Error,
}

/// Opaque handle for an asynchronously executing query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: Uuid,
    pub template_name: String,
    pub params: HashMap<String, Value>,
    pub byte_cap: Option<u64>,
    pub query_tag: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}
