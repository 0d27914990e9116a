//! Canonical JSON form used for hashing: object keys are recursively
//! sorted (and lowercased, for keys only) so that two semantically
//! identical payloads that merely differ in key order or key case hash
//! identically (spec §3 addition: "a `Canonicalize` operation on `Event`
//! that lowercases/sorts JSON object keys before fingerprinting or
//! hashing" — used by the uploader's `event_id` derivation, §4.8 step 3,
//! and by the template registry's query fingerprint, §4.1).

use sha2::{Digest, Sha256};
use serde_json::Value;
use uuid::Uuid;

/// Recursively sorts (and lowercases) object keys, leaving array order and
/// scalar values untouched.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.iter().map(|(k, v)| (k.to_ascii_lowercase(), canonicalize(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        },
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Renders `value` through [`canonicalize`] and serializes it compactly.
/// The result is the input to both the uploader's event-id derivation
/// (when a client omits `event_id`) and the template fingerprint.
#[must_use]
pub fn canonical_json_string(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// Derives a deterministic `event_id` for a record that arrived without
/// one (spec §4.8 step 3: "if absent, derive from a SHA-256 over the
/// canonical record"). Takes the first 16 bytes of the digest as the
/// UUID's bytes, so the same record always derives the same id.
#[must_use]
pub fn derive_event_id(record: &Value) -> Uuid {
    let canonical = canonical_json_string(record);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_canonical_form() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_json_string(&a), canonical_json_string(&b));
    }

    #[test]
    fn key_case_is_normalized() {
        let a = json!({"Activity": "x"});
        let b = json!({"activity": "x"});
        assert_eq!(canonical_json_string(&a), canonical_json_string(&b));
    }

    #[test]
    fn nested_objects_are_canonicalized_recursively() {
        let a = json!({"outer": {"z": 1, "y": 2}});
        let b = json!({"outer": {"y": 2, "z": 1}});
        assert_eq!(canonical_json_string(&a), canonical_json_string(&b));
    }

    #[test]
    fn array_order_is_preserved() {
        let value = json!({"list": [3, 1, 2]});
        assert!(canonical_json_string(&value).contains("[3,1,2]"));
    }

    #[test]
    fn derived_event_id_is_deterministic_for_equivalent_records() {
        let a = json!({"customer": "cust-1", "activity": "x", "ts": "2026-01-01T00:00:00Z"});
        let b = json!({"activity": "x", "ts": "2026-01-01T00:00:00Z", "customer": "cust-1"});
        assert_eq!(derive_event_id(&a), derive_event_id(&b));
    }

    #[test]
    fn derived_event_id_differs_for_different_records() {
        let a = json!({"customer": "cust-1"});
        let b = json!({"customer": "cust-2"});
        assert_ne!(derive_event_id(&a), derive_event_id(&b));
    }
}
