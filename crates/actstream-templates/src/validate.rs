//! Shared validation helpers used by both the template validators (§4.1)
//! and the tool server's own input validation (§4.9), so the two never
//! drift.

use actstream_error::CoreError;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::types::{FEATURES_MAX_BYTES, FEATURES_MAX_DEPTH, PROVENANCE_HASH_LEN, RESERVED_JSON_KEYS};

const MAX_CUSTOMER_LEN: usize = 256;
const MAX_ACTIVITY_LEN: usize = 128;

fn activity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(?:[._][a-z0-9]+)*$").expect("static regex is valid"))
}

fn url_scheme_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:https?|s3)://").expect("static regex is valid"))
}

fn hex_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-f]+$").expect("static regex is valid"))
}

fn customer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9@._:-]+$").expect("static regex is valid"))
}

/// Validates `activity`: lowercase, dot-and-underscore only, namespaced,
/// length-bounded (spec §3 invariant).
pub fn validate_activity(activity: &str) -> actstream_error::Result<()> {
    if activity.is_empty() || activity.len() > MAX_ACTIVITY_LEN {
        return Err(CoreError::invalid_argument(format!(
            "activity must be 1..={MAX_ACTIVITY_LEN} chars, got {}",
            activity.len()
        )));
    }
    if !activity_regex().is_match(activity) {
        return Err(CoreError::invalid_argument(format!(
            "activity '{activity}' does not match the namespace pattern <product>.<verb_phrase>"
        )));
    }
    Ok(())
}

/// Validates `customer`: non-empty, length-bounded (spec §3 invariant), and
/// restricted to a safe opaque-identifier character class. The restriction
/// is defense in depth on top of parameter binding (which alone already
/// prevents injection) — it is also what makes scenario §8.6 ("injection
/// resistance") observable as an `InvalidArgument`, rather than merely as a
/// no-op bound string.
pub fn validate_customer(customer: &str) -> actstream_error::Result<()> {
    if customer.is_empty() || customer.len() > MAX_CUSTOMER_LEN {
        return Err(CoreError::invalid_argument(format!(
            "customer must be 1..={MAX_CUSTOMER_LEN} chars, got {}",
            customer.len()
        )));
    }
    if !customer_regex().is_match(customer) {
        return Err(CoreError::invalid_argument("customer contains disallowed characters"));
    }
    Ok(())
}

/// Validates `features`: bounded depth, bounded serialized size, no reserved
/// prototype-mutating keys (spec §3 invariant, boundary behaviors §8).
pub fn validate_features(features: &Value) -> actstream_error::Result<()> {
    if depth(features) > FEATURES_MAX_DEPTH {
        return Err(CoreError::invalid_argument(format!(
            "features nesting exceeds max depth {FEATURES_MAX_DEPTH}"
        )));
    }
    if contains_reserved_key(features) {
        return Err(CoreError::invalid_argument("features contains a reserved key"));
    }
    let serialized =
        serde_json::to_vec(features).map_err(|e| CoreError::internal_with_source("features not serializable", e))?;
    if serialized.len() > FEATURES_MAX_BYTES {
        return Err(CoreError::invalid_argument(format!(
            "features serialized size {} exceeds max {FEATURES_MAX_BYTES} bytes",
            serialized.len()
        )));
    }
    Ok(())
}

fn depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

fn contains_reserved_key(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.keys().any(|k| RESERVED_JSON_KEYS.contains(&k.as_str())) || map.values().any(contains_reserved_key)
        },
        Value::Array(items) => items.iter().any(contains_reserved_key),
        _ => false,
    }
}

/// Validates a URL against a scheme allowlist (`http`, `https`, `s3`).
pub fn validate_url(url: &str) -> actstream_error::Result<()> {
    if !url_scheme_regex().is_match(url) {
        return Err(CoreError::invalid_argument(format!("url '{url}' has a disallowed or missing scheme")));
    }
    Ok(())
}

/// Validates a provenance hash / fingerprint: exactly 16 hex characters
/// (spec §3, §8 boundary behavior, §9 Open Question resolution).
pub fn validate_provenance_hash(hash: &str) -> actstream_error::Result<()> {
    if hash.len() != PROVENANCE_HASH_LEN || !hex_regex().is_match(hash) {
        return Err(CoreError::invalid_argument(format!(
            "provenance_hash must be exactly {PROVENANCE_HASH_LEN} hex characters, got '{hash}' ({} chars)",
            hash.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn activity_namespace_accepts_dots_and_underscores() {
        assert!(validate_activity("assistant.session_started").is_ok());
        assert!(validate_activity("assistant.sql_executed").is_ok());
    }

    #[test]
    fn activity_rejects_uppercase_and_stray_chars() {
        assert!(validate_activity("Assistant.SessionStarted").is_err());
        assert!(validate_activity("assistant/session").is_err());
        assert!(validate_activity("").is_err());
    }

    #[test]
    fn features_depth_boundary() {
        let mut value = json!(1);
        for _ in 0..5 {
            value = json!({ "n": value });
        }
        // depth 5 accepted
        assert!(validate_features(&value).is_ok());
        let deeper = json!({ "n": value });
        // depth 6 rejected
        assert!(validate_features(&deeper).is_err());
    }

    #[test]
    fn features_size_boundary() {
        let ok = json!({ "blob": "a".repeat(FEATURES_MAX_BYTES - 20) });
        assert!(validate_features(&ok).is_ok());
        let too_big = json!({ "blob": "a".repeat(FEATURES_MAX_BYTES + 10) });
        assert!(validate_features(&too_big).is_err());
    }

    #[test]
    fn features_reserved_key_rejected() {
        let value = json!({ "__proto__": { "polluted": true } });
        assert!(validate_features(&value).is_err());
    }

    #[test]
    fn provenance_hash_exact_length() {
        assert!(validate_provenance_hash("0123456789abcdef").is_ok());
        assert!(validate_provenance_hash("0123456789abcde").is_err());
        assert!(validate_provenance_hash("0123456789abcdef0").is_err());
        assert!(validate_provenance_hash("0123456789ABCDEF").is_err());
    }

    #[test]
    fn url_scheme_allowlist() {
        assert!(validate_url("https://example.com/x").is_ok());
        assert!(validate_url("javascript:alert(1)").is_err());
    }

    #[test]
    fn customer_rejects_injection_looking_payloads() {
        assert!(validate_customer("'; DROP TABLE events; --").is_err());
        assert!(validate_customer("cust-1").is_ok());
    }
}
