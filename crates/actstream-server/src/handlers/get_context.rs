//! `get_context(customer, max_bytes?) -> value | null` (spec §4.9).

use serde_json::Value;
use tracing::warn;

use actstream_error::Result;
use actstream_templates::{validate::validate_customer, Param};

use crate::tool_server::AppState;

pub async fn handle(state: &AppState, customer: &str, max_bytes: Option<u64>) -> Result<Option<Value>> {
    let timer = state.metrics.start("get_context");
    let result = run(state, customer, max_bytes).await;
    state.metrics.record(timer, result.is_ok());
    result
}

async fn run(state: &AppState, customer: &str, max_bytes: Option<u64>) -> Result<Option<Value>> {
    validate_customer(customer)?;

    if let Some(value) = state.cache.get(customer).await {
        return Ok(Some(apply_byte_cap(value, max_bytes)));
    }

    // Cache miss: fall through to the warehouse. Read-path failures never
    // surface as errors to the caller, only as a null with a warning log
    // (spec §7: "Read-path ... returns null on warehouse error").
    let template_params = [Param::Str(customer.to_string())];
    let rows = match state.pool.execute("GET_CONTEXT", &template_params, None).await {
        Ok(rows) => rows,
        Err(e) => {
            if e.kind() == "Timeout" {
                return Err(e);
            }
            warn!(customer, error = %e, "get_context warehouse lookup failed, returning null");
            return Ok(None);
        },
    };
    let Some(row) = rows.first() else {
        return Ok(None);
    };
    let blob: Value = row.get("context_blob");
    state.cache.set(customer, blob.clone());
    Ok(Some(apply_byte_cap(blob, max_bytes)))
}

/// If `max_bytes` is supplied and the serialized value exceeds it, returns
/// `{truncated: true, original_size, data}` where `data` never includes
/// bytes past the cap (spec §4.9).
fn apply_byte_cap(value: Value, max_bytes: Option<u64>) -> Value {
    let Some(max_bytes) = max_bytes else { return value };
    let serialized = serde_json::to_vec(&value).unwrap_or_default();
    if (serialized.len() as u64) <= max_bytes {
        return value;
    }
    let prefix = &serialized[..max_bytes as usize];
    let data = serde_json::from_slice(prefix).unwrap_or(Value::Null);
    serde_json::json!({
        "truncated": true,
        "original_size": serialized.len(),
        "data": data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_under_the_cap_is_returned_unchanged() {
        let value = serde_json::json!({"a": 1});
        assert_eq!(apply_byte_cap(value.clone(), Some(1_000)), value);
    }

    #[test]
    fn value_over_the_cap_is_wrapped_with_truncation_metadata() {
        let value = serde_json::json!({"a": "x".repeat(100)});
        let wrapped = apply_byte_cap(value, Some(10));
        assert_eq!(wrapped["truncated"], serde_json::json!(true));
        assert!(wrapped["original_size"].as_u64().unwrap() > 10);
    }
}
