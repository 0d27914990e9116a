//! `submit_query(template, params, byte_cap?) -> ticket_id` (spec §4.9).
//!
//! Validates the template name and its parameters synchronously (so a bad
//! call never reaches the ticket manager), then enqueues a `sql_executed`
//! event and hands back the ticket id. The actual warehouse execution is
//! performed asynchronously by a spawned task.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use actstream_error::{CoreError, Result};
use actstream_templates::{registry, ArtifactReference, Event, Param};

use crate::tool_server::{query_tag, AppState};

/// Sample rows embedded inline alongside an artifact reference (spec §3:
/// "at most 10 rows, at most 128 KiB").
const ARTIFACT_SAMPLE_ROWS: usize = 10;
const ARTIFACT_SAMPLE_MAX_BYTES: usize = 128 * 1024;

fn params_to_positional(template_name: &str, params: &HashMap<String, Value>) -> Result<Vec<Param>> {
    // Templates declare positional placeholders; the RPC surface accepts
    // named params keyed by declared parameter name in the order
    // `param_0, param_1, ...` so a caller can submit an arbitrary known
    // template without this crate special-casing each one.
    let template = registry().get(template_name)?;
    let mut positional = Vec::with_capacity(template.placeholder_count);
    for i in 0..template.placeholder_count {
        let key = format!("param_{i}");
        let value = params.get(&key).ok_or_else(|| CoreError::invalid_argument(format!("missing parameter '{key}' for template '{template_name}'")))?;
        positional.push(value_to_param(value));
    }
    Ok(positional)
}

fn value_to_param(value: &Value) -> Param {
    match value {
        Value::String(s) => Param::Str(s.clone()),
        Value::Number(n) => n.as_i64().map_or_else(|| Param::F64(n.as_f64().unwrap_or_default()), Param::I64),
        Value::Bool(b) => Param::Bool(*b),
        Value::Null => Param::Null,
        other => Param::Json(other.clone()),
    }
}

pub async fn handle(state: &AppState, template: &str, params: HashMap<String, Value>, byte_cap: Option<u64>) -> Result<Uuid> {
    let timer = state.metrics.start("submit_query");
    let result = run(state, template, params, byte_cap).await;
    state.metrics.record(timer, result.is_ok());
    result
}

async fn run(state: &AppState, template: &str, params: HashMap<String, Value>, byte_cap: Option<u64>) -> Result<Uuid> {
    let positional = params_to_positional(template, &params)?;
    let bound = registry().get(template)?.validate(&positional)?;
    let query_tag = query_tag("query");

    let ticket = state.tickets.create(template.to_string(), params, byte_cap, query_tag.clone());

    let enqueue_event = Event {
        event_id: Uuid::new_v4(),
        activity: "assistant.sql_executed".to_string(),
        customer: String::new(),
        ts: chrono::Utc::now(),
        occurrence: None,
        repeated_at: None,
        link: None,
        revenue_impact: None,
        features: serde_json::json!({"template": template, "ticket_id": ticket.ticket_id}),
        source_system: None,
        source_version: None,
        session_id: None,
        query_tag: Some(query_tag.clone()),
    };
    if let Err(e) = state.queue.push(&enqueue_event) {
        warn!(error = %e, "failed to enqueue sql_executed event for submitted query");
    }

    let pool = std::sync::Arc::clone(&state.pool);
    let tickets = std::sync::Arc::clone(&state.tickets);
    let ticket_id = ticket.ticket_id;
    let template_name = template.to_string();
    tokio::spawn(async move {
        tickets.mark_running(ticket_id);
        match pool.execute(&template_name, &bound, None).await {
            Ok(rows) => {
                let rows_json: Vec<Value> = rows
                    .iter()
                    .map(|row| {
                        let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
                        Value::Object(columns.into_iter().enumerate().map(|(i, name)| (name, row_value(row, i))).collect())
                    })
                    .collect();
                let result = spill_if_over_cap(rows_json, byte_cap);
                tickets.mark_done(ticket_id, result);
            },
            Err(e) => tickets.mark_error(ticket_id, e.to_string()),
        }
    });

    Ok(ticket_id)
}

/// Applies the `byte_cap` (spec §4.9 `submit_query`): rows are returned
/// inline unless their serialized size exceeds the cap, in which case only
/// a bounded sample and an [`ArtifactReference`] pointer are returned —
/// the full result is assumed already persisted to external object
/// storage by the warehouse-side execution path (out of core scope, spec
/// §1), so this pointer carries a synthetic URL keyed by `artifact_id`.
fn spill_if_over_cap(rows: Vec<Value>, byte_cap: Option<u64>) -> Value {
    let Some(cap) = byte_cap else {
        return Value::Array(rows);
    };
    let serialized = serde_json::to_vec(&rows).unwrap_or_default();
    if (serialized.len() as u64) <= cap {
        return Value::Array(rows);
    }
    let artifact_id = Uuid::new_v4();
    let mut sample: Vec<Value> = rows.into_iter().take(ARTIFACT_SAMPLE_ROWS).collect();
    // Drop rows from the sample until it fits the hard cap rather than
    // truncating mid-row JSON (spec §3: "bounded sample (<=10 rows,
    // <=128 KiB)").
    while serde_json::to_vec(&sample).unwrap_or_default().len() > ARTIFACT_SAMPLE_MAX_BYTES && !sample.is_empty() {
        sample.pop();
    }
    let artifact = ArtifactReference {
        artifact_id,
        object_url: format!("artifact://query-results/{artifact_id}"),
        byte_size: serialized.len() as u64,
        sample,
    };
    serde_json::json!({"truncated": true, "artifact": artifact})
}

fn row_value(row: &tokio_postgres::Row, idx: usize) -> Value {
    row.try_get::<_, Option<String>>(idx)
        .ok()
        .flatten()
        .map_or(Value::Null, Value::String)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_to_param_maps_json_scalars() {
        assert_eq!(value_to_param(&serde_json::json!("x")), Param::Str("x".to_string()));
        assert_eq!(value_to_param(&serde_json::json!(5)), Param::I64(5));
        assert_eq!(value_to_param(&serde_json::json!(true)), Param::Bool(true));
        assert_eq!(value_to_param(&serde_json::json!(null)), Param::Null);
    }

    #[test]
    fn spill_if_over_cap_passes_through_under_cap() {
        let rows = vec![serde_json::json!({"a": 1})];
        let result = spill_if_over_cap(rows.clone(), Some(1_000_000));
        assert_eq!(result, Value::Array(rows));
    }

    #[test]
    fn spill_if_over_cap_passes_through_without_cap() {
        let rows = vec![serde_json::json!({"a": 1})];
        let result = spill_if_over_cap(rows.clone(), None);
        assert_eq!(result, Value::Array(rows));
    }

    #[test]
    fn spill_if_over_cap_produces_bounded_sample_artifact() {
        let rows: Vec<Value> = (0..50).map(|i| serde_json::json!({"customer": format!("cust-{i}"), "blob": "x".repeat(200)})).collect();
        let result = spill_if_over_cap(rows, Some(64));
        assert_eq!(result["truncated"], serde_json::json!(true));
        let sample = result["artifact"]["sample"].as_array().unwrap();
        assert!(sample.len() <= ARTIFACT_SAMPLE_ROWS);
        assert!(result["artifact"]["object_url"].as_str().unwrap().starts_with("artifact://"));
        assert!(result["artifact"]["byte_size"].as_u64().unwrap() > 64);
    }
}
