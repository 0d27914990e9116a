//! `log_insight(subject, metric, value, provenance_hash) -> ack` (spec §4.9).

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use actstream_error::Result;
use actstream_templates::{validate::validate_customer, validate::validate_provenance_hash, Event};

use crate::tool_server::{query_tag, AppState};

pub async fn handle(state: &AppState, customer: &str, subject: &str, metric: &str, value: Value, provenance_hash: &str) -> Result<Uuid> {
    let timer = state.metrics.start("log_insight");
    let result = run(state, customer, subject, metric, value, provenance_hash).await;
    state.metrics.record(timer, result.is_ok());
    result
}

async fn run(state: &AppState, customer: &str, subject: &str, metric: &str, value: Value, provenance_hash: &str) -> Result<Uuid> {
    validate_customer(customer)?;
    validate_provenance_hash(provenance_hash)?;

    let atom_id = Uuid::new_v4();
    let event = Event {
        event_id: Uuid::new_v4(),
        activity: "assistant.insight_recorded".to_string(),
        customer: customer.to_string(),
        ts: chrono::Utc::now(),
        occurrence: None,
        repeated_at: None,
        link: None,
        revenue_impact: None,
        features: serde_json::json!({
            "atom_id": atom_id,
            "subject": subject,
            "metric": metric,
            "value": value,
            "provenance_hash": provenance_hash,
        }),
        source_system: None,
        source_version: None,
        session_id: None,
        query_tag: Some(query_tag("insight")),
    };

    if let Err(e) = state.queue.push(&event) {
        warn!(customer, error = %e, "log_insight enqueue failed");
        return Err(e);
    }
    Ok(atom_id)
}
