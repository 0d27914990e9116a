//! `log_event(activity, features?, link?) -> ack` (spec §4.9).

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use actstream_error::Result;
use actstream_templates::{validate::validate_activity, Event};

use crate::tool_server::{query_tag, AppState};

/// Activities arriving without a namespace prefix are prepended with this
/// one (spec §4.9: "Normalize `activity`: if missing namespace prefix,
/// prepend the canonical one").
const CANONICAL_NAMESPACE: &str = "assistant";

fn normalize_activity(activity: &str) -> String {
    if activity.contains('.') {
        activity.to_string()
    } else {
        format!("{CANONICAL_NAMESPACE}.{activity}")
    }
}

pub async fn handle(state: &AppState, customer: &str, activity: &str, features: Option<Value>, link: Option<String>) -> Result<Uuid> {
    let timer = state.metrics.start("log_event");
    let result = run(state, customer, activity, features, link).await;
    state.metrics.record(timer, result.is_ok());
    result
}

async fn run(state: &AppState, customer: &str, activity: &str, features: Option<Value>, link: Option<String>) -> Result<Uuid> {
    let activity = normalize_activity(activity);
    validate_activity(&activity)?;
    actstream_templates::validate::validate_customer(customer)?;
    let features = features.unwrap_or_else(|| serde_json::json!({}));
    actstream_templates::validate::validate_features(&features)?;
    if let Some(link) = &link {
        if !link.is_empty() {
            actstream_templates::validate::validate_url(link)?;
        }
    }

    let event = Event {
        event_id: Uuid::new_v4(),
        activity,
        customer: customer.to_string(),
        ts: chrono::Utc::now(),
        occurrence: None,
        repeated_at: None,
        link,
        revenue_impact: None,
        features,
        source_system: None,
        source_version: None,
        session_id: None,
        query_tag: Some(query_tag("ingest")),
    };
    let event_id = event.event_id;

    // Enqueue is fire-and-forget: any downstream failure is observed via
    // queue depth and uploader metrics, never surfaced to the caller
    // (spec §4.9, §7 "write-path operations never surface a warehouse
    // error").
    if let Err(e) = state.queue.push(&event) {
        warn!(event_id = %event_id, error = %e, "log_event enqueue failed");
        return Err(e);
    }
    Ok(event_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_activity_gets_the_canonical_namespace_prefix() {
        assert_eq!(normalize_activity("session_started"), "assistant.session_started");
    }

    #[test]
    fn namespaced_activity_is_left_untouched() {
        assert_eq!(normalize_activity("billing.invoice_paid"), "billing.invoice_paid");
    }
}
