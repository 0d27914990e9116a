//! Stream-parses a segment's NDJSON lines into [`Event`]s (spec §4.8 step
//! 1). Malformed lines are counted and dropped, never fatal to the
//! segment; a trailing partial line (no final newline, e.g. the queue was
//! mid-write when the uploader's quiescence check still passed) is also
//! dropped silently, matching §6: "Trailing partial lines are ignored by
//! the uploader."

use std::io::BufRead;
use std::path::Path;

use actstream_error::CoreError;
use actstream_templates::Event;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub events: Vec<Event>,
    pub parse_failures: u64,
}

/// Parses one line. A record with no valid `event_id` gets one derived
/// from a SHA-256 over its own canonical form (spec §4.8 step 3) before
/// the rest of its fields are deserialized, rather than being dropped as
/// a parse failure.
fn parse_line(line: &str) -> serde_json::Result<Event> {
    let mut value: Value = serde_json::from_str(line)?;
    let has_valid_event_id = value.get("event_id").and_then(Value::as_str).is_some_and(|s| Uuid::parse_str(s).is_ok());
    if !has_valid_event_id {
        let derived = actstream_templates::derive_event_id(&value);
        if let Value::Object(map) = &mut value {
            map.insert("event_id".to_string(), Value::String(derived.to_string()));
        }
    }
    serde_json::from_value(value)
}

/// Parses every complete line of `path` as one JSON [`Event`].
pub fn parse_segment(path: &Path) -> actstream_error::Result<ParseOutcome> {
    let file = std::fs::File::open(path).map_err(|e| CoreError::internal_with_source("failed to open segment for parsing", e))?;
    let reader = std::io::BufReader::new(file);
    let mut outcome = ParseOutcome::default();
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(segment = %path.display(), error = %e, "failed to read line from segment");
                outcome.parse_failures += 1;
                continue;
            },
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(event) => outcome.events.push(event),
            Err(e) => {
                warn!(segment = %path.display(), error = %e, "dropping unparseable line");
                outcome.parse_failures += 1;
            },
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn write_segment(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join("segment.ndjson");
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();
        path
    }

    fn event_json() -> String {
        serde_json::to_string(&Event {
            event_id: Uuid::new_v4(),
            activity: "assistant.session_started".to_string(),
            customer: "cust-1".to_string(),
            ts: Utc::now(),
            occurrence: None,
            repeated_at: None,
            link: None,
            revenue_impact: None,
            features: serde_json::json!({}),
            source_system: None,
            source_version: None,
            session_id: None,
            query_tag: None,
        })
        .unwrap()
    }

    #[test]
    fn parses_well_formed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let json = event_json();
        let path = write_segment(dir.path(), &[&json, &json]);
        let outcome = parse_segment(&path).unwrap();
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.parse_failures, 0);
    }

    #[test]
    fn malformed_lines_are_counted_and_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let json = event_json();
        let path = write_segment(dir.path(), &[&json, "not json", &json]);
        let outcome = parse_segment(&path).unwrap();
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.parse_failures, 1);
    }

    #[test]
    fn blank_lines_are_not_counted_as_failures() {
        let dir = tempfile::tempdir().unwrap();
        let json = event_json();
        let path = write_segment(dir.path(), &[&json, ""]);
        let outcome = parse_segment(&path).unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.parse_failures, 0);
    }

    #[test]
    fn records_with_no_event_id_get_one_derived_instead_of_being_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let record = serde_json::json!({
            "activity": "assistant.session_started",
            "customer": "cust-1",
            "ts": Utc::now().to_rfc3339(),
        });
        let path = write_segment(dir.path(), &[&record.to_string()]);
        let outcome = parse_segment(&path).unwrap();
        assert_eq!(outcome.parse_failures, 0);
        assert_eq!(outcome.events.len(), 1);
        assert_ne!(outcome.events[0].event_id, Uuid::nil());
    }

    #[test]
    fn derived_event_id_is_stable_for_the_same_record() {
        let dir = tempfile::tempdir().unwrap();
        let record = serde_json::json!({
            "activity": "assistant.session_started",
            "customer": "cust-1",
            "ts": "2026-01-01T00:00:00Z",
        });
        let path = write_segment(dir.path(), &[&record.to_string(), &record.to_string()]);
        let outcome = parse_segment(&path).unwrap();
        assert_eq!(outcome.events[0].event_id, outcome.events[1].event_id);
    }
}
