//! The safe-template registry (spec §4.1): a process-global, immutable
//! mapping from template name to `{sql_text, validator, placeholder_count}`.
//! All warehouse access in this workspace goes through
//! [`Registry::get`] — nothing else is permitted to build SQL text.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use actstream_error::CoreError;

use crate::types::StorageTarget;
use crate::validate::{validate_activity, validate_customer, validate_features, validate_provenance_hash, validate_url};

/// A single bound parameter. Validators consume untyped [`Param`]s declared
/// by the caller and emit a new, bound list in template-declared order —
/// never raw strings spliced into SQL.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum Param {
    Str(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    Null,
}

impl Param {
    fn as_str(&self) -> actstream_error::Result<&str> {
        match self {
            Self::Str(s) => Ok(s),
            _ => Err(CoreError::invalid_argument("expected a string parameter")),
        }
    }

    fn as_i64(&self) -> actstream_error::Result<i64> {
        match self {
            Self::I64(n) => Ok(*n),
            _ => Err(CoreError::invalid_argument("expected an integer parameter")),
        }
    }
}

type Validator = fn(&[Param]) -> actstream_error::Result<Vec<Param>>;

/// A pre-registered, parameterized SQL statement with its validator.
pub struct Template {
    pub name: &'static str,
    pub sql_text: &'static str,
    pub placeholder_count: usize,
    validator: Validator,
}

impl Template {
    /// Runs this template's validator over caller-supplied parameters,
    /// producing a bound parameter list in declared order.
    pub fn validate(&self, params: &[Param]) -> actstream_error::Result<Vec<Param>> {
        if params.len() != self.placeholder_count {
            return Err(CoreError::invalid_argument(format!(
                "{} expects {} parameter(s), got {}",
                self.name,
                self.placeholder_count,
                params.len()
            )));
        }
        (self.validator)(params)
    }

    /// Query fingerprint = first 16 hex chars of SHA-256 over
    /// `normalize(sql_text) || canonical_json(params)` (spec §4.1).
    #[must_use]
    pub fn fingerprint(&self, params: &[Param]) -> String {
        fingerprint(self.sql_text, params)
    }
}

/// Computes the 16-hex-character query fingerprint / provenance hash.
#[must_use]
pub fn fingerprint(sql_text: &str, params: &[Param]) -> String {
    let normalized = normalize(sql_text);
    let canonical = serde_json::to_string(params).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

fn normalize(sql_text: &str) -> String {
    sql_text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Counts positional placeholder markers (`$1`, `$2`, ...) in `sql_text`.
fn count_placeholders(sql_text: &str) -> usize {
    let mut max_seen = 0usize;
    let bytes = sql_text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut j = start;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > start {
                if let Ok(n) = sql_text[start..j].parse::<usize>() {
                    max_seen = max_seen.max(n);
                }
                i = j;
                continue;
            }
        }
        i += 1;
    }
    max_seen
}

/// Forbidden substrings: string concatenation operators and templating
/// sigils. Any hit fails the startup self-check (spec §4.1).
const FORBIDDEN_SUBSTRINGS: &[&str] = &["||", "{{", "}}", "${", "#{", "concat("];

fn self_check(template: &Template) {
    for needle in FORBIDDEN_SUBSTRINGS {
        assert!(
            !template.sql_text.contains(needle),
            "template '{}' contains forbidden sigil '{needle}'",
            template.name
        );
    }
    let found = count_placeholders(template.sql_text);
    assert_eq!(
        found, template.placeholder_count,
        "template '{}' declares {} placeholder(s) but sql_text has {found}",
        template.name, template.placeholder_count
    );
}

fn validate_log_event(params: &[Param]) -> actstream_error::Result<Vec<Param>> {
    let event_id = params[0].as_str()?;
    Uuid::parse_str(event_id).map_err(|_| CoreError::invalid_argument("event_id must be a UUID"))?;
    let activity = params[1].as_str()?;
    validate_activity(activity)?;
    let customer = params[2].as_str()?;
    validate_customer(customer)?;
    // params[3] = ts (ISO8601 string), params[4] = features (JSON string)
    let features: serde_json::Value =
        serde_json::from_str(params[4].as_str()?).map_err(|e| CoreError::invalid_argument(format!("features must be JSON: {e}")))?;
    validate_features(&features)?;
    if let Param::Str(link) = &params[5] {
        if !link.is_empty() {
            validate_url(link)?;
        }
    }
    Ok(params.to_vec())
}

fn validate_log_insight(params: &[Param]) -> actstream_error::Result<Vec<Param>> {
    let atom_id = params[0].as_str()?;
    Uuid::parse_str(atom_id).map_err(|_| CoreError::invalid_argument("atom_id must be a UUID"))?;
    let customer = params[1].as_str()?;
    validate_customer(customer)?;
    let provenance_hash = params[4].as_str()?;
    validate_provenance_hash(provenance_hash)?;
    Ok(params.to_vec())
}

fn validate_get_context(params: &[Param]) -> actstream_error::Result<Vec<Param>> {
    let customer = params[0].as_str()?;
    validate_customer(customer)?;
    Ok(params.to_vec())
}

fn validate_update_context(params: &[Param]) -> actstream_error::Result<Vec<Param>> {
    let customer = params[0].as_str()?;
    validate_customer(customer)?;
    if let Param::Json(blob) = &params[1] {
        validate_features(blob)?;
    } else {
        return Err(CoreError::invalid_argument("context_blob must be JSON"));
    }
    Ok(params.to_vec())
}

fn validate_get_recent_activities(params: &[Param]) -> actstream_error::Result<Vec<Param>> {
    let customer = params[0].as_str()?;
    validate_customer(customer)?;
    let limit = params[1].as_i64()?;
    if !(1..=1000).contains(&limit) {
        return Err(CoreError::invalid_argument("limit must be in 1..=1000"));
    }
    Ok(params.to_vec())
}

fn validate_get_activity_stats(params: &[Param]) -> actstream_error::Result<Vec<Param>> {
    let customer = params[0].as_str()?;
    validate_customer(customer)?;
    let activity = params[1].as_str()?;
    validate_activity(activity)?;
    Ok(params.to_vec())
}

fn validate_check_health(params: &[Param]) -> actstream_error::Result<Vec<Param>> {
    Ok(params.to_vec())
}

fn validate_check_ingest_id(params: &[Param]) -> actstream_error::Result<Vec<Param>> {
    let event_id = params[0].as_str()?;
    Uuid::parse_str(event_id).map_err(|_| CoreError::invalid_argument("event_id must be a UUID"))?;
    Ok(params.to_vec())
}

fn validate_record_ingest_id(params: &[Param]) -> actstream_error::Result<Vec<Param>> {
    validate_check_ingest_id(params)
}

fn validate_get_active_customers(params: &[Param]) -> actstream_error::Result<Vec<Param>> {
    let limit = params[0].as_i64()?;
    if !(1..=10_000).contains(&limit) {
        return Err(CoreError::invalid_argument("limit must be in 1..=10000"));
    }
    Ok(params.to_vec())
}

/// The closed set of templates (spec §4.1). The warehouse target is
/// `CLAUDE_LOGS.ACTIVITIES` (resolved Open Question; see `DESIGN.md`).
fn build_templates() -> Vec<Template> {
    vec![
        Template {
            name: "LOG_EVENT",
            sql_text: "INSERT INTO CLAUDE_LOGS.ACTIVITIES \
                       (event_id, activity, customer, ts, features, link, revenue_impact) \
                       VALUES ($1, $2, $3, $4, $5, $6, $7)",
            placeholder_count: 7,
            validator: validate_log_event,
        },
        Template {
            name: "LOG_INSIGHT",
            sql_text: "INSERT INTO CLAUDE_LOGS.INSIGHT_ATOMS \
                       (atom_id, customer, subject, metric, value, provenance_hash, ts) \
                       VALUES ($1, $2, $3, $4, $5, $6, $7)",
            placeholder_count: 7,
            validator: validate_log_insight,
        },
        Template {
            name: "GET_CONTEXT",
            sql_text: "SELECT customer, context_blob, updated_at FROM CLAUDE_LOGS.CONTEXT WHERE customer = $1",
            placeholder_count: 1,
            validator: validate_get_context,
        },
        Template {
            name: "UPDATE_CONTEXT",
            sql_text: "UPDATE CLAUDE_LOGS.CONTEXT SET context_blob = $2, updated_at = now() WHERE customer = $1",
            placeholder_count: 2,
            validator: validate_update_context,
        },
        Template {
            name: "GET_RECENT_ACTIVITIES",
            sql_text: "SELECT activity, ts, features FROM CLAUDE_LOGS.ACTIVITIES \
                       WHERE customer = $1 ORDER BY ts DESC LIMIT $2",
            placeholder_count: 2,
            validator: validate_get_recent_activities,
        },
        Template {
            name: "GET_ACTIVITY_STATS",
            sql_text: "SELECT count(*), max(ts) FROM CLAUDE_LOGS.ACTIVITIES WHERE customer = $1 AND activity = $2",
            placeholder_count: 2,
            validator: validate_get_activity_stats,
        },
        Template {
            name: "CHECK_HEALTH",
            sql_text: "SELECT 1",
            placeholder_count: 0,
            validator: validate_check_health,
        },
        Template {
            name: "CHECK_INGEST_ID",
            sql_text: "SELECT 1 FROM CLAUDE_LOGS.INGEST_IDS WHERE event_id = $1",
            placeholder_count: 1,
            validator: validate_check_ingest_id,
        },
        Template {
            name: "RECORD_INGEST_ID",
            sql_text: "INSERT INTO CLAUDE_LOGS.INGEST_IDS (event_id) VALUES ($1)",
            placeholder_count: 1,
            validator: validate_record_ingest_id,
        },
        Template {
            name: "GET_ACTIVE_CUSTOMERS",
            sql_text: "SELECT customer FROM CLAUDE_LOGS.ACTIVITIES \
                       WHERE ts > now() - interval '1 day' GROUP BY customer LIMIT $1",
            placeholder_count: 1,
            validator: validate_get_active_customers,
        },
    ]
}

/// The process-global template registry.
pub struct Registry {
    templates: Vec<Template>,
    storage_target: StorageTarget,
}

impl Registry {
    /// Looks up a template by name, returning `InvalidArgument` for unknown
    /// names (spec §4.9 `submit_query`).
    pub fn get(&self, name: &str) -> actstream_error::Result<&Template> {
        self.templates
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| CoreError::invalid_argument(format!("unknown template '{name}'")))
    }

    /// All registered template names, for diagnostics and tests.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.templates.iter().map(|t| t.name).collect()
    }

    #[must_use]
    pub const fn storage_target(&self) -> StorageTarget {
        self.storage_target
    }
}

/// Returns the process-global registry, running the startup self-check
/// exactly once (spec §4.1: "at process start the registry self-checks").
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let templates = build_templates();
        for template in &templates {
            self_check(template);
        }
        Registry { templates, storage_target: StorageTarget::ActivitiesTable }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_all_required_templates() {
        let names = registry().names();
        for expected in [
            "LOG_EVENT",
            "LOG_INSIGHT",
            "GET_CONTEXT",
            "UPDATE_CONTEXT",
            "GET_RECENT_ACTIVITIES",
            "GET_ACTIVITY_STATS",
            "CHECK_HEALTH",
            "CHECK_INGEST_ID",
            "RECORD_INGEST_ID",
            "GET_ACTIVE_CUSTOMERS",
        ] {
            assert!(names.contains(&expected), "missing template {expected}");
        }
    }

    #[test]
    fn unknown_template_is_invalid_argument() {
        let err = registry().get("DROP_EVERYTHING").unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn log_event_validator_rejects_wrong_arity() {
        let template = registry().get("LOG_EVENT").unwrap();
        let err = template.validate(&[Param::Str("x".into())]).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn log_event_validator_rejects_bad_activity() {
        let template = registry().get("LOG_EVENT").unwrap();
        let params = vec![
            Param::Str(Uuid::new_v4().to_string()),
            Param::Str("NOT VALID".into()),
            Param::Str("cust-1".into()),
            Param::Str(Utc::now().to_rfc3339()),
            Param::Str("{}".into()),
            Param::Str(String::new()),
            Param::Null,
        ];
        let err = template.validate(&params).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn fingerprint_is_sixteen_hex_chars_and_deterministic() {
        let params = vec![Param::Str("cust-1".into())];
        let fp1 = fingerprint("SELECT 1 WHERE x = $1", &params);
        let fp2 = fingerprint("SELECT   1   WHERE x = $1", &params);
        assert_eq!(fp1.len(), 16);
        assert_eq!(fp1, fp2, "whitespace-insensitive normalization");
    }

    #[test]
    fn injection_payload_rejected_before_any_sql_is_built() {
        let template = registry().get("GET_CONTEXT").unwrap();
        let payload = Param::Str("'; DROP TABLE events; --".into());
        let err = template.validate(&[payload]).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
        assert!(!template.sql_text.contains("DROP"));
    }
}
