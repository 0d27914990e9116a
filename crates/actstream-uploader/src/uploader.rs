//! The uploader's per-segment pipeline (spec §4.8): parse, batch,
//! deduplicate, insert, move. Designed to run as its own binary on a
//! separate host from the writer (spec §5: "it makes no in-memory
//! assumptions about the writer").

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use actstream_db::PoolManager;
use actstream_error::CoreError;
use actstream_templates::{Event, Param};

use crate::config::UploaderConfig;
use crate::mover::move_segment;
use crate::parser::parse_segment;
use crate::scanner::{list_segments, stable_segments};

/// Per-segment counters (spec §4.8 step 6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentOutcome {
    pub success: u64,
    pub failed: u64,
    pub duplicates: u64,
    pub parse_failures: u64,
}

enum UploadResult {
    Inserted,
    Duplicate,
}

/// Builds the `LOG_EVENT` parameter list in template-declared order (spec
/// §4.1: `event_id, activity, customer, ts, features, link,
/// revenue_impact`).
fn log_event_params(event: &Event) -> actstream_error::Result<Vec<Param>> {
    let features = serde_json::to_string(&event.features).map_err(|e| CoreError::internal_with_source("features not serializable", e))?;
    Ok(vec![
        Param::Str(event.event_id.to_string()),
        Param::Str(event.activity.clone()),
        Param::Str(event.customer.clone()),
        Param::Str(event.ts.to_rfc3339()),
        Param::Str(features),
        Param::Str(event.link.clone().unwrap_or_default()),
        event.revenue_impact.map_or(Param::Null, Param::I64),
    ])
}

/// Runs `pool.execute(template, params, None)`, retrying transient
/// failures with exponential backoff (spec §4.8: "Retries on transient
/// warehouse errors use exponential backoff (base 1s, multiplier 2, cap
/// 30s, max attempts 3). Permanent errors (constraint violations) move
/// on.").
async fn execute_with_retry(
    pool: &PoolManager,
    template: &str,
    params: &[Param],
    config: &UploaderConfig,
) -> actstream_error::Result<Vec<tokio_postgres::Row>> {
    let mut attempt: u32 = 0;
    loop {
        match pool.execute(template, params, None).await {
            Ok(rows) => return Ok(rows),
            Err(e) if e.is_retriable() && attempt + 1 < config.retry_max_attempts => {
                let backoff_ms = config.retry_base_backoff_ms.saturating_mul(1_u64 << attempt).min(config.retry_max_backoff_ms);
                warn!(template, attempt, backoff_ms, error = %e, "transient warehouse error, retrying");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}

/// Uploads a single event: dedup check, insert, ingest-id record (spec
/// §4.8 steps 3-5).
async fn upload_one(pool: &PoolManager, event: &Event, config: &UploaderConfig) -> actstream_error::Result<UploadResult> {
    let id_param = [Param::Str(event.event_id.to_string())];
    let existing = execute_with_retry(pool, "CHECK_INGEST_ID", &id_param, config).await?;
    if !existing.is_empty() {
        return Ok(UploadResult::Duplicate);
    }
    let log_params = log_event_params(event)?;
    execute_with_retry(pool, "LOG_EVENT", &log_params, config).await?;
    execute_with_retry(pool, "RECORD_INGEST_ID", &id_param, config).await?;
    Ok(UploadResult::Inserted)
}

/// Processes one stable segment end to end and moves it to its terminal
/// directory. Never deletes the segment before the move succeeds (spec
/// §5 invariant 5).
pub async fn process_segment(pool: &PoolManager, path: &Path, config: &UploaderConfig) -> actstream_error::Result<SegmentOutcome> {
    let parsed = parse_segment(path)?;
    let mut outcome = SegmentOutcome { parse_failures: parsed.parse_failures, ..SegmentOutcome::default() };

    for batch in parsed.events.chunks(config.max_batch_size) {
        for event in batch {
            match upload_one(pool, event, config).await {
                Ok(UploadResult::Inserted) => outcome.success += 1,
                Ok(UploadResult::Duplicate) => outcome.duplicates += 1,
                Err(e) => {
                    warn!(segment = %path.display(), event_id = %event.event_id, error = %e, "event upload failed permanently");
                    outcome.failed += 1;
                },
            }
        }
    }

    let dest_dir = if outcome.failed == 0 { config.processed_dir() } else { config.error_dir() };
    move_segment(path, &dest_dir)?;
    info!(
        segment = %path.display(),
        success = outcome.success,
        failed = outcome.failed,
        duplicates = outcome.duplicates,
        parse_failures = outcome.parse_failures,
        moved_to = %dest_dir.display(),
        "segment processed"
    );
    Ok(outcome)
}

/// Owns the watch-directory poll loop. Bounds concurrent segment uploads
/// with a semaphore so a burst of stable segments cannot fan out an
/// unbounded number of warehouse connections at once (`SPEC_FULL.md`
/// §4.8).
pub struct Uploader {
    config: UploaderConfig,
    pool: Arc<PoolManager>,
}

impl Uploader {
    #[must_use]
    pub fn new(config: UploaderConfig, pool: Arc<PoolManager>) -> Self {
        Self { config, pool }
    }

    /// Runs exactly one poll cycle: scan, filter to stable segments,
    /// upload each concurrently (bounded), return each segment's outcome.
    pub async fn run_once(&self) -> actstream_error::Result<Vec<(PathBuf, actstream_error::Result<SegmentOutcome>)>> {
        let candidates = list_segments(&self.config.watch_path)?;
        let stable = stable_segments(candidates, SystemTime::now(), self.config.quiescence_ms);
        if stable.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.max_concurrent_segments));
        let mut handles = Vec::with_capacity(stable.len());
        for segment in stable {
            let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore is never closed");
            let pool = Arc::clone(&self.pool);
            let config = self.config.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let result = process_segment(&pool, &segment, &config).await;
                (segment, result)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(pair) => results.push(pair),
                Err(e) => warn!(error = %e, "segment upload task panicked"),
            }
        }
        Ok(results)
    }

    /// Runs the poll loop forever, sleeping `poll_interval_ms` between
    /// cycles. Intended as the uploader binary's top-level task.
    pub async fn run_forever(self: Arc<Self>) -> ! {
        loop {
            if let Err(e) = self.run_once().await {
                warn!(error = %e, "uploader poll cycle failed");
            }
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn log_event_params_bind_revenue_impact_as_null_when_absent() {
        let event = Event {
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
        };
        let params = log_event_params(&event).unwrap();
        assert_eq!(params.len(), 7);
        assert!(matches!(params[6], Param::Null));
    }

    #[test]
    fn log_event_params_bind_revenue_impact_when_present() {
        let event = Event {
            event_id: Uuid::new_v4(),
            activity: "assistant.session_started".to_string(),
            customer: "cust-1".to_string(),
            ts: Utc::now(),
            occurrence: None,
            repeated_at: None,
            link: None,
            revenue_impact: Some(500),
            features: serde_json::json!({}),
            source_system: None,
            source_version: None,
            session_id: None,
            query_tag: None,
        };
        let params = log_event_params(&event).unwrap();
        assert_eq!(params[6], Param::I64(500));
    }
}
