//! The append queue's single writer (spec §4.7). All pushes go through
//! one `QueueWriter`, serializing access behind a single lock — the
//! writer is the sole owner of the active segment's file descriptor.

use std::time::Instant;

use parking_lot::Mutex;
use tracing::warn;

use actstream_error::CoreError;
use actstream_templates::Event;

use crate::config::QueueConfig;
use crate::segment::ActiveSegment;

struct WriterState {
    segment: ActiveSegment,
    buffer: Vec<String>,
    last_flush: Instant,
    serialize_errors: u64,
}

pub struct QueueWriter {
    config: QueueConfig,
    inner: Mutex<WriterState>,
}

impl QueueWriter {
    /// Opens a fresh segment in `config.path` (spec §4.7: "A segment is
    /// created on start").
    pub fn open(config: QueueConfig) -> actstream_error::Result<Self> {
        let segment = ActiveSegment::create(&config.path)?;
        Ok(Self { config, inner: Mutex::new(WriterState { segment, buffer: Vec::new(), last_flush: Instant::now(), serialize_errors: 0 }) })
    }

    /// Enqueues one event. Fails fast with `Overloaded` once the current
    /// segment has hit its hard event cap (spec §4.7 backpressure); a
    /// serialization failure discards the event and bumps an error
    /// counter rather than writing a partial line.
    pub fn push(&self, event: &Event) -> actstream_error::Result<()> {
        let mut state = self.inner.lock();
        if state.segment.is_at_hard_cap(self.config.max_events) {
            return Err(CoreError::overloaded("queue segment is at its hard event cap"));
        }
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                state.serialize_errors += 1;
                warn!(error = %e, event_id = %event.event_id, "event failed to serialize, discarding");
                return Err(CoreError::invalid_argument(format!("event failed to serialize: {e}")));
            },
        };
        state.buffer.push(line);
        let should_flush =
            state.buffer.len() >= self.config.flush_min_lines || state.last_flush.elapsed().as_millis() as u64 >= self.config.flush_max_delay_ms;
        if should_flush {
            Self::flush_locked(&mut state)?;
        }
        self.maybe_rotate(&mut state)?;
        Ok(())
    }

    fn flush_locked(state: &mut WriterState) -> actstream_error::Result<()> {
        if state.buffer.is_empty() {
            return Ok(());
        }
        let lines = std::mem::take(&mut state.buffer);
        state.segment.append_lines(&lines)?;
        state.last_flush = Instant::now();
        Ok(())
    }

    fn maybe_rotate(&self, state: &mut WriterState) -> actstream_error::Result<()> {
        if state.segment.needs_rotation(self.config.max_size_bytes, self.config.max_age_ms) {
            Self::rotate_locked(&self.config, state)?;
        }
        Ok(())
    }

    fn rotate_locked(config: &QueueConfig, state: &mut WriterState) -> actstream_error::Result<()> {
        Self::flush_locked(state)?;
        let new_segment = ActiveSegment::create(&config.path)?;
        let old_segment = std::mem::replace(&mut state.segment, new_segment);
        old_segment.close()
    }

    /// Flushes the current buffer unconditionally, and rotates the
    /// segment if it has hit its hard event cap. Intended to be driven by
    /// a periodic background tick so the ≤100 ms flush watermark holds
    /// during a lull in traffic, and so backpressure from a full segment
    /// (spec §4.7) is only ever transient.
    pub fn flush(&self) -> actstream_error::Result<()> {
        let mut state = self.inner.lock();
        Self::flush_locked(&mut state)?;
        if state.segment.is_at_hard_cap(self.config.max_events) {
            Self::rotate_locked(&self.config, &mut state)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn serialize_error_count(&self) -> u64 {
        self.inner.lock().serialize_errors
    }

    #[must_use]
    pub fn current_segment_event_count(&self) -> u64 {
        self.inner.lock().segment.event_count
    }
}

/// Spawns the periodic flush tick (spec §4.7: "Writes are buffered
/// (>=100 lines or <=100 ms) and flushed atomically").
pub fn spawn_periodic_flush(writer: std::sync::Arc<QueueWriter>, interval_ms: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
        loop {
            ticker.tick().await;
            if let Err(e) = writer.flush() {
                warn!(error = %e, "periodic queue flush failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(customer: &str) -> Event {
        Event {
            event_id: Uuid::new_v4(),
            activity: "page.viewed".to_string(),
            customer: customer.to_string(),
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
        }
    }

    #[test]
    fn push_buffers_until_the_line_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = QueueConfig::new(dir.path().to_path_buf());
        config.flush_min_lines = 3;
        config.flush_max_delay_ms = 60_000;
        let writer = QueueWriter::open(config).unwrap();
        writer.push(&event("cust-1")).unwrap();
        writer.push(&event("cust-1")).unwrap();
        assert_eq!(writer.current_segment_event_count(), 0, "buffer not yet flushed to the segment");
        writer.push(&event("cust-1")).unwrap();
        assert_eq!(writer.current_segment_event_count(), 3);
    }

    #[test]
    fn hard_cap_rejects_with_overloaded() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = QueueConfig::new(dir.path().to_path_buf());
        config.max_events = 2;
        config.flush_min_lines = 1;
        let writer = QueueWriter::open(config).unwrap();
        writer.push(&event("cust-1")).unwrap();
        writer.push(&event("cust-1")).unwrap();
        let err = writer.push(&event("cust-1")).unwrap_err();
        assert_eq!(err.kind(), "Overloaded");
    }

    #[test]
    fn size_trigger_opens_a_new_segment_and_preserves_the_old_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = QueueConfig::new(dir.path().to_path_buf());
        config.max_size_bytes = 1;
        config.flush_min_lines = 1;
        let writer = QueueWriter::open(config).unwrap();
        writer.push(&event("cust-1")).unwrap();
        writer.push(&event("cust-1")).unwrap();
        let segments: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(segments.len(), 2, "rotation should leave the old segment in place and open a new one");
    }

    #[test]
    fn flush_rotates_a_segment_stuck_at_the_hard_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = QueueConfig::new(dir.path().to_path_buf());
        config.max_events = 1;
        config.flush_min_lines = 1;
        let writer = QueueWriter::open(config).unwrap();
        writer.push(&event("cust-1")).unwrap();
        assert!(writer.push(&event("cust-1")).is_err(), "segment is at its hard cap");
        writer.flush().unwrap();
        writer.push(&event("cust-1")).unwrap();
    }
}
