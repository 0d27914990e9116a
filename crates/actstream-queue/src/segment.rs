//! A single active queue segment: an append-only NDJSON file plus the
//! counters needed to decide when it must rotate (spec §4.7).

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rand::Rng;

use actstream_error::CoreError;

/// Builds a segment filename: an ISO-8601 timestamp plus a random hex
/// suffix, so two segments opened in the same process never collide
/// (spec §4.7: "Filename encodes an ISO-8601 timestamp and a random
/// suffix").
#[must_use]
pub fn segment_filename() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}-{:08x}.ndjson", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"), suffix)
}

pub struct ActiveSegment {
    pub path: PathBuf,
    file: File,
    pub bytes_written: u64,
    pub event_count: u64,
    opened_at: Instant,
}

impl ActiveSegment {
    /// Creates a brand-new segment file in `dir`. The writer never reopens
    /// a previously closed segment (spec §4.7 crash-safety note).
    pub fn create(dir: &Path) -> actstream_error::Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| CoreError::internal_with_source("failed to create queue directory", e))?;
        let path = dir.join(segment_filename());
        let file = File::options()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|e| CoreError::internal_with_source("failed to create queue segment", e))?;
        Ok(Self { path, file, bytes_written: 0, event_count: 0, opened_at: Instant::now() })
    }

    /// Appends already-serialized NDJSON lines (each without a trailing
    /// newline) as a single buffered write, then durability-syncs.
    pub fn append_lines(&mut self, lines: &[String]) -> actstream_error::Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut buffer = String::new();
        for line in lines {
            buffer.push_str(line);
            buffer.push('\n');
        }
        self.file.write_all(buffer.as_bytes()).map_err(|e| CoreError::internal_with_source("queue segment write failed", e))?;
        self.bytes_written += buffer.len() as u64;
        self.event_count += lines.len() as u64;
        Ok(())
    }

    /// Flushes and durability-syncs before rotation or process shutdown
    /// (spec §4.7: "the file descriptor is closed with a durability
    /// sync").
    pub fn close(mut self) -> actstream_error::Result<()> {
        self.file.flush().map_err(|e| CoreError::internal_with_source("queue segment flush failed", e))?;
        self.file.sync_all().map_err(|e| CoreError::internal_with_source("queue segment sync failed", e))?;
        Ok(())
    }

    #[must_use]
    pub fn age_ms(&self) -> u64 {
        self.opened_at.elapsed().as_millis() as u64
    }

    /// Soft rotation triggers: size and age. Event-count is handled
    /// separately as the hard backpressure cap (see [`Self::is_at_hard_cap`]),
    /// since reaching it must reject the write rather than transparently
    /// roll to a new segment (spec §4.7 backpressure note).
    #[must_use]
    pub fn needs_rotation(&self, max_size_bytes: u64, max_age_ms: u64) -> bool {
        self.bytes_written >= max_size_bytes || self.age_ms() >= max_age_ms
    }

    #[must_use]
    pub fn is_at_hard_cap(&self, max_events: u64) -> bool {
        self.event_count >= max_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_unique_across_rapid_creation() {
        let a = segment_filename();
        let b = segment_filename();
        assert_ne!(a, b);
    }

    #[test]
    fn append_and_close_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = ActiveSegment::create(dir.path()).unwrap();
        segment.append_lines(&[r#"{"a":1}"#.to_string(), r#"{"a":2}"#.to_string()]).unwrap();
        assert_eq!(segment.event_count, 2);
        let path = segment.path.clone();
        segment.close().unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn fresh_segment_does_not_need_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let segment = ActiveSegment::create(dir.path()).unwrap();
        assert!(!segment.needs_rotation(u64::MAX, u64::MAX));
    }

    #[test]
    fn hard_cap_is_independent_of_soft_rotation_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = ActiveSegment::create(dir.path()).unwrap();
        segment.append_lines(&[r#"{"a":1}"#.to_string()]).unwrap();
        assert!(segment.is_at_hard_cap(1));
        assert!(!segment.needs_rotation(u64::MAX, u64::MAX));
    }
}
