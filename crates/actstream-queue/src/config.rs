//! Segment rotation and flush-buffering policy (spec §4.7, §6).

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub path: PathBuf,
    pub max_size_bytes: u64,
    pub max_age_ms: u64,
    pub max_events: u64,
    pub flush_min_lines: usize,
    pub flush_max_delay_ms: u64,
}

impl QueueConfig {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            max_size_bytes: 16 * 1024 * 1024,
            max_age_ms: 60_000,
            max_events: 100_000,
            flush_min_lines: 100,
            flush_max_delay_ms: 100,
        }
    }
}
