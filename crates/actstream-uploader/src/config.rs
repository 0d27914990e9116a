//! Uploader policy (spec §4.8, §6: `UPLOAD_BATCH_SIZE`, `UPLOAD_INTERVAL_MS`,
//! `RETRY_MAX_ATTEMPTS`, `RETRY_BACKOFF_MS`, `RETRY_MAX_BACKOFF_MS`).

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub watch_path: PathBuf,
    pub max_batch_size: usize,
    pub poll_interval_ms: u64,
    /// A segment modified more recently than this is assumed still being
    /// written and is skipped this cycle (spec §4.8: "skip any modified in
    /// the last 5 seconds").
    pub quiescence_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    /// Upper bound on segments uploaded concurrently (spec `SPEC_FULL.md`
    /// §4.8: "bounded by a semaphore so multiple segments can upload
    /// concurrently without unbounded connection fan-out").
    pub max_concurrent_segments: usize,
}

impl UploaderConfig {
    #[must_use]
    pub fn new(watch_path: PathBuf) -> Self {
        Self {
            watch_path,
            max_batch_size: 100,
            poll_interval_ms: 5_000,
            quiescence_ms: 5_000,
            retry_max_attempts: 3,
            retry_base_backoff_ms: 1_000,
            retry_max_backoff_ms: 30_000,
            max_concurrent_segments: 4,
        }
    }

    #[must_use]
    pub fn processed_dir(&self) -> PathBuf {
        self.watch_path.join("processed")
    }

    #[must_use]
    pub fn error_dir(&self) -> PathBuf {
        self.watch_path.join("error")
    }

    /// Builds config from the environment (spec §6: `QUEUE_PATH`,
    /// `UPLOAD_BATCH_SIZE`, `UPLOAD_INTERVAL_MS`, `RETRY_MAX_ATTEMPTS`,
    /// `RETRY_BACKOFF_MS`, `RETRY_MAX_BACKOFF_MS`). `watch_path` defaults to
    /// `./queue`, matching the tool server's own `QUEUE_PATH` default.
    #[must_use]
    pub fn from_env() -> Self {
        fn env_var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }
        fn env_u64(name: &str, default: u64) -> u64 {
            env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn env_usize(name: &str, default: usize) -> usize {
            env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn env_u32(name: &str, default: u32) -> u32 {
            env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
        }

        let watch_path = env_var("QUEUE_PATH").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./queue"));
        let defaults = Self::new(watch_path.clone());
        Self {
            watch_path,
            max_batch_size: env_usize("UPLOAD_BATCH_SIZE", defaults.max_batch_size),
            poll_interval_ms: env_u64("UPLOAD_INTERVAL_MS", defaults.poll_interval_ms),
            quiescence_ms: defaults.quiescence_ms,
            retry_max_attempts: env_u32("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_base_backoff_ms: env_u64("RETRY_BACKOFF_MS", defaults.retry_base_backoff_ms),
            retry_max_backoff_ms: env_u64("RETRY_MAX_BACKOFF_MS", defaults.retry_max_backoff_ms),
            max_concurrent_segments: defaults.max_concurrent_segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        let config = UploaderConfig::from_env();
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.retry_max_attempts, 3);
    }
}
