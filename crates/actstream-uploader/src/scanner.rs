//! Lists stable segments in the watch directory (spec §4.8: "list segments
//! ... sorted lexicographically; skip any modified in the last 5 seconds").

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use actstream_error::CoreError;

/// A segment file found in the watch directory, not yet known to be
/// stable.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Lists `*.ndjson` files directly under `watch_path` (excluding
/// `processed/` and `error/`, which are terminal subdirectories scanned
/// separately, never re-entered).
pub fn list_segments(watch_path: &Path) -> actstream_error::Result<Vec<Candidate>> {
    let mut candidates = Vec::new();
    let entries = match std::fs::read_dir(watch_path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(candidates),
        Err(e) => return Err(CoreError::internal_with_source("failed to read queue watch directory", e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| CoreError::internal_with_source("failed to read directory entry", e))?;
        let path = entry.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != "ndjson") {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| CoreError::internal_with_source("failed to stat segment", e))?;
        let modified = metadata.modified().map_err(|e| CoreError::internal_with_source("failed to read segment mtime", e))?;
        candidates.push(Candidate { path, modified });
    }
    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(candidates)
}

/// Filters `candidates` down to segments whose last modification is older
/// than `quiescence_ms`, i.e. not presently being written by the queue.
#[must_use]
pub fn stable_segments(candidates: Vec<Candidate>, now: SystemTime, quiescence_ms: u64) -> Vec<PathBuf> {
    candidates
        .into_iter()
        .filter(|c| now.duration_since(c.modified).is_ok_and(|age| age.as_millis() as u64 >= quiescence_ms))
        .map(|c| c.path)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn non_ndjson_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "x").unwrap();
        std::fs::write(dir.path().join("a.ndjson"), "x").unwrap();
        let segments = list_segments(dir.path()).unwrap();
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn missing_directory_yields_empty_list() {
        let segments = list_segments(Path::new("/nonexistent/path/xyz")).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn recently_modified_segments_are_excluded_as_unstable() {
        let now = SystemTime::now();
        let fresh = Candidate { path: PathBuf::from("fresh.ndjson"), modified: now };
        let stable = Candidate { path: PathBuf::from("stable.ndjson"), modified: now - Duration::from_secs(30) };
        let result = stable_segments(vec![fresh, stable.clone()], now, 5_000);
        assert_eq!(result, vec![stable.path]);
    }

    #[test]
    fn segments_are_returned_in_lexicographic_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.ndjson"), "x").unwrap();
        std::fs::write(dir.path().join("a.ndjson"), "x").unwrap();
        let segments = list_segments(dir.path()).unwrap();
        assert!(segments[0].path.to_string_lossy().ends_with("a.ndjson"));
        assert!(segments[1].path.to_string_lossy().ends_with("b.ndjson"));
    }
}
