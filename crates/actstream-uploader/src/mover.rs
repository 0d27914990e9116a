//! Moves a fully processed segment to its terminal directory (spec §4.8
//! step 7, §5: "A segment is never deleted before the move. Moves are
//! within the same filesystem; rename must be atomic.")

use std::path::{Path, PathBuf};

use actstream_error::CoreError;

/// Renames `segment` into `dest_dir`, creating `dest_dir` if needed. Both
/// directories must live on the same filesystem as the queue root for the
/// rename to be atomic — callers derive `dest_dir` from
/// [`crate::config::UploaderConfig::processed_dir`]/`error_dir`, which are
/// always subdirectories of the watch path.
pub fn move_segment(segment: &Path, dest_dir: &Path) -> actstream_error::Result<PathBuf> {
    std::fs::create_dir_all(dest_dir).map_err(|e| CoreError::internal_with_source("failed to create terminal segment directory", e))?;
    let file_name = segment.file_name().ok_or_else(|| CoreError::internal("segment path has no file name"))?;
    let dest = dest_dir.join(file_name);
    std::fs::rename(segment, &dest).map_err(|e| CoreError::internal_with_source("failed to move segment to terminal directory", e))?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_segment_into_destination_directory() {
        let dir = tempfile::tempdir().unwrap();
        let segment = dir.path().join("seg.ndjson");
        std::fs::write(&segment, "x").unwrap();
        let dest_dir = dir.path().join("processed");
        let moved = move_segment(&segment, &dest_dir).unwrap();
        assert!(moved.exists());
        assert!(!segment.exists());
    }
}
