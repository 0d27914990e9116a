//! Segment watcher, batcher, and warehouse loader for the activity
//! stream append queue (spec §4.8). Ships as its own binary, typically on
//! a separate host from the queue writer; a single uploader instance per
//! watched directory is required (spec §5: "file-renames are the
//! synchronization point").

// Test modules assert against fixture data they just constructed; a panic
// there is the test failing, not a user-facing unwrap.
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod mover;
pub mod parser;
pub mod scanner;
pub mod uploader;

pub use config::UploaderConfig;
pub use uploader::{process_segment, SegmentOutcome, Uploader};
