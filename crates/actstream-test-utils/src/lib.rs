//! Shared fixtures for tests across the workspace: a deterministic event
//! builder and a temp queue directory helper. Kept deliberately small —
//! each crate's own `#[cfg(test)]` modules own their specific fakes (fake
//! clocks, fake `ContextSource`s); this crate only holds what is shared.

use std::path::PathBuf;

use actstream_templates::Event;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Builds an [`Event`] with sane defaults, letting tests override only the
/// fields they care about.
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    #[must_use]
    pub fn new(activity: &str, customer: &str) -> Self {
        Self {
            event: Event {
                event_id: Uuid::new_v4(),
                activity: activity.to_string(),
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
            },
        }
    }

    #[must_use]
    pub fn event_id(mut self, id: Uuid) -> Self {
        self.event.event_id = id;
        self
    }

    #[must_use]
    pub fn ts(mut self, ts: DateTime<Utc>) -> Self {
        self.event.ts = ts;
        self
    }

    #[must_use]
    pub fn features(mut self, features: Value) -> Self {
        self.event.features = features;
        self
    }

    #[must_use]
    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.event.link = Some(link.into());
        self
    }

    #[must_use]
    pub fn revenue_impact(mut self, amount: i64) -> Self {
        self.event.revenue_impact = Some(amount);
        self
    }

    #[must_use]
    pub fn build(self) -> Event {
        self.event
    }
}

/// A temp directory laid out as a queue root: `path`, `path/processed`,
/// `path/error` all created up front so tests never race the uploader's
/// own `create_dir_all` calls.
pub struct TempQueueDir {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

impl TempQueueDir {
    #[must_use]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp queue dir");
        let path = dir.path().to_path_buf();
        std::fs::create_dir_all(path.join("processed")).expect("failed to create processed dir");
        std::fs::create_dir_all(path.join("error")).expect("failed to create error dir");
        Self { _dir: dir, path }
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    #[must_use]
    pub fn processed_dir(&self) -> PathBuf {
        self.path.join("processed")
    }

    #[must_use]
    pub fn error_dir(&self) -> PathBuf {
        self.path.join("error")
    }
}

impl Default for TempQueueDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_a_valid_default_event() {
        let event = EventBuilder::new("assistant.session_started", "cust-1").build();
        assert_eq!(event.activity, "assistant.session_started");
        assert_eq!(event.customer, "cust-1");
    }

    #[test]
    fn temp_queue_dir_pre_creates_terminal_directories() {
        let dir = TempQueueDir::new();
        assert!(dir.processed_dir().is_dir());
        assert!(dir.error_dir().is_dir());
    }
}
