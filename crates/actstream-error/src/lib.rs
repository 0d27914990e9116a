//! Unified error type for the activity stream ingest core.
//!
//! Every crate in the workspace returns `actstream_error::Result<T>`. The six
//! variants of [`CoreError`] are the stable, named error kinds of the RPC
//! surface (`InvalidArgument`, `Overloaded`, `Timeout`, `Unavailable`,
//! `NotFound`, `Internal`); callers across process boundaries see exactly
//! these names via [`CoreError::kind`].

// Test modules assert against fixture data they just constructed; a panic
// there is the test failing, not a user-facing unwrap.
#![cfg_attr(test, allow(clippy::unwrap_used))]

use serde::Serialize;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CoreError>;

/// The stable error kinds of the RPC surface (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Parameter validation failed. Non-retriable.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Queue at capacity or pool exhausted. Retry with backoff.
    #[error("overloaded: {message}")]
    Overloaded { message: String },

    /// A deadline elapsed before the operation completed.
    #[error("timeout after {elapsed_ms}ms: {message}")]
    Timeout { message: String, elapsed_ms: u64 },

    /// All identities are open-circuit, or the warehouse is unreachable.
    #[error("unavailable: {message}")]
    Unavailable { message: String },

    /// A read returned nothing at every tier. Not strictly an error.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Unexpected failure; logged and reported, never exposed verbatim.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CoreError {
    /// Stable, machine-readable kind name used on the wire (§6, §7).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::Overloaded { .. } => "Overloaded",
            Self::Timeout { .. } => "Timeout",
            Self::Unavailable { .. } => "Unavailable",
            Self::NotFound { .. } => "NotFound",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Whether a caller may retry this operation, optionally with backoff.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Overloaded { .. } | Self::Timeout { .. } | Self::Unavailable { .. })
    }

    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    #[must_use]
    pub fn overloaded(message: impl Into<String>) -> Self {
        Self::Overloaded { message: message.into() }
    }

    #[must_use]
    pub fn timeout(message: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout { message: message.into(), elapsed_ms }
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Box::new(source)) }
    }
}

/// Wire-format error body: `{error_kind, message}` plus a retriability flag
/// (spec §6 "RPC surface").
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_kind: String,
    pub message: String,
    pub retriable: bool,
}

impl From<&CoreError> for ErrorBody {
    fn from(err: &CoreError) -> Self {
        Self { error_kind: err.kind().to_string(), message: err.to_string(), retriable: err.is_retriable() }
    }
}

impl From<CoreError> for ErrorBody {
    fn from(err: CoreError) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(CoreError::invalid_argument("x").kind(), "InvalidArgument");
        assert_eq!(CoreError::overloaded("x").kind(), "Overloaded");
        assert_eq!(CoreError::timeout("x", 5).kind(), "Timeout");
        assert_eq!(CoreError::unavailable("x").kind(), "Unavailable");
        assert_eq!(CoreError::not_found("x").kind(), "NotFound");
        assert_eq!(CoreError::internal("x").kind(), "Internal");
    }

    #[test]
    fn only_transient_kinds_are_retriable() {
        assert!(!CoreError::invalid_argument("x").is_retriable());
        assert!(CoreError::overloaded("x").is_retriable());
        assert!(CoreError::timeout("x", 1).is_retriable());
        assert!(CoreError::unavailable("x").is_retriable());
        assert!(!CoreError::not_found("x").is_retriable());
        assert!(!CoreError::internal("x").is_retriable());
    }

    #[test]
    fn error_body_round_trips_kind_and_retriability() {
        let err = CoreError::overloaded("queue full");
        let body = ErrorBody::from(&err);
        assert_eq!(body.error_kind, "Overloaded");
        assert!(body.retriable);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error_kind"], "Overloaded");
    }
}
