//! Tool server RPC surface, ticket manager, health monitor, and metrics
//! endpoint for the activity stream ingest core (spec §4.9).
//!
//! [`tool_server::AppState`] assembles every component from §2 into one
//! process; [`tool_server::ToolServer`] is the four-operation trait both
//! the in-process caller and the [`http`] adapter call through.

// Test modules assert against fixture data they just constructed; a panic
// there is the test failing, not a user-facing unwrap.
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod context_source;
pub mod handlers;
pub mod health_monitor;
pub mod http;
pub mod metrics;
pub mod tickets;
pub mod tool_server;

pub use config::ServerConfig;
pub use context_source::WarehouseContextSource;
pub use metrics::{MetricsDocument, ServerMetrics};
pub use tickets::TicketManager;
pub use tool_server::{query_tag, AppState, ToolServer};
