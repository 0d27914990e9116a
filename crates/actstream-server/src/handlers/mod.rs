//! RPC handler implementations, one module per tool-server operation.

pub mod get_context;
pub mod log_event;
pub mod log_insight;
pub mod submit_query;
