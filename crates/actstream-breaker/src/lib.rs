//! Circuit breaker over warehouse identities (spec §4.3).

pub mod breaker;
pub mod config;
pub mod registry;

pub use breaker::{IdentityBreaker, Snapshot, State};
pub use config::BreakerConfig;
pub use registry::{spawn_cleanup, BreakerRegistry};
