//! Durable delivery state
//!
//! Tracks, per task, when delivery was last attempted and how many attempts
//! in a row have failed. The state survives restarts so backoff accrued
//! against a remote endpoint is honoured after a crash or redeploy.

mod error;
mod store;
mod timestamp;
mod types;

pub use error::StateError;
pub use store::StateStore;
pub use types::{DeliveryState, SchedulerState};

/// Environment variable that overrides the state file location
pub const STATE_PATH_ENV: &str = "STATE_LOCK_PATH";
