//! Delivery scheduler
//!
//! Decides, per task, whether delivery is due, applies backoff after failures
//! and sleeps only until the next task becomes eligible.

mod config;
mod core;
mod eligibility;

pub use config::SchedulerConfig;
pub use self::core::{IterationReport, Scheduler};
pub use eligibility::{compute_sleep, is_eligible, next_eligible_at};
