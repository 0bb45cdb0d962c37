//! pushdaemon - delivery orchestration for rate-limited webhooks
//!
//! Each configured feed is a [`task::Task`] that produces a small JSON
//! payload for one webhook. The [`scheduler::Scheduler`] decides when each
//! feed may send, backs off exponentially after failures, persists that
//! state across restarts and sleeps only until the next feed is due.

pub mod backoff;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod scheduler;
pub mod state;
pub mod task;

pub use backoff::{BackoffPolicy, wait_seconds};
pub use config::{Config, DeliveryConfig, Secrets};
pub use delivery::{DeliveryClient, DeliveryOutcome, Destination, Payload, Tier, WebhookClient};
pub use scheduler::{IterationReport, Scheduler, SchedulerConfig};
pub use state::{DeliveryState, SchedulerState, StateError, StateStore};
pub use task::{CollectionError, Task, TaskRegistry};
