//! Tasks: independent data feeds that produce payloads
//!
//! The scheduler only sees the [`Task`] capability; it never looks at what a
//! feed collects or how.

mod config;
mod error;
mod feed;
mod registry;

use std::time::Duration;

use async_trait::async_trait;

use crate::delivery::{Destination, Payload};

pub use config::{FeedConfig, FeedSource};
pub use error::{CollectionError, RegistryError};
pub use feed::{CommandFeed, StaticFeed};
pub use registry::TaskRegistry;

/// One periodic data feed targeting one destination
#[async_trait]
pub trait Task: Send + Sync {
    /// Stable identity, used as the key in durable state
    fn identity(&self) -> &str;

    /// Nominal gap between deliveries; also the backoff base
    fn poll_interval(&self) -> Duration;

    /// Collect the data to push
    async fn produce_payload(&self) -> Result<Payload, CollectionError>;

    fn destination(&self) -> &Destination;
}
