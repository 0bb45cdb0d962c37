//! Task error types

use std::time::Duration;
use thiserror::Error;

/// A task failed to produce its payload
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} timed out after {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("Invalid payload: {0}")]
    InvalidOutput(String),

    #[error("{0}")]
    Other(String),
}

/// Errors building the task registry from configuration
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Feed {feed}: no webhook id for key {key} in secrets or environment")]
    MissingWebhook { feed: String, key: String },

    #[error("Duplicate task identity: {0}")]
    DuplicateTask(String),

    #[error("Feed {feed}: {reason}")]
    InvalidFeed { feed: String, reason: String },
}
