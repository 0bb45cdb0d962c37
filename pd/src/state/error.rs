//! State store error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading or saving delivery state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Corrupt state file {path}: {source}")]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("State file I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this is an unparseable state file
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StateError::CorruptState { .. })
    }
}
