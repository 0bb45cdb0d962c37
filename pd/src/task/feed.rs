//! Configured feed implementations

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::{CollectionError, Task};
use crate::delivery::{Destination, Payload};

/// Feed that always pushes the same variables
pub struct StaticFeed {
    id: String,
    poll_interval: Duration,
    destination: Destination,
    variables: Map<String, Value>,
}

impl StaticFeed {
    pub fn new(
        id: impl Into<String>,
        poll_interval: Duration,
        destination: Destination,
        variables: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            poll_interval,
            destination,
            variables,
        }
    }
}

#[async_trait]
impl Task for StaticFeed {
    fn identity(&self) -> &str {
        &self.id
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn produce_payload(&self) -> Result<Payload, CollectionError> {
        Ok(Payload::new(self.variables.clone()))
    }

    fn destination(&self) -> &Destination {
        &self.destination
    }
}

/// Feed whose variables come from an external program
///
/// The program's stdout must be a single JSON object. A non-zero exit, a
/// timeout, or anything else on stdout is a collection error.
pub struct CommandFeed {
    id: String,
    poll_interval: Duration,
    destination: Destination,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandFeed {
    pub fn new(
        id: impl Into<String>,
        poll_interval: Duration,
        destination: Destination,
        program: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            poll_interval,
            destination,
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Task for CommandFeed {
    fn identity(&self) -> &str {
        &self.id
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn produce_payload(&self) -> Result<Payload, CollectionError> {
        debug!(task = %self.id, program = %self.program, "CommandFeed::produce_payload: spawning");

        let output = match tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.program)
                .args(&self.args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(CollectionError::Spawn {
                    program: self.program.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(CollectionError::Timeout {
                    program: self.program.clone(),
                    after: self.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(CollectionError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr,
            });
        }

        let value: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| CollectionError::InvalidOutput(format!("{} did not print JSON: {}", self.program, e)))?;

        let payload = Payload::from_value(value).ok_or_else(|| {
            CollectionError::InvalidOutput(format!("{} printed JSON that is not an object", self.program))
        })?;

        debug!(task = %self.id, variables = payload.variables().len(), "CommandFeed::produce_payload: collected");
        Ok(payload)
    }

    fn destination(&self) -> &Destination {
        &self.destination
    }
}
