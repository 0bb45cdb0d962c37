//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backoff::BackoffPolicy;

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Default poll interval for feeds without their own
    #[serde(rename = "poll-interval-secs", default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound on backoff after repeated failures
    #[serde(rename = "backoff-cap-secs", default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    /// Shortest sleep between iterations
    #[serde(rename = "min-sleep-secs", default = "default_min_sleep_secs")]
    pub min_sleep_secs: u64,

    /// Longest sleep between iterations
    #[serde(rename = "max-sleep-secs", default = "default_max_sleep_secs")]
    pub max_sleep_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_backoff_cap_secs() -> u64 {
    3600
}

fn default_min_sleep_secs() -> u64 {
    5
}

fn default_max_sleep_secs() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            min_sleep_secs: default_min_sleep_secs(),
            max_sleep_secs: default_max_sleep_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn min_sleep(&self) -> Duration {
        Duration::from_secs(self.min_sleep_secs)
    }

    pub fn max_sleep(&self) -> Duration {
        Duration::from_secs(self.max_sleep_secs)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_secs(self.backoff_cap_secs))
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(eyre::eyre!("scheduler.poll-interval-secs must be greater than zero"));
        }
        if self.backoff_cap_secs == 0 {
            return Err(eyre::eyre!("scheduler.backoff-cap-secs must be greater than zero"));
        }
        if self.min_sleep_secs == 0 {
            return Err(eyre::eyre!("scheduler.min-sleep-secs must be greater than zero"));
        }
        if self.min_sleep_secs > self.max_sleep_secs {
            return Err(eyre::eyre!(
                "scheduler.min-sleep-secs ({}) exceeds max-sleep-secs ({})",
                self.min_sleep_secs,
                self.max_sleep_secs
            ));
        }
        Ok(())
    }
}
