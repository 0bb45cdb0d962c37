//! Delivery state records

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::timestamp;

/// Delivery history of a single task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryState {
    /// Most recent attempt, successful or not. Absent until the first attempt.
    #[serde(serialize_with = "timestamp::serialize")]
    pub last_attempt_time: Option<DateTime<Utc>>,

    /// Failed attempts since the last success
    pub consecutive_failures: u32,
}

impl<'de> Deserialize<'de> for DeliveryState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Older state files used `timestamp`/`failure_count`, and before that
        // stored a bare timestamp string per webhook.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Record {
                #[serde(default, alias = "timestamp", deserialize_with = "timestamp::deserialize")]
                last_attempt_time: Option<DateTime<Utc>>,
                #[serde(default, alias = "failure_count")]
                consecutive_failures: u32,
            },
            Bare(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Record {
                last_attempt_time,
                consecutive_failures,
            } => Ok(DeliveryState {
                last_attempt_time,
                consecutive_failures,
            }),
            Repr::Bare(raw) => {
                let at = timestamp::parse(&raw)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))?;
                Ok(DeliveryState {
                    last_attempt_time: Some(at),
                    consecutive_failures: 0,
                })
            }
        }
    }
}

/// Delivery state of every task that has ever attempted delivery
///
/// Tasks that never attempted delivery have no entry and are immediately
/// eligible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchedulerState {
    tasks: BTreeMap<String, DeliveryState>,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &str) -> Option<&DeliveryState> {
        self.tasks.get(task_id)
    }

    pub fn insert(&mut self, task_id: impl Into<String>, state: DeliveryState) {
        self.tasks.insert(task_id.into(), state);
    }

    pub fn remove(&mut self, task_id: &str) -> Option<DeliveryState> {
        self.tasks.remove(task_id)
    }

    /// Consecutive failures for a task, 0 if it never attempted delivery
    pub fn failures(&self, task_id: &str) -> u32 {
        self.tasks.get(task_id).map(|s| s.consecutive_failures).unwrap_or(0)
    }

    /// Record a successful delivery: failures reset, attempt time set
    pub fn record_success(&mut self, task_id: &str, now: DateTime<Utc>) {
        let entry = self.tasks.entry(task_id.to_string()).or_default();
        entry.consecutive_failures = 0;
        entry.last_attempt_time = Some(now);
    }

    /// Record a failed delivery and return the new consecutive failure count
    pub fn record_failure(&mut self, task_id: &str, now: DateTime<Utc>) -> u32 {
        let entry = self.tasks.entry(task_id.to_string()).or_default();
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_attempt_time = Some(now);
        entry.consecutive_failures
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DeliveryState)> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
