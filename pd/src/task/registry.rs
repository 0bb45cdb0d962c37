//! Task registry built from configuration

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{CommandFeed, FeedConfig, FeedSource, RegistryError, StaticFeed, Task};
use crate::config::{Config, Secrets};
use crate::delivery::Destination;

/// The fixed set of tasks for this process
#[derive(Default, Clone)]
pub struct TaskRegistry {
    tasks: Vec<Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a task for every enabled feed
    pub fn from_config(config: &Config, secrets: &Secrets) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        for feed in &config.feeds {
            if !feed.enabled {
                debug!(feed = %feed.id, "TaskRegistry::from_config: feed disabled, skipping");
                continue;
            }
            let task = build_feed(feed, config, secrets)?;
            registry.register(task)?;
            info!(feed = %feed.id, "Registered feed");
        }

        Ok(registry)
    }

    /// Add a task; identities must be unique
    pub fn register(&mut self, task: Arc<dyn Task>) -> Result<(), RegistryError> {
        if self.tasks.iter().any(|t| t.identity() == task.identity()) {
            return Err(RegistryError::DuplicateTask(task.identity().to_string()));
        }
        self.tasks.push(task);
        Ok(())
    }

    pub fn tasks(&self) -> &[Arc<dyn Task>] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

fn build_feed(feed: &FeedConfig, config: &Config, secrets: &Secrets) -> Result<Arc<dyn Task>, RegistryError> {
    let webhook_id = secrets
        .webhook_id(&feed.webhook_id_key)
        .ok_or_else(|| RegistryError::MissingWebhook {
            feed: feed.id.clone(),
            key: feed.webhook_id_key.clone(),
        })?;

    let tier = feed.tier.unwrap_or(config.delivery.tier);
    let destination = Destination::new(webhook_id, tier);
    let poll_interval = Duration::from_secs(feed.poll_interval_secs.unwrap_or(config.scheduler.poll_interval_secs));

    if poll_interval.is_zero() {
        return Err(RegistryError::InvalidFeed {
            feed: feed.id.clone(),
            reason: "poll interval must be greater than zero".to_string(),
        });
    }

    let task: Arc<dyn Task> = match &feed.source {
        FeedSource::Static { variables } => Arc::new(StaticFeed::new(
            feed.id.clone(),
            poll_interval,
            destination,
            variables.clone(),
        )),
        FeedSource::Command {
            program,
            args,
            timeout_ms,
        } => {
            if program.trim().is_empty() {
                return Err(RegistryError::InvalidFeed {
                    feed: feed.id.clone(),
                    reason: "command program is empty".to_string(),
                });
            }
            Arc::new(CommandFeed::new(
                feed.id.clone(),
                poll_interval,
                destination,
                program.clone(),
                args.clone(),
                Duration::from_millis(*timeout_ms),
            ))
        }
    };

    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::Tier;

    fn config_with_feeds(yaml_feeds: &str) -> Config {
        let yaml = format!(
            "scheduler:\n  poll-interval-secs: 300\ndelivery:\n  tier: plus\nfeeds:\n{}",
            yaml_feeds
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn secrets(pairs: &[(&str, &str)]) -> Secrets {
        Secrets {
            webhooks: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn test_builds_enabled_feeds_only() {
        let config = config_with_feeds(
            r#"
  - id: weather
    webhook-id-key: WEATHER
    source: {kind: command, program: weather-json}
  - id: heartbeat
    webhook-id-key: HB
    poll-interval-secs: 60
    tier: standard
    source: {kind: static, variables: {status: ok}}
  - id: off
    enabled: false
    webhook-id-key: OFF
    source: {kind: static}
"#,
        );
        let registry =
            TaskRegistry::from_config(&config, &secrets(&[("WEATHER", "w-123456789"), ("HB", "h-1")])).unwrap();

        assert_eq!(registry.len(), 2);
        let weather = &registry.tasks()[0];
        assert_eq!(weather.identity(), "weather");
        assert_eq!(weather.poll_interval(), Duration::from_secs(300));
        assert_eq!(weather.destination().max_payload_bytes(), Tier::Plus.max_payload_bytes());
        assert_eq!(weather.destination().webhook_id(), "w-123456789");

        let heartbeat = &registry.tasks()[1];
        assert_eq!(heartbeat.poll_interval(), Duration::from_secs(60));
        assert_eq!(heartbeat.destination().max_payload_bytes(), 2048);
    }

    #[test]
    fn test_missing_webhook_key() {
        let config = config_with_feeds(
            r#"
  - id: solar
    webhook-id-key: PD_REGISTRY_TEST_MISSING_KEY
    source: {kind: static}
"#,
        );
        let err = TaskRegistry::from_config(&config, &Secrets::default()).err().unwrap();
        assert!(matches!(err, RegistryError::MissingWebhook { ref feed, .. } if feed == "solar"));
    }

    #[test]
    fn test_empty_program_rejected() {
        let config = config_with_feeds(
            r#"
  - id: broken
    webhook-id-key: K
    source: {kind: command, program: "  "}
"#,
        );
        let err = TaskRegistry::from_config(&config, &secrets(&[("K", "id")])).err().unwrap();
        assert!(matches!(err, RegistryError::InvalidFeed { .. }));
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let mut registry = TaskRegistry::new();
        let make = || -> Arc<dyn Task> {
            Arc::new(StaticFeed::new(
                "dup",
                Duration::from_secs(1),
                Destination::new("x", Tier::Standard),
                Default::default(),
            ))
        };
        registry.register(make()).unwrap();
        assert!(matches!(
            registry.register(make()),
            Err(RegistryError::DuplicateTask(id)) if id == "dup"
        ));
    }
}
