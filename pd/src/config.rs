//! Configuration types and loading
//!
//! Configuration is YAML and read once at startup; it is immutable for the
//! lifetime of the process. Webhook ids live in a separate secrets file so
//! the main config can be shared.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::delivery::Tier;
use crate::scheduler::SchedulerConfig;
use crate::state::STATE_PATH_ENV;
use crate::task::FeedConfig;

/// Project-local config file name
const LOCAL_CONFIG: &str = "pushdaemon.yml";

/// Main pushdaemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Where delivery state is persisted
    #[serde(rename = "state-path")]
    pub state_path: Option<PathBuf>,

    /// Secrets file holding webhook ids
    #[serde(rename = "secrets-path")]
    pub secrets_path: Option<PathBuf>,

    /// Scheduler timing
    pub scheduler: SchedulerConfig,

    /// Webhook delivery
    pub delivery: DeliveryConfig,

    /// Data feeds to push
    pub feeds: Vec<FeedConfig>,

    /// File this config was loaded from
    #[serde(skip)]
    source: Option<PathBuf>,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./pushdaemon.yml`, then
    /// `<config_dir>/pushdaemon/pushdaemon.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::default_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(p) => p.clone(),
            None => Self::default_paths().into_iter().find(|p| p.exists())?,
        };

        #[derive(Deserialize)]
        struct LogLevelOnly {
            #[serde(rename = "log-level")]
            log_level: Option<String>,
        }

        let content = fs::read_to_string(path).ok()?;
        serde_yaml::from_str::<LogLevelOnly>(&content).ok()?.log_level
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("pushdaemon").join("pushdaemon.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.source = Some(path.as_ref().to_path_buf());

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;

        if self.delivery.timeout_ms == 0 {
            return Err(eyre::eyre!("delivery.timeout-ms must be greater than zero"));
        }

        let mut seen = std::collections::HashSet::new();
        for feed in &self.feeds {
            if feed.id.trim().is_empty() {
                return Err(eyre::eyre!("Feed with empty id"));
            }
            if !seen.insert(feed.id.as_str()) {
                return Err(eyre::eyre!("Duplicate feed id: {}", feed.id));
            }
            if feed.poll_interval_secs == Some(0) {
                return Err(eyre::eyre!("Feed {}: poll-interval-secs must be greater than zero", feed.id));
            }
        }
        Ok(())
    }

    /// Resolve the state file path
    ///
    /// `$STATE_LOCK_PATH` wins over the config, which wins over the default
    /// under the user's local data directory.
    pub fn state_path(&self) -> PathBuf {
        if let Ok(path) = std::env::var(STATE_PATH_ENV)
            && !path.is_empty()
        {
            return PathBuf::from(path);
        }
        if let Some(path) = &self.state_path {
            return path.clone();
        }
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pushdaemon")
            .join("delivery-state.json")
    }

    /// Resolve the secrets file path
    ///
    /// Explicit `secrets-path`, else `secrets.yml` next to the loaded config
    /// file, else `<config_dir>/pushdaemon/secrets.yml`.
    pub fn secrets_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.secrets_path {
            return Some(path.clone());
        }

        let beside_config = self
            .source
            .as_ref()
            .and_then(|p| p.parent())
            .map(|dir| dir.join("secrets.yml"));
        let user = dirs::config_dir().map(|d| d.join("pushdaemon").join("secrets.yml"));

        [beside_config, user].into_iter().flatten().find(|p| p.exists())
    }
}

/// Webhook delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Base URL; the webhook id is appended as the last path segment
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Default payload size tier for every feed
    pub tier: Tier,

    /// Per-request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://usetrmnl.com/api/custom_plugins".to_string(),
            tier: Tier::Standard,
            timeout_ms: 30_000,
        }
    }
}

impl DeliveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Secrets file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Secrets {
    /// Webhook ids keyed by the name feeds refer to
    pub webhooks: HashMap<String, String>,
}

impl Secrets {
    /// Load secrets for a config; no secrets file yields empty secrets
    pub fn load(config: &Config) -> Result<Self> {
        match config.secrets_path() {
            Some(path) => Self::load_from_file(&path),
            None => {
                tracing::info!("No secrets file found, webhook ids will be read from the environment");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read secrets file {}", path.display()))?;
        let secrets: Self = serde_yaml::from_str(&content).context("Failed to parse secrets file")?;
        tracing::info!("Loaded secrets from: {}", path.display());
        Ok(secrets)
    }

    /// Look up a webhook id by key, falling back to an environment variable
    /// of the same name
    pub fn webhook_id(&self, key: &str) -> Option<String> {
        self.webhooks
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
            .filter(|id| !id.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::FeedSource;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.scheduler.poll_interval_secs, 300);
        assert_eq!(config.scheduler.backoff_cap_secs, 3600);
        assert_eq!(config.delivery.tier, Tier::Standard);
        assert_eq!(config.delivery.timeout(), Duration::from_secs(30));
        assert!(config.feeds.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug
state-path: /var/lib/pushdaemon/state.json

scheduler:
  poll-interval-secs: 600
  backoff-cap-secs: 7200
  min-sleep-secs: 2
  max-sleep-secs: 120

delivery:
  base-url: https://hooks.example.com/plugins
  tier: plus
  timeout-ms: 10000

feeds:
  - id: weather
    webhook-id-key: WEATHER_WEBHOOK_ID
    source:
      kind: command
      program: /usr/local/bin/weather-json
      args: ["--station", "backyard"]
  - id: heartbeat
    enabled: false
    webhook-id-key: HEARTBEAT_WEBHOOK_ID
    poll-interval-secs: 900
    tier: standard
    source:
      kind: static
      variables:
        status: ok
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.state_path, Some(PathBuf::from("/var/lib/pushdaemon/state.json")));
        assert_eq!(config.scheduler.poll_interval_secs, 600);
        assert_eq!(config.scheduler.min_sleep_secs, 2);
        assert_eq!(config.delivery.tier, Tier::Plus);
        assert_eq!(config.delivery.base_url, "https://hooks.example.com/plugins");
        assert_eq!(config.feeds.len(), 2);

        let weather = &config.feeds[0];
        assert!(weather.enabled);
        assert_eq!(weather.poll_interval_secs, None);
        assert!(matches!(&weather.source, FeedSource::Command { args, .. } if args.len() == 2));

        let heartbeat = &config.feeds[1];
        assert!(!heartbeat.enabled);
        assert_eq!(heartbeat.tier, Some(Tier::Standard));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
scheduler:
  poll-interval-secs: 60
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.scheduler.poll_interval_secs, 60);
        assert_eq!(config.scheduler.backoff_cap_secs, 3600);
        assert_eq!(config.delivery.timeout_ms, 30_000);
    }

    #[test]
    fn test_validate_rejects_duplicate_feeds() {
        let yaml = r#"
feeds:
  - id: a
    webhook-id-key: A
    source: {kind: static, variables: {}}
  - id: a
    webhook-id-key: B
    source: {kind: static, variables: {}}
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_sleep_bounds() {
        let mut config = Config::default();
        config.scheduler.min_sleep_secs = 600;
        config.scheduler.max_sleep_secs = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file_and_secrets_beside_it() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yml");
        fs::write(&config_path, "log-level: warn\n").unwrap();
        fs::write(temp.path().join("secrets.yml"), "webhooks:\n  WEATHER: abc-123\n").unwrap();

        let config = Config::load(Some(&config_path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("warn"));
        assert_eq!(config.secrets_path(), Some(temp.path().join("secrets.yml")));

        let secrets = Secrets::load(&config).unwrap();
        assert_eq!(secrets.webhook_id("WEATHER").as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_log_level_only() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yml");
        fs::write(&config_path, "log-level: trace\nfeeds: not-a-list\n").unwrap();

        assert_eq!(Config::load_log_level(Some(&config_path)).as_deref(), Some("trace"));
    }

    #[test]
    #[serial]
    fn test_state_path_env_override() {
        let config = Config {
            state_path: Some(PathBuf::from("/from/config.json")),
            ..Default::default()
        };

        // SAFETY: serialized test, no other thread reads the environment
        unsafe { std::env::set_var(STATE_PATH_ENV, "/from/env.json") };
        assert_eq!(config.state_path(), PathBuf::from("/from/env.json"));

        unsafe { std::env::remove_var(STATE_PATH_ENV) };
        assert_eq!(config.state_path(), PathBuf::from("/from/config.json"));
    }

    #[test]
    #[serial]
    fn test_webhook_id_env_fallback() {
        let secrets = Secrets::default();
        // SAFETY: serialized test, no other thread reads the environment
        unsafe { std::env::set_var("PD_TEST_WEBHOOK_ID", "from-env") };
        assert_eq!(secrets.webhook_id("PD_TEST_WEBHOOK_ID").as_deref(), Some("from-env"));
        unsafe { std::env::remove_var("PD_TEST_WEBHOOK_ID") };
        assert_eq!(secrets.webhook_id("PD_TEST_WEBHOOK_ID"), None);
    }
}
