//! Feed configuration

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::delivery::Tier;

/// One configured feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Task identity, also the key in the state file
    pub id: String,

    /// Disabled feeds are not registered
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Key of the webhook id in the secrets file
    #[serde(rename = "webhook-id-key")]
    pub webhook_id_key: String,

    /// Overrides `scheduler.poll-interval-secs`
    #[serde(rename = "poll-interval-secs", default)]
    pub poll_interval_secs: Option<u64>,

    /// Overrides `delivery.tier`
    #[serde(default)]
    pub tier: Option<Tier>,

    /// Where the merge variables come from
    pub source: FeedSource,
}

fn default_enabled() -> bool {
    true
}

/// Source of a feed's merge variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeedSource {
    /// Fixed variables
    Static {
        #[serde(default)]
        variables: Map<String, Value>,
    },

    /// External program printing a JSON object on stdout
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(rename = "timeout-ms", default = "default_command_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_command_timeout_ms() -> u64 {
    60_000
}
