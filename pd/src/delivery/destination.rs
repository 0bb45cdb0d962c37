//! Delivery destinations and payload size tiers

use serde::{Deserialize, Serialize};

/// Payload size tier of a webhook endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Standard accounts: 2 KB per payload
    #[default]
    Standard,
    /// Plus subscribers: 5 KB per payload
    Plus,
}

impl Tier {
    /// Largest accepted request body in bytes
    pub fn max_payload_bytes(&self) -> usize {
        match self {
            Tier::Standard => 2048,
            Tier::Plus => 5120,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Standard => write!(f, "standard"),
            Tier::Plus => write!(f, "plus"),
        }
    }
}

/// Where a task's payloads go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    webhook_id: String,
    max_payload_bytes: usize,
}

impl Destination {
    pub fn new(webhook_id: impl Into<String>, tier: Tier) -> Self {
        Self {
            webhook_id: webhook_id.into(),
            max_payload_bytes: tier.max_payload_bytes(),
        }
    }

    pub fn webhook_id(&self) -> &str {
        &self.webhook_id
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }
}

/// Only the first 8 characters of the webhook id are shown; the full id is a
/// credential.
impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short: String = self.webhook_id.chars().take(8).collect();
        if short.len() < self.webhook_id.len() {
            write!(f, "{}...", short)
        } else {
            write!(f, "{}", short)
        }
    }
}
