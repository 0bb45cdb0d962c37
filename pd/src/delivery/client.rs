//! DeliveryClient trait and the HTTP webhook implementation

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use tracing::debug;

use super::{DeliveryOutcome, Destination, Payload};
use crate::config::DeliveryConfig;

/// Sends payloads to destinations
///
/// One call is one attempt. Implementations never retry; a hung call must
/// give up at the client timeout and report a transport failure.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn deliver(&self, destination: &Destination, payload: &Payload) -> DeliveryOutcome;
}

/// Posts payloads as JSON to `<base-url>/<webhook-id>`
pub struct WebhookClient {
    base_url: String,
    http: Client,
    timeout: Duration,
}

impl WebhookClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(%base_url, ?timeout, "WebhookClient::new: called");
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            http,
            timeout,
        })
    }

    pub fn from_config(config: &DeliveryConfig) -> Result<Self, reqwest::Error> {
        Self::new(&config.base_url, config.timeout())
    }

    fn url_for(&self, destination: &Destination) -> String {
        format!("{}/{}", self.base_url, destination.webhook_id())
    }
}

#[async_trait]
impl DeliveryClient for WebhookClient {
    async fn deliver(&self, destination: &Destination, payload: &Payload) -> DeliveryOutcome {
        let body = payload.to_body();
        let size = body.len();
        let limit = destination.max_payload_bytes();

        if size > limit {
            debug!(%destination, size, limit, "deliver: payload too large, not sending");
            return DeliveryOutcome::Oversized { size, limit };
        }

        debug!(%destination, size, "deliver: posting payload");
        let response = match self
            .http
            .post(self.url_for(destination))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("timed out after {}ms", self.timeout.as_millis())
                } else {
                    e.to_string()
                };
                debug!(%destination, %reason, "deliver: request failed");
                return DeliveryOutcome::TransportFailure { reason };
            }
        };

        let status = response.status();
        debug!(%destination, status = status.as_u16(), "deliver: response received");

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let text = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };

        DeliveryOutcome::from_status(status.as_u16(), retry_after, &text)
    }
}
