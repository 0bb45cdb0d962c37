//! Delivery outcome classification

use std::time::Duration;

/// Result of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Destination accepted the payload
    Success,

    /// Destination asked us to slow down (HTTP 429)
    RateLimited { retry_after: Option<Duration> },

    /// Payload exceeds the destination's size limit; nothing was sent
    Oversized { size: usize, limit: usize },

    /// Timeout, connection error, or any other non-2xx response
    TransportFailure { reason: String },
}

impl DeliveryOutcome {
    /// Classify an HTTP response status
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: &str) -> Self {
        match status {
            200..=299 => DeliveryOutcome::Success,
            429 => DeliveryOutcome::RateLimited { retry_after },
            _ => DeliveryOutcome::TransportFailure {
                reason: format!("HTTP {}: {}", status, truncate(body, 200)),
            },
        }
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryOutcome::Success => write!(f, "success"),
            DeliveryOutcome::RateLimited { retry_after: Some(d) } => {
                write!(f, "rate limited (retry after {}s)", d.as_secs())
            }
            DeliveryOutcome::RateLimited { retry_after: None } => write!(f, "rate limited"),
            DeliveryOutcome::Oversized { size, limit } => {
                write!(f, "payload of {} bytes exceeds limit of {} bytes", size, limit)
            }
            DeliveryOutcome::TransportFailure { reason } => write!(f, "transport failure: {}", reason),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert_eq!(DeliveryOutcome::from_status(200, None, ""), DeliveryOutcome::Success);
        assert_eq!(DeliveryOutcome::from_status(204, None, ""), DeliveryOutcome::Success);
        assert_eq!(
            DeliveryOutcome::from_status(429, Some(Duration::from_secs(30)), ""),
            DeliveryOutcome::RateLimited {
                retry_after: Some(Duration::from_secs(30))
            }
        );
        assert!(matches!(
            DeliveryOutcome::from_status(500, None, "boom"),
            DeliveryOutcome::TransportFailure { reason } if reason == "HTTP 500: boom"
        ));
        assert!(matches!(
            DeliveryOutcome::from_status(404, None, ""),
            DeliveryOutcome::TransportFailure { .. }
        ));
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(1000);
        let DeliveryOutcome::TransportFailure { reason } = DeliveryOutcome::from_status(502, None, &body) else {
            panic!("expected transport failure");
        };
        assert!(reason.len() < 220);
        assert!(reason.ends_with("..."));
    }
}
