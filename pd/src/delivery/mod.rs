//! Webhook delivery
//!
//! Sends one payload to one destination and classifies the result. Retry
//! timing is not handled here: every call is a single attempt bounded by the
//! client timeout, and the scheduler decides when to try again.

mod client;
mod destination;
mod outcome;
mod payload;

pub use client::{DeliveryClient, WebhookClient};
pub use destination::{Destination, Tier};
pub use outcome::DeliveryOutcome;
pub use payload::Payload;

#[cfg(test)]
pub use client::mock;
