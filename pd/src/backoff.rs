//! Exponential backoff for consecutive delivery failures
//!
//! The wait doubles with every consecutive failure, starting from the task's
//! own poll interval, and is clamped by a global cap. There is no jitter: the
//! same inputs always produce the same wait.

use std::time::Duration;

/// Seconds a task must wait after `failures` consecutive failed deliveries.
///
/// Returns 0 when there are no failures, otherwise
/// `min(base_interval * 2^failures, cap)`.
pub fn wait_seconds(failures: u32, base_interval: u64, cap: u64) -> u64 {
    if failures == 0 {
        return 0;
    }

    let factor = 1u64.checked_shl(failures).unwrap_or(u64::MAX);
    base_interval.saturating_mul(factor).min(cap)
}

/// Backoff policy shared by every task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    cap: Duration,
}

impl BackoffPolicy {
    pub fn new(cap: Duration) -> Self {
        Self { cap }
    }

    /// Backoff wait for a task polling every `poll_interval`
    pub fn wait(&self, failures: u32, poll_interval: Duration) -> Duration {
        Duration::from_secs(wait_seconds(failures, poll_interval.as_secs(), self.cap.as_secs()))
    }

    /// Minimum gap between two attempts of the same task
    pub fn required_gap(&self, failures: u32, poll_interval: Duration) -> Duration {
        poll_interval.max(self.wait(failures, poll_interval))
    }

    /// Nominal multiplier for log messages ("backoff x8")
    pub fn multiplier(failures: u32) -> u64 {
        1u64.checked_shl(failures).unwrap_or(u64::MAX)
    }
}
