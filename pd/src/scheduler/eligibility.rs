//! Eligibility and smart-sleep calculations
//!
//! Pure functions of state and time; the scheduler supplies `now`.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::backoff::BackoffPolicy;
use crate::state::DeliveryState;

/// Earliest time a task may attempt delivery again
///
/// `None` means the task has never attempted delivery and is eligible now.
pub fn next_eligible_at(
    state: Option<&DeliveryState>,
    poll_interval: Duration,
    policy: &BackoffPolicy,
) -> Option<DateTime<Utc>> {
    let state = state?;
    let last = state.last_attempt_time?;
    let gap = policy.required_gap(state.consecutive_failures, poll_interval);
    let gap = TimeDelta::from_std(gap).unwrap_or(TimeDelta::MAX);
    Some(last.checked_add_signed(gap).unwrap_or(DateTime::<Utc>::MAX_UTC))
}

/// Whether a task may attempt delivery at `now`
pub fn is_eligible(
    state: Option<&DeliveryState>,
    now: DateTime<Utc>,
    poll_interval: Duration,
    policy: &BackoffPolicy,
) -> bool {
    match next_eligible_at(state, poll_interval, policy) {
        Some(at) => now >= at,
        None => true,
    }
}

/// How long to sleep until the soonest of `next_times`
///
/// Times already in the past count as zero. The result is clamped to
/// `[min_sleep, max_sleep]`; with no tasks at all the loop sleeps `max_sleep`.
pub fn compute_sleep<I>(next_times: I, now: DateTime<Utc>, min_sleep: Duration, max_sleep: Duration) -> Duration
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let soonest = next_times
        .into_iter()
        .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
        .min();

    match soonest {
        Some(wait) => wait.clamp(min_sleep, max_sleep.max(min_sleep)),
        None => max_sleep.max(min_sleep),
    }
}
