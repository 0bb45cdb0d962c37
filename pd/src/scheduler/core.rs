//! Scheduler loop

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, info, warn};

use super::config::SchedulerConfig;
use super::eligibility::{compute_sleep, next_eligible_at};
use crate::backoff::BackoffPolicy;
use crate::delivery::{DeliveryClient, DeliveryOutcome};
use crate::state::{DeliveryState, SchedulerState, StateStore};
use crate::task::{Task, TaskRegistry};

/// Summary of one pass over every task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Deliveries attempted (any outcome except a collection error)
    pub attempted: usize,
    pub succeeded: usize,
    /// Rate limited or transport failures
    pub failed: usize,
    pub oversized: usize,
    pub collection_errors: usize,
    /// Not yet eligible, or deferred after an earlier skip
    pub skipped: usize,
    /// Delivery state was modified during this iteration
    pub state_changed: bool,
    /// Shutdown arrived before every task was evaluated
    pub interrupted: bool,
    /// Time until the soonest task becomes eligible, clamped to the sleep bounds
    pub next_wake: Duration,
}

/// Drives delivery for a fixed set of tasks
///
/// The scheduler owns the delivery state. It is refreshed from disk at the
/// start of an iteration only while nothing is waiting to be saved, so an
/// operator reset is picked up but a failed save never discards failures
/// counted in memory; the save is retried every iteration and on shutdown.
/// Tasks that
/// could not be delivered for reasons backoff does not cover (collection
/// errors, oversized payloads) are deferred by one poll interval in memory
/// only.
pub struct Scheduler {
    config: SchedulerConfig,
    policy: BackoffPolicy,
    tasks: Vec<Arc<dyn Task>>,
    client: Arc<dyn DeliveryClient>,
    store: StateStore,
    state: SchedulerState,
    /// In-memory state differs from the file until a save succeeds
    dirty: bool,
    deferred: HashMap<String, DateTime<Utc>>,
    shutdown_requested: bool,
    iteration: u64,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        registry: TaskRegistry,
        client: Arc<dyn DeliveryClient>,
        store: StateStore,
    ) -> Self {
        debug!(?config, tasks = registry.len(), "Scheduler::new: called");
        Self {
            policy: config.backoff_policy(),
            config,
            tasks: registry.tasks().to_vec(),
            client,
            store,
            state: SchedulerState::new(),
            dirty: false,
            deferred: HashMap::new(),
            shutdown_requested: false,
            iteration: 0,
        }
    }

    pub fn tasks(&self) -> &[Arc<dyn Task>] {
        &self.tasks
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Current in-memory delivery state
    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Whether changes are still waiting to be persisted
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    /// Run until a shutdown signal arrives
    ///
    /// A signal (or the sender being dropped) during an iteration lets the
    /// in-flight delivery finish, persists the state, then returns.
    pub async fn run(&mut self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(tasks = self.tasks.len(), "Scheduler starting");

        loop {
            let started = Instant::now();
            let report = self.iterate(Utc::now(), Some(&mut shutdown_rx)).await;

            if self.shutdown_requested {
                break;
            }

            let sleep = report
                .next_wake
                .saturating_sub(started.elapsed())
                .max(self.config.min_sleep());
            info!(
                "Sleeping {}s until next eligible task ({} sent, {} failed, {} skipped)",
                sleep.as_secs(),
                report.succeeded,
                report.failed,
                report.skipped
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    self.shutdown_requested = true;
                    break;
                }
            }
        }

        self.flush();
        info!("Scheduler stopped");
    }

    /// One pass over every task at `now`, without sleeping
    pub async fn run_iteration(&mut self, now: DateTime<Utc>) -> IterationReport {
        self.iterate(now, None).await
    }

    async fn iterate(
        &mut self,
        now: DateTime<Utc>,
        mut shutdown_rx: Option<&mut mpsc::Receiver<()>>,
    ) -> IterationReport {
        self.iteration += 1;
        debug!(iteration = self.iteration, %now, "Scheduler::iterate: called");

        if !self.dirty {
            self.state = self.store.load();
        }
        let mut state = std::mem::take(&mut self.state);
        let mut report = IterationReport::default();
        let tasks = self.tasks.clone();

        for task in &tasks {
            if let Some(rx) = shutdown_rx.as_deref_mut()
                && shutdown_pending(rx)
            {
                info!("Shutdown signal received, finishing iteration early");
                self.shutdown_requested = true;
                report.interrupted = true;
                break;
            }

            self.process_task(task.as_ref(), &mut state, now, &mut report).await;
        }

        self.state = state;
        if report.state_changed {
            self.dirty = true;
        }
        self.flush();

        let state = &self.state;
        report.next_wake = compute_sleep(
            self.tasks.iter().map(|t| self.next_attempt_at(t.as_ref(), state, now)),
            now,
            self.config.min_sleep(),
            self.config.max_sleep(),
        );

        debug!(?report, "Scheduler::iterate: done");
        report
    }

    async fn process_task(
        &mut self,
        task: &dyn Task,
        state: &mut SchedulerState,
        now: DateTime<Utc>,
        report: &mut IterationReport,
    ) {
        let id = task.identity();

        if let Some(until) = self.deferred.get(id).copied() {
            if now < until {
                debug!(task = %id, %until, "Task deferred after an earlier skip");
                report.skipped += 1;
                return;
            }
            self.deferred.remove(id);
        }

        let poll_interval = task.poll_interval();
        if let Some(next) = next_eligible_at(state.get(id), poll_interval, &self.policy)
            && now < next
        {
            if let Some(current) = state.get(id) {
                log_skip(id, current, next, now);
            }
            report.skipped += 1;
            return;
        }

        let payload = match task.produce_payload().await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(task = %id, error = %e, "Failed to collect data, skipping");
                report.collection_errors += 1;
                self.defer(id, poll_interval, now);
                return;
            }
        };

        let destination = task.destination();
        report.attempted += 1;
        debug!(task = %id, %destination, size = payload.size(), "Delivering payload");

        match self.client.deliver(destination, &payload).await {
            DeliveryOutcome::Success => {
                state.record_success(id, now);
                report.succeeded += 1;
                report.state_changed = true;
                info!(task = %id, %destination, "Delivered payload");
            }
            DeliveryOutcome::RateLimited { retry_after } => {
                let failures = state.record_failure(id, now);
                report.failed += 1;
                report.state_changed = true;
                warn!(
                    task = %id,
                    %destination,
                    failures,
                    retry_after_secs = retry_after.map(|d| d.as_secs()),
                    "Rate limited, backing off x{}",
                    BackoffPolicy::multiplier(failures)
                );
            }
            DeliveryOutcome::TransportFailure { reason } => {
                let failures = state.record_failure(id, now);
                report.failed += 1;
                report.state_changed = true;
                warn!(
                    task = %id,
                    %destination,
                    failures,
                    %reason,
                    "Delivery failed, backing off x{}",
                    BackoffPolicy::multiplier(failures)
                );
            }
            DeliveryOutcome::Oversized { size, limit } => {
                report.oversized += 1;
                error!(
                    task = %id,
                    %destination,
                    size,
                    limit,
                    "Payload exceeds the destination size limit; check the feed or its tier"
                );
                self.defer(id, poll_interval, now);
            }
        }
    }

    /// Persist pending changes; on failure they stay pending for the next try
    fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        match self.store.save(&self.state) {
            Ok(()) => self.dirty = false,
            Err(e) => error!(error = %e, "Failed to save delivery state, will retry"),
        }
    }

    fn defer(&mut self, id: &str, poll_interval: Duration, now: DateTime<Utc>) {
        let until = chrono::TimeDelta::from_std(poll_interval)
            .ok()
            .and_then(|gap| now.checked_add_signed(gap))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.deferred.insert(id.to_string(), until);
    }

    /// When a task should next be looked at: its backoff/poll schedule, or a
    /// later in-memory deferral
    fn next_attempt_at(&self, task: &dyn Task, state: &SchedulerState, now: DateTime<Utc>) -> DateTime<Utc> {
        let id = task.identity();
        let durable = next_eligible_at(state.get(id), task.poll_interval(), &self.policy).unwrap_or(now);
        match self.deferred.get(id) {
            Some(until) => durable.max(*until),
            None => durable,
        }
    }
}

fn shutdown_pending(rx: &mut mpsc::Receiver<()>) -> bool {
    match rx.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

fn log_skip(id: &str, state: &DeliveryState, next: DateTime<Utc>, now: DateTime<Utc>) {
    let elapsed = state.last_attempt_time.map(|t| (now - t).num_seconds()).unwrap_or(0);
    let remaining = (next - now).num_seconds();
    let at = next.with_timezone(&Local).format("%H:%M");

    if state.consecutive_failures > 0 {
        info!(
            task = %id,
            failures = state.consecutive_failures,
            "Skipping: {}s elapsed, {}s remaining, next attempt at {} (backoff x{})",
            elapsed,
            remaining,
            at,
            BackoffPolicy::multiplier(state.consecutive_failures)
        );
    } else {
        debug!(
            task = %id,
            "Skipping: {}s elapsed, {}s remaining, next attempt at {}",
            elapsed,
            remaining,
            at
        );
    }
}
