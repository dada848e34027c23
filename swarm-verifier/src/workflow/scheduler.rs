//! Worker Pool / Scheduler
//!
//! N independent worker loops share nothing but the store. Each iteration
//! runs one pass in one transaction:
//! - work done → loop immediately
//! - nothing eligible → sleep the idle interval
//! - error → sleep `min(base * 2^(failures - 1), max)` after counting the failure
//!
//! Any successful iteration (idle included) resets the failure count. The stop
//! predicate is checked before each iteration and while sleeping, never during
//! a pass, so a worker always exits between transactions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn, Instrument};

use super::orchestrator::Orchestrator;
use crate::store::VerificationStore;

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_IDLE_SECS: u64 = 60;
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 60;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 30 * 60;

/// Longest a sleeping worker goes without re-checking the stop predicate
const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Caller-supplied stop signal
pub type StopPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub concurrency: usize,
    pub idle_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            idle_interval: Duration::from_secs(DEFAULT_IDLE_SECS),
            backoff_base: Duration::from_secs(DEFAULT_BACKOFF_BASE_SECS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
        }
    }
}

/// Backoff after `consecutive_failures` failures in a row (counting the latest)
pub fn backoff_delay(consecutive_failures: u32, base: Duration, max: Duration) -> Duration {
    let exponent = consecutive_failures.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}

/// Per-worker iteration counts, summed across workers by [`Scheduler::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Passes that reached a terminal record
    pub processed: u64,
    pub idle: u64,
    pub failures: u64,
}

impl std::ops::AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.idle += other.idle;
        self.failures += other.failures;
    }
}

pub struct Scheduler<S: VerificationStore> {
    store: Arc<S>,
    orchestrator: Arc<Orchestrator>,
    config: SchedulerConfig,
}

impl<S: VerificationStore> Scheduler<S> {
    pub fn new(store: Arc<S>, orchestrator: Arc<Orchestrator>, config: SchedulerConfig) -> Self {
        Self {
            store,
            orchestrator,
            config,
        }
    }

    /// Start the workers and wait until every one has observed `stop`
    pub async fn run(&self, stop: StopPredicate) -> WorkerStats {
        let concurrency = self.config.concurrency.max(1);
        info!(concurrency, "Starting verifier workers");

        let mut workers = JoinSet::new();
        for worker_id in 1..=concurrency {
            let worker = Worker {
                store: Arc::clone(&self.store),
                orchestrator: Arc::clone(&self.orchestrator),
                config: self.config,
                stop: Arc::clone(&stop),
            };
            workers.spawn(
                worker
                    .run()
                    .instrument(tracing::info_span!("worker", worker_id)),
            );
        }

        let mut total = WorkerStats::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(stats) => total += stats,
                Err(e) => error!(error = %e, "Worker task aborted"),
            }
        }

        info!(
            processed = total.processed,
            idle = total.idle,
            failures = total.failures,
            "All verifier workers stopped"
        );
        total
    }
}

struct Worker<S: VerificationStore> {
    store: Arc<S>,
    orchestrator: Arc<Orchestrator>,
    config: SchedulerConfig,
    stop: StopPredicate,
}

impl<S: VerificationStore> Worker<S> {
    async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let mut consecutive_failures: u32 = 0;

        info!("Worker started");

        while !(self.stop)() {
            let now = swarm_common::time::now();
            match self.orchestrator.run_pass(self.store.as_ref(), now).await {
                Ok(outcome) if outcome.is_idle() => {
                    consecutive_failures = 0;
                    stats.idle += 1;
                    info!(
                        wait_secs = self.config.idle_interval.as_secs(),
                        "No predictions to verify"
                    );
                    self.pause(self.config.idle_interval).await;
                }
                Ok(_) => {
                    consecutive_failures = 0;
                    stats.processed += 1;
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    stats.failures += 1;
                    error!(error = %e, "Verifier pass failed");

                    let delay = backoff_delay(
                        consecutive_failures,
                        self.config.backoff_base,
                        self.config.backoff_max,
                    );
                    warn!(
                        seconds = delay.as_secs_f64(),
                        failure_count = consecutive_failures,
                        "Backing off"
                    );
                    self.pause(delay).await;
                }
            }
        }

        info!("Worker stopped");
        stats
    }

    /// Sleep for `duration`, returning early once the stop predicate fires
    async fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if (self.stop)() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            tokio::time::sleep((deadline - now).min(STOP_POLL_INTERVAL)).await;
        }
    }
}
