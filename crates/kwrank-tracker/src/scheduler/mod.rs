//! Refresh scheduling: queue maintenance plus a bounded worker pool.
//!
//! The queue lives in the [`RankingStore`]; this module never holds job state
//! in memory between attempts. A claim is the only point of mutual exclusion
//! between workers, and retries are re-dispatched through `scheduled_at`.

mod worker;

pub use worker::{process_job, system_clock, Clock, JobOutcome, WorkerContext};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kwrank_core::AppConfig;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::competitors::CompetitorRecorder;
use crate::store::{RankingStore, SerpSource};
use crate::TrackerError;
use worker::shutdown_signalled;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub workers: usize,
    /// Idle wait between claim attempts when no job is due.
    pub poll_interval: Duration,
    /// Span over which a cycle's jobs are staggered.
    pub cycle_window: Duration,
    pub job_lease: Duration,
    pub job_retention: Duration,
    pub max_retries: u32,
    pub manual_priority: i32,
}

impl SchedulerSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            workers: config.worker_count,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cycle_window: Duration::from_secs(config.cycle_window_secs),
            job_lease: Duration::from_secs(config.job_lease_secs),
            job_retention: Duration::from_secs(u64::from(config.job_retention_days) * 86_400),
            max_retries: config.job_max_retries,
            manual_priority: config.manual_refresh_priority,
        }
    }
}

/// Result of one scheduling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub recovered: u64,
    pub enqueued: u64,
    pub purged: u64,
}

/// Per-run job counts, summed across workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
    pub requeued: u64,
    pub errors: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Completed { .. } => self.completed += 1,
            JobOutcome::Retrying { .. } => self.retried += 1,
            JobOutcome::Failed { .. } => self.failed += 1,
            JobOutcome::Requeued => self.requeued += 1,
        }
    }

    fn merge(&mut self, other: WorkerStats) {
        self.completed += other.completed;
        self.retried += other.retried;
        self.failed += other.failed;
        self.requeued += other.requeued;
        self.errors += other.errors;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    /// Poll until shutdown.
    Forever,
    /// Stop once no job is due.
    Drain,
}

pub struct RefreshScheduler {
    ctx: Arc<WorkerContext>,
    settings: SchedulerSettings,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new(ctx: WorkerContext, settings: SchedulerSettings) -> Self {
        Self {
            ctx: Arc::new(ctx),
            settings,
        }
    }

    /// Wire a scheduler with the system clock and settings from `config`.
    #[must_use]
    pub fn from_app_config(
        config: &AppConfig,
        store: Arc<dyn RankingStore>,
        serp: Arc<dyn SerpSource>,
    ) -> Self {
        let ctx = WorkerContext {
            store,
            serp,
            metrics: config.metrics_config(),
            retry: config.retry_policy(),
            recorder: CompetitorRecorder::new(config.competitor_top_n),
            clock: system_clock(),
        };
        Self::new(ctx, SchedulerSettings::from_app_config(config))
    }

    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Recover expired leases, enqueue one staggered job per tracked keyword
    /// and purge finished jobs past retention.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] if any queue operation fails.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, TrackerError> {
        let store = &self.ctx.store;
        let recovered = store
            .recover_stale_jobs(now, self.settings.job_lease)
            .await?;
        let enqueued = store
            .enqueue_cycle(now, self.settings.cycle_window, self.settings.max_retries)
            .await?;
        let purged = store
            .purge_finished_jobs(now, self.settings.job_retention)
            .await?;

        let report = CycleReport {
            recovered,
            enqueued,
            purged,
        };
        tracing::info!(
            recovered,
            enqueued,
            purged,
            window_secs = self.settings.cycle_window.as_secs(),
            "scheduler: cycle enqueued"
        );
        Ok(report)
    }

    /// Queue an immediate, elevated-priority refresh of `keyword_ids`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] if the enqueue fails.
    pub async fn refresh_now(
        &self,
        keyword_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<u64, TrackerError> {
        let queued = self
            .ctx
            .store
            .enqueue_manual(
                keyword_ids,
                self.settings.manual_priority,
                self.settings.max_retries,
                now,
            )
            .await?;
        tracing::info!(
            requested = keyword_ids.len(),
            queued,
            "scheduler: manual refresh queued"
        );
        Ok(queued)
    }

    /// Run the worker pool until `shutdown` flips to `true`.
    pub async fn run_workers(&self, shutdown: watch::Receiver<bool>) -> WorkerStats {
        self.run_pool(RunMode::Forever, shutdown).await
    }

    /// Run the worker pool until no job is due (or shutdown).
    pub async fn drain(&self, shutdown: watch::Receiver<bool>) -> WorkerStats {
        self.run_pool(RunMode::Drain, shutdown).await
    }

    async fn run_pool(&self, mode: RunMode, shutdown: watch::Receiver<bool>) -> WorkerStats {
        let workers = self.settings.workers.max(1);
        tracing::info!(workers, ?mode, "scheduler: worker pool starting");

        let mut set = JoinSet::new();
        for worker in 0..workers {
            set.spawn(worker_loop(
                Arc::clone(&self.ctx),
                worker,
                self.settings.poll_interval,
                mode,
                shutdown.clone(),
            ));
        }

        let mut total = WorkerStats::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(stats) => total.merge(stats),
                Err(e) => {
                    tracing::error!(error = %e, "scheduler: worker task panicked");
                    total.errors += 1;
                }
            }
        }

        tracing::info!(
            completed = total.completed,
            retried = total.retried,
            failed = total.failed,
            requeued = total.requeued,
            errors = total.errors,
            "scheduler: worker pool stopped"
        );
        total
    }
}

/// Wait out `poll` unless shutdown arrives first; `true` means stop.
async fn idle(poll: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = shutdown_signalled(shutdown) => true,
        () = tokio::time::sleep(poll) => false,
    }
}

async fn worker_loop(
    ctx: Arc<WorkerContext>,
    worker: usize,
    poll: Duration,
    mode: RunMode,
    mut shutdown: watch::Receiver<bool>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();

    while !*shutdown.borrow() {
        let now = (ctx.clock)();
        match ctx.store.claim_next_job(now).await {
            Ok(Some(claimed)) => {
                let job_id = claimed.job.id;
                match process_job(&ctx, claimed, &mut shutdown).await {
                    Ok(outcome) => stats.record(&outcome),
                    Err(e) => {
                        stats.errors += 1;
                        tracing::error!(worker, job_id, error = %e, "scheduler: job aborted");
                    }
                }
            }
            Ok(None) => {
                if mode == RunMode::Drain || idle(poll, &mut shutdown).await {
                    break;
                }
            }
            Err(e) => {
                stats.errors += 1;
                tracing::error!(worker, error = %e, "scheduler: claim failed");
                if mode == RunMode::Drain || idle(poll, &mut shutdown).await {
                    break;
                }
            }
        }
    }

    stats
}
