//! Background job scheduler.
//!
//! Registers the recurring refresh cycle on a [`JobScheduler`]. Jobs produced
//! by the cycle are executed by the worker pool started from `main`.

use std::sync::Arc;

use chrono::Utc;
use kwrank_tracker::RefreshScheduler;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it stops the cycle.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// `cycle_cron` is not a valid expression, or the scheduler fails to start.
pub async fn build_scheduler(
    refresh: Arc<RefreshScheduler>,
    cycle_cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_cycle_job(&scheduler, refresh, cycle_cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the daily refresh cycle.
///
/// Each run returns expired leases to the queue, enqueues one staggered job
/// per tracked keyword and purges finished jobs past retention.
async fn register_cycle_job(
    scheduler: &JobScheduler,
    refresh: Arc<RefreshScheduler>,
    cycle_cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cycle_cron, move |_uuid, _lock| {
        let refresh = Arc::clone(&refresh);

        Box::pin(async move {
            tracing::info!("scheduler: starting refresh cycle");
            match refresh.run_cycle(Utc::now()).await {
                Ok(report) => tracing::info!(
                    recovered = report.recovered,
                    enqueued = report.enqueued,
                    purged = report.purged,
                    "scheduler: refresh cycle complete"
                ),
                Err(e) => tracing::error!(error = %e, "scheduler: refresh cycle failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = cycle_cron, "scheduler: refresh cycle registered");
    Ok(())
}
