//! Refresh queue commands: enqueue a cycle, manual refresh, run workers.

use chrono::Utc;
use kwrank_tracker::RefreshScheduler;
use tokio::sync::watch;

pub(crate) async fn run_enqueue(scheduler: &RefreshScheduler) -> anyhow::Result<()> {
    let report = scheduler.run_cycle(Utc::now()).await?;
    println!(
        "enqueued {} job(s) over {}s; recovered {} stale, purged {} finished",
        report.enqueued,
        scheduler.settings().cycle_window.as_secs(),
        report.recovered,
        report.purged
    );
    Ok(())
}

pub(crate) async fn run_refresh(scheduler: &RefreshScheduler, ids: &[i64]) -> anyhow::Result<()> {
    let queued = scheduler.refresh_now(ids, Utc::now()).await?;
    println!("queued {queued} of {} keyword(s) for immediate refresh", ids.len());
    if queued < u64::try_from(ids.len()).unwrap_or(u64::MAX) {
        println!("keywords that are untracked, unknown or already processing were skipped");
    }
    Ok(())
}

/// Run the worker pool until ctrl-c, or until the queue has nothing due when
/// `drain` is set.
///
/// # Errors
///
/// Returns an error if any worker hit a store error.
pub(crate) async fn run_work(scheduler: &RefreshScheduler, drain: bool) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c; requeueing in-flight jobs");
            shutdown_tx.send_replace(true);
        }
    });

    let stats = if drain {
        scheduler.drain(shutdown_rx).await
    } else {
        scheduler.run_workers(shutdown_rx).await
    };

    println!(
        "completed {}, retrying {}, failed {}, requeued {}, errors {}",
        stats.completed, stats.retried, stats.failed, stats.requeued, stats.errors
    );
    if stats.errors > 0 {
        anyhow::bail!("{} job(s) hit store errors; see logs", stats.errors);
    }
    Ok(())
}
