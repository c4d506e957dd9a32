//! One refresh attempt: fetch, compute, persist, transition.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kwrank_core::metrics::MetricsConfig;
use kwrank_core::{
    ErrorClass, FailReason, JobTransition, RankingSnapshot, RefreshJob, RetryPolicy,
    TrackedKeyword,
};
use kwrank_serp::{SerpError, SerpQuery, SerpResult};
use tokio::sync::watch;

use crate::competitors::CompetitorRecorder;
use crate::snapshot::compute_snapshot;
use crate::store::{ClaimedJob, RankingStore, SerpSource, WriteOutcome};
use crate::{StoreError, TrackerError};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[must_use]
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Everything a worker needs to process a job.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<dyn RankingStore>,
    pub serp: Arc<dyn SerpSource>,
    pub metrics: MetricsConfig,
    pub retry: RetryPolicy,
    pub recorder: CompetitorRecorder,
    pub clock: Clock,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed {
        snapshot: RankingSnapshot,
        write: WriteOutcome,
    },
    Retrying {
        retry_count: u32,
        scheduled_at: DateTime<Utc>,
    },
    Failed {
        reason: FailReason,
    },
    /// Interrupted by shutdown and returned to the queue untouched.
    Requeued,
}

/// Resolves once `shutdown` carries `true`; never resolves if the sender is gone.
pub(crate) async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run one claimed job to its next state.
///
/// The storefront call (including its rate-limiter wait) is abandoned if
/// shutdown is signalled first, and the job goes back to `pending` with its
/// retry count unchanged.
///
/// # Errors
///
/// Returns [`TrackerError::Store`] if a store operation fails; the job is then
/// left `processing` until lease recovery returns it to the queue.
pub async fn process_job(
    ctx: &WorkerContext,
    claimed: ClaimedJob,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<JobOutcome, TrackerError> {
    let ClaimedJob { job, keyword } = claimed;
    let query = SerpQuery {
        keyword: keyword.keyword.clone(),
        platform: keyword.platform,
        region: keyword.region.clone(),
        depth: ctx.metrics.depth,
    };

    let fetched = tokio::select! {
        biased;
        () = shutdown_signalled(shutdown) => None,
        result = ctx.serp.fetch_ranking(&query) => Some(result),
    };

    let Some(fetched) = fetched else {
        ctx.store.requeue_job(job.id).await?;
        tracing::info!(job_id = job.id, keyword_id = keyword.id, "refresh: requeued at shutdown");
        return Ok(JobOutcome::Requeued);
    };

    let now = (ctx.clock)();
    match fetched {
        Ok(result) => record_success(ctx, &job, &keyword, &result, now).await,
        Err(error) => record_failure(ctx, &job, &keyword, &error, now).await,
    }
}

async fn record_success(
    ctx: &WorkerContext,
    job: &RefreshJob,
    keyword: &TrackedKeyword,
    result: &SerpResult,
    now: DateTime<Utc>,
) -> Result<JobOutcome, TrackerError> {
    let prior = ctx
        .store
        .prior_snapshot(keyword.id, now.date_naive())
        .await?;
    let snapshot = compute_snapshot(&ctx.metrics, keyword, result, prior.as_ref(), now);
    let competitors = ctx.recorder.record(keyword, snapshot.snapshot_date, result);

    let write = match ctx.store.write_snapshot(&snapshot, &competitors).await {
        Ok(write) => write,
        Err(StoreError::PersistenceConflict { .. }) => {
            tracing::debug!(
                job_id = job.id,
                keyword_id = keyword.id,
                "refresh: snapshot already written by a concurrent attempt"
            );
            WriteOutcome::Unchanged
        }
        Err(e) => return Err(e.into()),
    };

    ctx.store.complete_job(job.id, keyword.id, now).await?;

    tracing::info!(
        job_id = job.id,
        keyword_id = keyword.id,
        platform = %keyword.platform,
        region = %keyword.region,
        position = ?snapshot.position,
        trend = %snapshot.trend,
        strategy = result.strategy.as_str(),
        "refresh: snapshot recorded"
    );

    Ok(JobOutcome::Completed { snapshot, write })
}

async fn record_failure(
    ctx: &WorkerContext,
    job: &RefreshJob,
    keyword: &TrackedKeyword,
    error: &SerpError,
    now: DateTime<Utc>,
) -> Result<JobOutcome, TrackerError> {
    let class = error.class();
    let policy = RetryPolicy {
        max_retries: job.max_retries,
        ..ctx.retry
    };
    let multiplier = ctx.serp.backoff_multiplier(keyword.platform);
    let detail = format!("{}: {error}", error.kind());

    match policy.next_transition(job.retry_count, class, now, multiplier, rand::random()) {
        JobTransition::Retry {
            retry_count,
            scheduled_at,
            delay,
        } => {
            ctx.store
                .retry_job(job.id, retry_count, scheduled_at, &detail)
                .await?;
            tracing::warn!(
                job_id = job.id,
                keyword_id = keyword.id,
                attempt = retry_count,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                kind = error.kind(),
                error = %error,
                "refresh: attempt failed; retry scheduled"
            );
            Ok(JobOutcome::Retrying {
                retry_count,
                scheduled_at,
            })
        }
        JobTransition::Fail { reason } => {
            ctx.store.fail_job(job.id, &detail, now).await?;
            if class == ErrorClass::Permanent {
                ctx.store.flag_needs_review(keyword.id).await?;
            }
            tracing::error!(
                job_id = job.id,
                keyword_id = keyword.id,
                attempt = job.retry_count,
                reason = ?reason,
                kind = error.kind(),
                error = %error,
                "refresh: job failed"
            );
            Ok(JobOutcome::Failed { reason })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        keyword, serp_with_target_at, MemoryStore, Scripted, ScriptedSerp, TARGET_APP,
    };
    use chrono::{Duration as ChronoDuration, TimeZone};
    use kwrank_core::{DemandTier, JobStatus, Trend};
    use std::time::Duration;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, 3, 0, 0).unwrap()
    }

    fn context(
        store: &Arc<MemoryStore>,
        serp: &Arc<ScriptedSerp>,
        now: DateTime<Utc>,
    ) -> WorkerContext {
        WorkerContext {
            store: Arc::clone(store) as Arc<dyn RankingStore>,
            serp: Arc::clone(serp) as Arc<dyn SerpSource>,
            metrics: MetricsConfig::default(),
            retry: RetryPolicy {
                max_retries: 3,
                base: Duration::from_secs(1),
                jitter: Duration::from_millis(500),
                max_delay: Duration::from_secs(3600),
            },
            recorder: CompetitorRecorder::new(10),
            clock: Arc::new(move || now),
        }
    }

    async fn claim_and_process(ctx: &WorkerContext, now: DateTime<Utc>) -> JobOutcome {
        let (_tx, mut rx) = watch::channel(false);
        let claimed = ctx.store.claim_next_job(now).await.unwrap().unwrap();
        process_job(ctx, claimed, &mut rx).await.unwrap()
    }

    fn setup(answers: Vec<Scripted>) -> (Arc<MemoryStore>, Arc<ScriptedSerp>) {
        let store = Arc::new(MemoryStore::with_keywords(vec![keyword(1, "fitness tracker")]));
        let serp = Arc::new(ScriptedSerp::new().script("fitness tracker", answers));
        (store, serp)
    }

    #[tokio::test]
    async fn new_ranking_then_lost_next_day() {
        let (store, serp) = setup(vec![
            Scripted::Found(serp_with_target_at(TARGET_APP, Some(7))),
            Scripted::Found(serp_with_target_at(TARGET_APP, None)),
        ]);

        store.insert_job(1, 0, 0, 3, day(2));
        let first = claim_and_process(&context(&store, &serp, day(2)), day(2)).await;
        let JobOutcome::Completed { snapshot, write } = first else {
            panic!("expected completion, got {first:?}");
        };
        assert_eq!(write, WriteOutcome::Written);
        assert_eq!(snapshot.position, Some(7));
        assert_eq!(snapshot.demand_tier, DemandTier::High);
        assert_eq!(snapshot.trend, Trend::New);
        assert!(snapshot.visibility_score > 0.0);
        assert!(snapshot.estimated_traffic > 0);
        assert_eq!(store.competitors(1, day(2).date_naive()).len(), 10);
        assert_eq!(store.keyword(1).last_tracked_at, Some(day(2)));

        store.insert_job(1, 0, 0, 3, day(3));
        let second = claim_and_process(&context(&store, &serp, day(3)), day(3)).await;
        let JobOutcome::Completed { snapshot, .. } = second else {
            panic!("expected completion, got {second:?}");
        };
        assert_eq!(snapshot.position, None);
        assert_eq!(snapshot.trend, Trend::Lost);
        assert!(snapshot.visibility_score.abs() < f64::EPSILON);
        assert_eq!(store.snapshots(1).len(), 2);
    }

    #[tokio::test]
    async fn replaying_the_same_observation_keeps_one_snapshot() {
        let (store, serp) = setup(vec![Scripted::Found(serp_with_target_at(TARGET_APP, Some(4)))]);
        let ctx = context(&store, &serp, day(2));

        store.insert_job(1, 0, 0, 3, day(2));
        claim_and_process(&ctx, day(2)).await;
        store.insert_job(1, 0, 0, 3, day(2));
        let replay = claim_and_process(&ctx, day(2)).await;

        assert!(matches!(
            replay,
            JobOutcome::Completed {
                write: WriteOutcome::Unchanged,
                ..
            }
        ));
        assert_eq!(store.snapshots(1).len(), 1);
    }

    #[tokio::test]
    async fn persistence_conflict_counts_as_success() {
        let (store, serp) = setup(vec![Scripted::Found(serp_with_target_at(TARGET_APP, Some(4)))]);
        store.simulate_write_conflicts();
        let job_id = store.insert_job(1, 0, 0, 3, day(2));

        let outcome = claim_and_process(&context(&store, &serp, day(2)), day(2)).await;

        assert!(matches!(outcome, JobOutcome::Completed { .. }));
        assert_eq!(store.job(job_id).status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn transient_failure_schedules_backoff() {
        let (store, serp) = setup(vec![Scripted::Unavailable]);
        let job_id = store.insert_job(1, 0, 0, 3, day(2));
        let ctx = context(&store, &serp, day(2));

        let JobOutcome::Retrying {
            retry_count,
            scheduled_at,
        } = claim_and_process(&ctx, day(2)).await
        else {
            panic!("expected a retry");
        };
        assert_eq!(retry_count, 1);
        let delay = scheduled_at - day(2);
        assert!(delay >= ChronoDuration::seconds(1) && delay <= ChronoDuration::milliseconds(1500));

        let job = store.job(job_id);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.error_detail.unwrap().starts_with("unexpected_status"));
    }

    #[tokio::test]
    async fn backoff_doubles_with_each_retry() {
        let (store, serp) = setup(vec![Scripted::Unparseable]);
        store.insert_job(1, 0, 2, 3, day(2));

        let outcome = claim_and_process(&context(&store, &serp, day(2)), day(2)).await;

        let JobOutcome::Retrying { scheduled_at, .. } = outcome else {
            panic!("expected a retry, got {outcome:?}");
        };
        let delay = scheduled_at - day(2);
        assert!(delay >= ChronoDuration::seconds(4) && delay <= ChronoDuration::milliseconds(4500));
    }

    #[tokio::test]
    async fn throttled_surface_scales_the_delay() {
        let (store, serp) = setup(vec![Scripted::Throttled]);
        serp.set_multiplier(4);
        store.insert_job(1, 0, 0, 3, day(2));

        let outcome = claim_and_process(&context(&store, &serp, day(2)), day(2)).await;

        let JobOutcome::Retrying { scheduled_at, .. } = outcome else {
            panic!("expected a retry, got {outcome:?}");
        };
        let delay = scheduled_at - day(2);
        assert!(delay >= ChronoDuration::seconds(4) && delay <= ChronoDuration::milliseconds(4500));
    }

    #[tokio::test]
    async fn exhausted_retries_fail_terminally() {
        let (store, serp) = setup(vec![Scripted::Unavailable]);
        let job_id = store.insert_job(1, 0, 3, 3, day(2));

        let outcome = claim_and_process(&context(&store, &serp, day(2)), day(2)).await;

        assert_eq!(
            outcome,
            JobOutcome::Failed {
                reason: FailReason::RetriesExhausted
            }
        );
        assert_eq!(store.job(job_id).status, JobStatus::Failed);
        assert!(!store.keyword(1).needs_review);
        assert!(store.claim_next_job(day(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn not_found_fails_immediately_and_flags_review() {
        let (store, serp) = setup(vec![Scripted::NotFound]);
        let job_id = store.insert_job(1, 0, 0, 3, day(2));

        let outcome = claim_and_process(&context(&store, &serp, day(2)), day(2)).await;

        assert_eq!(
            outcome,
            JobOutcome::Failed {
                reason: FailReason::Permanent
            }
        );
        assert_eq!(store.job(job_id).status, JobStatus::Failed);
        assert!(store.keyword(1).needs_review);
    }

    #[tokio::test]
    async fn shutdown_requeues_a_job_waiting_on_the_storefront() {
        let (store, serp) = setup(vec![Scripted::Hang]);
        let job_id = store.insert_job(1, 0, 2, 3, day(2));
        let ctx = context(&store, &serp, day(2));
        let claimed = store.claim_next_job(day(2)).await.unwrap().unwrap();

        let (tx, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move { process_job(&ctx, claimed, &mut rx).await });
        tokio::task::yield_now().await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, JobOutcome::Requeued);
        let job = store.job(job_id);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 2);
    }
}
