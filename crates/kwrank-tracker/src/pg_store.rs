//! [`RankingStore`] backed by Postgres through `kwrank-db`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use kwrank_core::{CompetitorObservation, RankingSnapshot, RefreshJob, TrackedKeyword};
use kwrank_db::{DbError, SnapshotWrite};
use sqlx::PgPool;

use crate::store::{ClaimedJob, RankingStore, WriteOutcome};
use crate::StoreError;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RankingStore for PgStore {
    async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<ClaimedJob>, StoreError> {
        let Some(row) = kwrank_db::claim_next_job(&self.pool, now).await? else {
            return Ok(None);
        };
        let job = RefreshJob::try_from(row)?;
        let keyword_row = kwrank_db::get_tracked_keyword(&self.pool, job.tracked_keyword_id).await?;
        let keyword = TrackedKeyword::try_from(keyword_row)?;
        Ok(Some(ClaimedJob { job, keyword }))
    }

    async fn prior_snapshot(
        &self,
        tracked_keyword_id: i64,
        date: NaiveDate,
    ) -> Result<Option<RankingSnapshot>, StoreError> {
        let row = kwrank_db::latest_snapshot_before(&self.pool, tracked_keyword_id, date).await?;
        Ok(row.map(RankingSnapshot::try_from).transpose()?)
    }

    async fn write_snapshot(
        &self,
        snapshot: &RankingSnapshot,
        competitors: &[CompetitorObservation],
    ) -> Result<WriteOutcome, StoreError> {
        match kwrank_db::upsert_snapshot_with_competitors(&self.pool, snapshot, competitors).await {
            Ok(SnapshotWrite::Written { .. }) => Ok(WriteOutcome::Written),
            Ok(SnapshotWrite::Unchanged) => Ok(WriteOutcome::Unchanged),
            Err(e) if e.is_unique_violation() => Err(StoreError::PersistenceConflict {
                tracked_keyword_id: snapshot.tracked_keyword_id,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn complete_job(
        &self,
        job_id: i64,
        tracked_keyword_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        kwrank_db::complete_job(&self.pool, job_id, now).await?;
        kwrank_db::mark_tracked(&self.pool, tracked_keyword_id, now).await?;
        Ok(())
    }

    async fn retry_job(
        &self,
        job_id: i64,
        retry_count: u32,
        scheduled_at: DateTime<Utc>,
        error_detail: &str,
    ) -> Result<(), StoreError> {
        kwrank_db::retry_job(&self.pool, job_id, retry_count, scheduled_at, error_detail).await?;
        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: i64,
        error_detail: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        kwrank_db::fail_job(&self.pool, job_id, error_detail, now).await?;
        Ok(())
    }

    async fn requeue_job(&self, job_id: i64) -> Result<(), StoreError> {
        kwrank_db::requeue_job(&self.pool, job_id).await?;
        Ok(())
    }

    async fn flag_needs_review(&self, tracked_keyword_id: i64) -> Result<(), StoreError> {
        match kwrank_db::flag_needs_review(&self.pool, tracked_keyword_id).await {
            Ok(()) | Err(DbError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn enqueue_cycle(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        max_retries: u32,
    ) -> Result<u64, StoreError> {
        Ok(kwrank_db::enqueue_cycle(&self.pool, now, window, max_retries).await?)
    }

    async fn enqueue_manual(
        &self,
        keyword_ids: &[i64],
        priority: i32,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(kwrank_db::enqueue_manual(&self.pool, keyword_ids, priority, max_retries, now).await?)
    }

    async fn recover_stale_jobs(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<u64, StoreError> {
        Ok(kwrank_db::recover_stale_jobs(&self.pool, now, lease).await?)
    }

    async fn purge_finished_jobs(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<u64, StoreError> {
        Ok(kwrank_db::purge_finished_jobs(&self.pool, now, retention).await?)
    }
}
