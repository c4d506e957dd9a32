//! Seams between the refresh pipeline and the outside world.
//!
//! [`SerpSource`] is the outbound storefront, [`RankingStore`] the durable
//! queue and snapshot history. Production wires in
//! [`SerpClient`](kwrank_serp::SerpClient) and [`PgStore`](crate::PgStore).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use kwrank_core::{CompetitorObservation, Platform, RankingSnapshot, RefreshJob, TrackedKeyword};
use kwrank_serp::{SerpClient, SerpError, SerpQuery, SerpResult};

use crate::StoreError;

#[async_trait]
pub trait SerpSource: Send + Sync {
    async fn fetch_ranking(&self, query: &SerpQuery) -> Result<SerpResult, SerpError>;

    /// Retry-delay multiplier for the platform's surface, raised by repeated throttling.
    fn backoff_multiplier(&self, platform: Platform) -> u32;
}

#[async_trait]
impl SerpSource for SerpClient {
    async fn fetch_ranking(&self, query: &SerpQuery) -> Result<SerpResult, SerpError> {
        SerpClient::fetch_ranking(self, query).await
    }

    fn backoff_multiplier(&self, platform: Platform) -> u32 {
        self.limiter(platform).backoff_multiplier()
    }
}

/// A job moved to `processing` together with the keyword it refreshes.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub job: RefreshJob,
    pub keyword: TrackedKeyword,
}

/// Whether a snapshot write changed stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// An observation at least as new was already stored.
    Unchanged,
}

#[async_trait]
pub trait RankingStore: Send + Sync {
    /// Claim the most urgent due job whose keyword is still tracking.
    async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<ClaimedJob>, StoreError>;

    /// Latest snapshot strictly before `date`.
    async fn prior_snapshot(
        &self,
        tracked_keyword_id: i64,
        date: NaiveDate,
    ) -> Result<Option<RankingSnapshot>, StoreError>;

    async fn write_snapshot(
        &self,
        snapshot: &RankingSnapshot,
        competitors: &[CompetitorObservation],
    ) -> Result<WriteOutcome, StoreError>;

    /// Complete the job, stamp the keyword's `last_tracked_at` and clear its
    /// review flag.
    async fn complete_job(
        &self,
        job_id: i64,
        tracked_keyword_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn retry_job(
        &self,
        job_id: i64,
        retry_count: u32,
        scheduled_at: DateTime<Utc>,
        error_detail: &str,
    ) -> Result<(), StoreError>;

    async fn fail_job(
        &self,
        job_id: i64,
        error_detail: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Return an interrupted job to `pending` without consuming a retry.
    async fn requeue_job(&self, job_id: i64) -> Result<(), StoreError>;

    async fn flag_needs_review(&self, tracked_keyword_id: i64) -> Result<(), StoreError>;

    async fn enqueue_cycle(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        max_retries: u32,
    ) -> Result<u64, StoreError>;

    async fn enqueue_manual(
        &self,
        keyword_ids: &[i64],
        priority: i32,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn recover_stale_jobs(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<u64, StoreError>;

    async fn purge_finished_jobs(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<u64, StoreError>;
}
