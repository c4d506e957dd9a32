//! In-memory fakes for the tracker seams.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use kwrank_core::{
    CompetitorObservation, DiscoveryMethod, JobStatus, Platform, RankingSnapshot, RefreshJob,
    SerpItem, TrackedKeyword,
};
use kwrank_db::DbError;
use kwrank_serp::{ParseStrategy, SerpError, SerpQuery, SerpResult};

use crate::store::{ClaimedJob, RankingStore, SerpSource, WriteOutcome};
use crate::StoreError;

pub const TARGET_APP: &str = "1001";

const TOP_TEN_RATINGS: [u64; 10] = [
    450_000, 320_000, 210_000, 150_000, 95_000, 60_000, 40_000, 35_000, 20_000, 12_000,
];

pub fn keyword(id: i64, text: &str) -> TrackedKeyword {
    TrackedKeyword {
        id,
        app_id: TARGET_APP.to_string(),
        keyword: text.to_string(),
        platform: Platform::Ios,
        region: "us".to_string(),
        is_tracking: true,
        discovery_method: DiscoveryMethod::Manual,
        needs_review: false,
        last_tracked_at: None,
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// A 50-result SERP with a popular top ten; `target` occupies `position` when given.
pub fn serp_with_target_at(target: &str, position: Option<u32>) -> SerpResult {
    let items = (1..=50u32)
        .map(|p| {
            let ratings = TOP_TEN_RATINGS
                .get(p as usize - 1)
                .copied()
                .unwrap_or(500);
            let app_id = if Some(p) == position {
                target.to_string()
            } else {
                format!("comp-{p}")
            };
            SerpItem {
                position: p,
                display_name: Some(format!("App {app_id}")),
                app_id,
                developer: None,
                rating_count: Some(ratings),
                rating: Some(4.5),
            }
        })
        .collect();

    SerpResult {
        strategy: ParseStrategy::ItunesJson,
        items,
        result_count: 50,
    }
}

/// One scripted storefront answer.
#[derive(Debug, Clone)]
pub enum Scripted {
    Found(SerpResult),
    NotFound,
    Unavailable,
    Throttled,
    Unparseable,
    /// Never answers.
    Hang,
}

/// [`SerpSource`] answering from per-keyword scripts; the last answer repeats.
#[derive(Debug, Default)]
pub struct ScriptedSerp {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<SerpQuery>>,
    multiplier: AtomicU32,
}

impl ScriptedSerp {
    pub fn new() -> Self {
        Self {
            multiplier: AtomicU32::new(1),
            ..Self::default()
        }
    }

    pub fn script(self, keyword: &str, answers: Vec<Scripted>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(keyword.to_string(), answers.into());
        self
    }

    pub fn set_multiplier(&self, multiplier: u32) {
        self.multiplier.store(multiplier, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SerpQuery> {
        self.calls.lock().unwrap().clone()
    }

    fn next_answer(&self, keyword: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(keyword)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl SerpSource for ScriptedSerp {
    async fn fetch_ranking(&self, query: &SerpQuery) -> Result<SerpResult, SerpError> {
        self.calls.lock().unwrap().push(query.clone());
        let url = format!("https://store.test/search?term={}", query.keyword);
        match self.next_answer(&query.keyword) {
            Some(Scripted::Found(result)) => Ok(result),
            Some(Scripted::NotFound) => Err(SerpError::NotFound { url }),
            Some(Scripted::Unavailable) => Err(SerpError::UnexpectedStatus { status: 503, url }),
            Some(Scripted::Throttled) => Err(SerpError::RateLimited {
                surface: query.platform.to_string(),
                retry_after_secs: 60,
            }),
            Some(Scripted::Hang) => std::future::pending().await,
            Some(Scripted::Unparseable) | None => Err(SerpError::Parse {
                keyword: query.keyword.clone(),
                attempted: "itunes_json, html_app_links".to_string(),
            }),
        }
    }

    fn backoff_multiplier(&self, _platform: Platform) -> u32 {
        self.multiplier.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    keywords: HashMap<i64, TrackedKeyword>,
    jobs: Vec<RefreshJob>,
    snapshots: Vec<(RankingSnapshot, Vec<CompetitorObservation>)>,
    next_job_id: i64,
}

/// [`RankingStore`] with the same transition rules as the Postgres queue.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    conflict_on_write: AtomicBool,
}

fn transition_error(id: i64) -> StoreError {
    StoreError::Db(DbError::InvalidJobTransition {
        id,
        expected_status: "processing",
    })
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap()
}

impl MemoryStore {
    pub fn with_keywords(keywords: Vec<TrackedKeyword>) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            for kw in keywords {
                state.keywords.insert(kw.id, kw);
            }
        }
        store
    }

    pub fn insert_job(
        &self,
        tracked_keyword_id: i64,
        priority: i32,
        retry_count: u32,
        max_retries: u32,
        scheduled_at: DateTime<Utc>,
    ) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.next_job_id += 1;
        let id = state.next_job_id;
        state.jobs.push(RefreshJob {
            id,
            tracked_keyword_id,
            status: JobStatus::Pending,
            priority,
            retry_count,
            max_retries,
            scheduled_at,
            started_at: None,
            completed_at: None,
            error_detail: None,
            created_at: scheduled_at,
        });
        id
    }

    /// Make every snapshot write report a concurrent writer.
    pub fn simulate_write_conflicts(&self) {
        self.conflict_on_write.store(true, Ordering::SeqCst);
    }

    pub fn job(&self, id: i64) -> RefreshJob {
        let state = self.state.lock().unwrap();
        state.jobs.iter().find(|j| j.id == id).cloned().unwrap()
    }

    pub fn jobs(&self) -> Vec<RefreshJob> {
        self.state.lock().unwrap().jobs.clone()
    }

    pub fn keyword(&self, id: i64) -> TrackedKeyword {
        self.state.lock().unwrap().keywords[&id].clone()
    }

    pub fn disable(&self, id: i64) {
        if let Some(kw) = self.state.lock().unwrap().keywords.get_mut(&id) {
            kw.is_tracking = false;
        }
    }

    pub fn snapshots(&self, tracked_keyword_id: i64) -> Vec<RankingSnapshot> {
        let state = self.state.lock().unwrap();
        let mut snaps: Vec<RankingSnapshot> = state
            .snapshots
            .iter()
            .filter(|(s, _)| s.tracked_keyword_id == tracked_keyword_id)
            .map(|(s, _)| s.clone())
            .collect();
        snaps.sort_by_key(|s| s.snapshot_date);
        snaps
    }

    pub fn competitors(
        &self,
        tracked_keyword_id: i64,
        date: NaiveDate,
    ) -> Vec<CompetitorObservation> {
        let state = self.state.lock().unwrap();
        state
            .snapshots
            .iter()
            .find(|(s, _)| s.tracked_keyword_id == tracked_keyword_id && s.snapshot_date == date)
            .map(|(_, c)| c.clone())
            .unwrap_or_default()
    }

    fn with_processing<F>(&self, id: i64, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut RefreshJob),
    {
        let mut state = self.state.lock().unwrap();
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Processing)
            .ok_or_else(|| transition_error(id))?;
        apply(job);
        Ok(())
    }
}

fn is_active(job: &RefreshJob) -> bool {
    matches!(job.status, JobStatus::Pending | JobStatus::Processing)
}

#[async_trait]
impl RankingStore for MemoryStore {
    async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<ClaimedJob>, StoreError> {
        let mut state = self.state.lock().unwrap();
        let MemoryState { keywords, jobs, .. } = &mut *state;
        let next = jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Pending && j.scheduled_at <= now)
            .filter(|j| keywords.get(&j.tracked_keyword_id).is_some_and(|k| k.is_tracking))
            .min_by_key(|j| (std::cmp::Reverse(j.priority), j.scheduled_at, j.id));
        let Some(job) = next else {
            return Ok(None);
        };
        job.status = JobStatus::Processing;
        job.started_at = Some(now);
        let keyword = keywords[&job.tracked_keyword_id].clone();
        Ok(Some(ClaimedJob {
            job: job.clone(),
            keyword,
        }))
    }

    async fn prior_snapshot(
        &self,
        tracked_keyword_id: i64,
        date: NaiveDate,
    ) -> Result<Option<RankingSnapshot>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .snapshots
            .iter()
            .map(|(s, _)| s)
            .filter(|s| s.tracked_keyword_id == tracked_keyword_id && s.snapshot_date < date)
            .max_by_key(|s| s.snapshot_date)
            .cloned())
    }

    async fn write_snapshot(
        &self,
        snapshot: &RankingSnapshot,
        competitors: &[CompetitorObservation],
    ) -> Result<WriteOutcome, StoreError> {
        if self.conflict_on_write.load(Ordering::SeqCst) {
            return Err(StoreError::PersistenceConflict {
                tracked_keyword_id: snapshot.tracked_keyword_id,
            });
        }
        let mut state = self.state.lock().unwrap();
        let existing = state.snapshots.iter_mut().find(|(s, _)| {
            s.tracked_keyword_id == snapshot.tracked_keyword_id
                && s.snapshot_date == snapshot.snapshot_date
        });
        match existing {
            Some((stored, _)) if stored.observed_at >= snapshot.observed_at => {
                Ok(WriteOutcome::Unchanged)
            }
            Some(entry) => {
                *entry = (snapshot.clone(), competitors.to_vec());
                Ok(WriteOutcome::Written)
            }
            None => {
                state
                    .snapshots
                    .push((snapshot.clone(), competitors.to_vec()));
                Ok(WriteOutcome::Written)
            }
        }
    }

    async fn complete_job(
        &self,
        job_id: i64,
        tracked_keyword_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_processing(job_id, |job| {
            job.status = JobStatus::Completed;
            job.completed_at = Some(now);
            job.error_detail = None;
        })?;
        let mut state = self.state.lock().unwrap();
        if let Some(kw) = state.keywords.get_mut(&tracked_keyword_id) {
            kw.last_tracked_at = Some(kw.last_tracked_at.map_or(now, |t| t.max(now)));
            kw.needs_review = false;
        }
        Ok(())
    }

    async fn retry_job(
        &self,
        job_id: i64,
        retry_count: u32,
        scheduled_at: DateTime<Utc>,
        error_detail: &str,
    ) -> Result<(), StoreError> {
        self.with_processing(job_id, |job| {
            job.status = JobStatus::Pending;
            job.retry_count = retry_count;
            job.scheduled_at = scheduled_at;
            job.error_detail = Some(error_detail.to_string());
            job.started_at = None;
        })
    }

    async fn fail_job(
        &self,
        job_id: i64,
        error_detail: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_processing(job_id, |job| {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            job.error_detail = Some(error_detail.to_string());
        })
    }

    async fn requeue_job(&self, job_id: i64) -> Result<(), StoreError> {
        self.with_processing(job_id, |job| {
            job.status = JobStatus::Pending;
            job.started_at = None;
        })
    }

    async fn flag_needs_review(&self, tracked_keyword_id: i64) -> Result<(), StoreError> {
        if let Some(kw) = self.state.lock().unwrap().keywords.get_mut(&tracked_keyword_id) {
            kw.needs_review = true;
        }
        Ok(())
    }

    async fn enqueue_cycle(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        max_retries: u32,
    ) -> Result<u64, StoreError> {
        let due: Vec<i64> = {
            let state = self.state.lock().unwrap();
            let mut due: Vec<&TrackedKeyword> = state
                .keywords
                .values()
                .filter(|k| k.is_tracking && !k.needs_review)
                .filter(|k| {
                    !state
                        .jobs
                        .iter()
                        .any(|j| j.tracked_keyword_id == k.id && is_active(j))
                })
                .collect();
            due.sort_by_key(|k| (k.last_tracked_at.is_some(), k.last_tracked_at, k.id));
            due.into_iter().map(|k| k.id).collect()
        };

        let total = u32::try_from(due.len()).unwrap();
        for (slot, id) in (0u32..).zip(&due) {
            let at = now + chrono_duration(window * slot / total);
            self.insert_job(*id, 0, 0, max_retries, at);
        }
        Ok(u64::from(total))
    }

    async fn enqueue_manual(
        &self,
        keyword_ids: &[i64],
        priority: i32,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut touched = 0;
        for id in keyword_ids {
            let tracking = {
                let state = self.state.lock().unwrap();
                state.keywords.get(id).is_some_and(|k| k.is_tracking)
            };
            if !tracking {
                continue;
            }
            let mut state = self.state.lock().unwrap();
            if let Some(job) = state
                .jobs
                .iter_mut()
                .find(|j| j.tracked_keyword_id == *id && is_active(j))
            {
                if job.status == JobStatus::Pending {
                    job.priority = job.priority.max(priority);
                    job.scheduled_at = job.scheduled_at.min(now);
                    touched += 1;
                }
                continue;
            }
            drop(state);
            self.insert_job(*id, priority, 0, max_retries, now);
            touched += 1;
        }
        Ok(touched)
    }

    async fn recover_stale_jobs(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<u64, StoreError> {
        let cutoff = now - chrono_duration(lease);
        let mut state = self.state.lock().unwrap();
        let mut recovered = 0;
        for job in &mut state.jobs {
            if job.status == JobStatus::Processing && job.started_at.is_some_and(|t| t < cutoff) {
                job.status = JobStatus::Pending;
                job.started_at = None;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn purge_finished_jobs(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<u64, StoreError> {
        let cutoff = now - chrono_duration(retention);
        let mut state = self.state.lock().unwrap();
        let before = state.jobs.len();
        state.jobs.retain(|j| {
            !(matches!(j.status, JobStatus::Completed | JobStatus::Failed)
                && j.completed_at.is_some_and(|t| t < cutoff))
        });
        Ok(u64::try_from(before - state.jobs.len()).unwrap())
    }
}
