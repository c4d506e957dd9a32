//! Read side: snapshot history with freshness, and per-day competitors.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Days, NaiveDate, Utc};
use kwrank_core::{
    CompetitorObservation, JobStatus, RankingSnapshot, RefreshJob, TrackedKeyword,
};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

const DEFAULT_HISTORY_DAYS: u64 = 30;
const MAX_HISTORY_DAYS: i64 = 366;

#[derive(Debug, Deserialize)]
pub(super) struct RankingsQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CompetitorsQuery {
    pub date: Option<NaiveDate>,
}

/// How current a keyword's data is. Stored history is returned either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(super) struct Freshness {
    pub last_tracked_at: Option<DateTime<Utc>>,
    pub latest_job_status: Option<JobStatus>,
    pub latest_job_error: Option<String>,
    pub stale: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct RankingHistory {
    keyword: TrackedKeyword,
    from: NaiveDate,
    to: NaiveDate,
    snapshots: Vec<RankingSnapshot>,
    freshness: Freshness,
}

#[derive(Debug, Serialize)]
pub(super) struct CompetitorsOnDate {
    tracked_keyword_id: i64,
    date: NaiveDate,
    competitors: Vec<CompetitorObservation>,
}

/// Stale when the latest job failed, the keyword was never refreshed, or the
/// last refresh is older than `stale_after_hours`.
pub(super) fn freshness(
    keyword: &TrackedKeyword,
    latest_job: Option<&RefreshJob>,
    now: DateTime<Utc>,
    stale_after_hours: u32,
) -> Freshness {
    let failed = latest_job.is_some_and(|job| job.status == JobStatus::Failed);
    let outdated = keyword.last_tracked_at.is_none_or(|at| {
        now.signed_duration_since(at) > chrono::Duration::hours(i64::from(stale_after_hours))
    });

    Freshness {
        last_tracked_at: keyword.last_tracked_at,
        latest_job_status: latest_job.map(|job| job.status),
        latest_job_error: latest_job
            .filter(|job| job.status == JobStatus::Failed)
            .and_then(|job| job.error_detail.clone()),
        stale: failed || outdated,
    }
}

async fn load_keyword(state: &AppState, id: i64, rid: &str) -> Result<TrackedKeyword, ApiError> {
    let row = kwrank_db::get_tracked_keyword(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid, &e))?;
    TrackedKeyword::try_from(row).map_err(|e| map_db_error(rid, &e))
}

pub(super) async fn get_rankings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Query(query): Query<RankingsQuery>,
) -> Result<Json<ApiResponse<RankingHistory>>, ApiError> {
    let rid = req_id.0.as_str();
    let now = Utc::now();

    let to = query.to.unwrap_or_else(|| now.date_naive());
    let from = query
        .from
        .or_else(|| to.checked_sub_days(Days::new(DEFAULT_HISTORY_DAYS)))
        .unwrap_or(to);
    if from > to {
        return Err(ApiError::validation(rid, "from must not be after to"));
    }
    if (to - from).num_days() > MAX_HISTORY_DAYS {
        return Err(ApiError::validation(
            rid,
            format!("range must not exceed {MAX_HISTORY_DAYS} days"),
        ));
    }

    let keyword = load_keyword(&state, id, rid).await?;

    let snapshots = kwrank_db::list_snapshots(&state.pool, id, from, to)
        .await
        .map_err(|e| map_db_error(rid, &e))?
        .into_iter()
        .map(RankingSnapshot::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_db_error(rid, &e))?;

    let latest_job = kwrank_db::latest_job_for_keyword(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid, &e))?
        .map(RefreshJob::try_from)
        .transpose()
        .map_err(|e| map_db_error(rid, &e))?;

    let freshness = freshness(
        &keyword,
        latest_job.as_ref(),
        now,
        state.config.stale_after_hours,
    );

    Ok(ApiResponse::new(
        req_id.0,
        RankingHistory {
            keyword,
            from,
            to,
            snapshots,
            freshness,
        },
    ))
}

pub(super) async fn get_competitors(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Query(query): Query<CompetitorsQuery>,
) -> Result<Json<ApiResponse<CompetitorsOnDate>>, ApiError> {
    let rid = req_id.0.as_str();
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());

    load_keyword(&state, id, rid).await?;

    let competitors = kwrank_db::list_competitors(&state.pool, id, date)
        .await
        .map_err(|e| map_db_error(rid, &e))?
        .into_iter()
        .map(CompetitorObservation::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_db_error(rid, &e))?;

    Ok(ApiResponse::new(
        req_id.0,
        CompetitorsOnDate {
            tracked_keyword_id: id,
            date,
            competitors,
        },
    ))
}
