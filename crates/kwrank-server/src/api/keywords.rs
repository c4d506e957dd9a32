use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use kwrank_core::{normalize_keyword, normalize_region, DiscoveryMethod, Platform, TrackedKeyword};
use kwrank_db::NewTrackedKeyword;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, map_tracker_error, ApiError, ApiResponse, AppState};

/// Upper bound on ids accepted by one manual refresh request.
const MAX_REFRESH_IDS: usize = 500;

#[derive(Debug, Deserialize)]
pub(super) struct KeywordsQuery {
    pub include_disabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TrackKeywordRequest {
    pub app_id: String,
    pub keyword: String,
    pub platform: String,
    pub region: String,
    pub discovery_method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RefreshRequest {
    pub keyword_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct RefreshQueued {
    requested: usize,
    queued: u64,
}

#[derive(Debug, Serialize)]
pub(super) struct Untracked {
    id: i64,
    is_tracking: bool,
}

fn decode_rows(
    request_id: &str,
    rows: Vec<kwrank_db::TrackedKeywordRow>,
) -> Result<Vec<TrackedKeyword>, ApiError> {
    rows.into_iter()
        .map(|row| TrackedKeyword::try_from(row).map_err(|e| map_db_error(request_id, &e)))
        .collect()
}

pub(super) async fn list_keywords(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<KeywordsQuery>,
) -> Result<Json<ApiResponse<Vec<TrackedKeyword>>>, ApiError> {
    let tracking_only = !query.include_disabled.unwrap_or(false);
    let rows = kwrank_db::list_tracked_keywords(&state.pool, tracking_only)
        .await
        .map_err(|e| map_db_error(&req_id.0, &e))?;
    let data = decode_rows(&req_id.0, rows)?;

    Ok(ApiResponse::new(req_id.0, data))
}

/// Start tracking a keyword, or re-enable it if it was untracked.
pub(super) async fn track_keyword(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<TrackKeywordRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TrackedKeyword>>), ApiError> {
    let rid = req_id.0.as_str();

    let app_id = body.app_id.trim();
    if app_id.is_empty() {
        return Err(ApiError::validation(rid, "app_id must not be empty"));
    }
    let keyword =
        normalize_keyword(&body.keyword).map_err(|e| ApiError::validation(rid, e.to_string()))?;
    let region =
        normalize_region(&body.region).map_err(|e| ApiError::validation(rid, e.to_string()))?;
    let platform = body
        .platform
        .parse::<Platform>()
        .map_err(|e| ApiError::validation(rid, e.to_string()))?;
    let discovery_method = body
        .discovery_method
        .as_deref()
        .map_or(Ok(DiscoveryMethod::Manual), str::parse)
        .map_err(|e: kwrank_core::CoreError| ApiError::validation(rid, e.to_string()))?;

    let row = kwrank_db::upsert_tracked_keyword(
        &state.pool,
        &NewTrackedKeyword {
            app_id,
            keyword: &keyword,
            platform,
            region: &region,
            discovery_method,
        },
    )
    .await
    .map_err(|e| map_db_error(rid, &e))?;
    let tracked = TrackedKeyword::try_from(row).map_err(|e| map_db_error(rid, &e))?;

    tracing::info!(
        keyword_id = tracked.id,
        app_id = %tracked.app_id,
        keyword = %tracked.keyword,
        %platform,
        region = %tracked.region,
        "api: keyword tracked"
    );
    Ok((StatusCode::CREATED, ApiResponse::new(req_id.0, tracked)))
}

/// Stop tracking; history and queued jobs are kept.
pub(super) async fn untrack_keyword(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Untracked>>, ApiError> {
    kwrank_db::disable_tracked_keyword(&state.pool, id)
        .await
        .map_err(|e| map_db_error(&req_id.0, &e))?;

    tracing::info!(keyword_id = id, "api: keyword untracked");
    Ok(ApiResponse::new(
        req_id.0,
        Untracked {
            id,
            is_tracking: false,
        },
    ))
}

pub(super) async fn refresh_keywords(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<RefreshRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RefreshQueued>>), ApiError> {
    let rid = req_id.0.as_str();
    if body.keyword_ids.is_empty() {
        return Err(ApiError::validation(rid, "keyword_ids must not be empty"));
    }
    if body.keyword_ids.len() > MAX_REFRESH_IDS {
        return Err(ApiError::validation(
            rid,
            format!("at most {MAX_REFRESH_IDS} keyword_ids per request"),
        ));
    }

    let queued = state
        .scheduler
        .refresh_now(&body.keyword_ids, Utc::now())
        .await
        .map_err(|e| map_tracker_error(rid, &e))?;

    Ok((
        StatusCode::ACCEPTED,
        ApiResponse::new(
            req_id.0,
            RefreshQueued {
                requested: body.keyword_ids.len(),
                queued,
            },
        ),
    ))
}
