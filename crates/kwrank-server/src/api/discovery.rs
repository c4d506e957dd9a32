use axum::{extract::State, Extension, Json};
use kwrank_core::{AppListing, Platform};
use kwrank_tracker::{discover, DiscoveredKeyword, DiscoveryOptions};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_serp_error, map_tracker_error, ApiError, ApiResponse, AppState};

const MAX_CANDIDATES_LIMIT: usize = 100;

/// Discovery request. When `name` is absent the listing is looked up in the
/// storefront by `app_id`.
#[derive(Debug, Deserialize)]
pub(super) struct DiscoverRequest {
    pub app_id: String,
    pub platform: String,
    pub region: String,
    pub name: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub max_candidates: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(super) struct DiscoveryResult {
    app_id: String,
    name: String,
    keywords: Vec<DiscoveredKeyword>,
}

pub(super) async fn discover_keywords(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<DiscoverRequest>,
) -> Result<Json<ApiResponse<DiscoveryResult>>, ApiError> {
    let rid = req_id.0.as_str();

    let app_id = body.app_id.trim().to_string();
    if app_id.is_empty() {
        return Err(ApiError::validation(rid, "app_id must not be empty"));
    }
    let platform = body
        .platform
        .parse::<Platform>()
        .map_err(|e| ApiError::validation(rid, e.to_string()))?;

    let mut options = DiscoveryOptions::from_app_config(&state.config);
    if let Some(max) = body.max_candidates {
        options.max_candidates = max.clamp(1, MAX_CANDIDATES_LIMIT);
    }

    let listing = match body.name.filter(|n| !n.trim().is_empty()) {
        Some(name) => AppListing {
            app_id,
            name,
            subtitle: body.subtitle,
            description: body.description,
            category: body.category,
        },
        None => state
            .serp
            .lookup_app(&app_id, platform, &body.region)
            .await
            .map_err(|e| map_serp_error(rid, &e))?,
    };

    let keywords = discover(
        state.serp.as_ref(),
        &listing,
        platform,
        &body.region,
        &state.seeds,
        options,
    )
    .await
    .map_err(|e| map_tracker_error(rid, &e))?;

    Ok(ApiResponse::new(
        req_id.0,
        DiscoveryResult {
            app_id: listing.app_id,
            name: listing.name,
            keywords,
        },
    ))
}
