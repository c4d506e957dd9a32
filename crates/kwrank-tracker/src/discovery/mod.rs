//! Keyword discovery: propose candidates for an app and keep the ones it
//! already ranks for.
//!
//! Every candidate search goes through the same [`SerpSource`] the refresh workers use,
//! so discovery draws from the shared per-surface rate budget. Nothing is
//! written; the caller decides which results become tracked keywords.

mod candidates;

pub use candidates::{build_candidates, Candidate};

use futures::stream::{self, StreamExt};
use kwrank_core::{normalize_region, AppListing, CategorySeeds, Confidence, Platform};
use kwrank_serp::SerpQuery;
use serde::Serialize;

use crate::store::SerpSource;
use crate::TrackerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub max_candidates: usize,
    /// Searches in flight at once; actual request rate is still set by the limiter.
    pub concurrency: usize,
    pub depth: u32,
}

impl DiscoveryOptions {
    #[must_use]
    pub fn from_app_config(config: &kwrank_core::AppConfig) -> Self {
        Self {
            max_candidates: config.discovery_max_candidates,
            concurrency: config.discovery_concurrency,
            depth: config.serp_depth,
        }
    }
}

/// A candidate the app currently ranks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredKeyword {
    pub keyword: String,
    pub position: u32,
    pub confidence: Confidence,
}

/// Search each candidate for `listing` and return those where the app appears
/// within `options.depth`, best confidence then best position first.
///
/// A failed search only drops its own candidate.
///
/// # Errors
///
/// Returns [`TrackerError::Invalid`] if `region` is not a two-letter code.
pub async fn discover(
    serp: &dyn SerpSource,
    listing: &AppListing,
    platform: Platform,
    region: &str,
    seeds: &CategorySeeds,
    options: DiscoveryOptions,
) -> Result<Vec<DiscoveredKeyword>, TrackerError> {
    let region = normalize_region(region)?;
    let candidates = build_candidates(listing, seeds, options.max_candidates);
    tracing::info!(
        app_id = %listing.app_id,
        %platform,
        region = %region,
        candidates = candidates.len(),
        "discovery: probing candidates"
    );

    let searches = candidates.into_iter().map(|candidate| {
        let query = SerpQuery {
            keyword: candidate.keyword.clone(),
            platform,
            region: region.clone(),
            depth: options.depth,
        };
        async move {
            match serp.fetch_ranking(&query).await {
                Ok(result) => result
                    .position_of(&listing.app_id)
                    .filter(|&p| p <= options.depth)
                    .map(|position| DiscoveredKeyword {
                        keyword: candidate.keyword,
                        position,
                        confidence: candidate.confidence,
                    }),
                Err(e) => {
                    tracing::debug!(
                        keyword = %query.keyword,
                        kind = e.kind(),
                        error = %e,
                        "discovery: search failed; candidate dropped"
                    );
                    None
                }
            }
        }
    });

    let mut found: Vec<DiscoveredKeyword> = stream::iter(searches)
        .buffer_unordered(options.concurrency.max(1))
        .filter_map(|hit| async move { hit })
        .collect()
        .await;

    found.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then(a.position.cmp(&b.position))
            .then_with(|| a.keyword.cmp(&b.keyword))
    });

    tracing::info!(
        app_id = %listing.app_id,
        found = found.len(),
        "discovery: complete"
    );
    Ok(found)
}
