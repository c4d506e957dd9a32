//! Turning one SERP observation into the day's [`RankingSnapshot`].

use chrono::{DateTime, Utc};
use kwrank_core::metrics::{
    classify_trend, estimated_traffic, position_delta, visibility_score, MetricsConfig,
};
use kwrank_core::{estimate_demand, RankingSnapshot, TrackedKeyword};
use kwrank_serp::SerpResult;

/// Compute the snapshot for `keyword` observed at `observed_at`.
///
/// `prior` is the latest stored snapshot from an earlier day and drives the
/// trend and position delta. A position beyond the tracked depth is recorded
/// as not ranking.
#[must_use]
pub fn compute_snapshot(
    config: &MetricsConfig,
    keyword: &TrackedKeyword,
    result: &SerpResult,
    prior: Option<&RankingSnapshot>,
    observed_at: DateTime<Utc>,
) -> RankingSnapshot {
    let position = result
        .position_of(&keyword.app_id)
        .filter(|&p| p <= config.depth);
    let previous = prior.and_then(|s| s.position);
    let estimate = estimate_demand(&keyword.keyword, &result.items, result.result_count);

    let serp = result
        .items
        .iter()
        .filter(|item| item.position <= config.depth)
        .map(|item| item.app_id.clone())
        .collect();

    RankingSnapshot {
        tracked_keyword_id: keyword.id,
        snapshot_date: observed_at.date_naive(),
        position,
        serp,
        result_count: result.result_count,
        demand_tier: estimate.tier,
        demand_score: estimate.score,
        estimated_volume: estimate.estimated_volume,
        visibility_score: visibility_score(config, position, estimate.tier),
        estimated_traffic: estimated_traffic(config, position, estimate.estimated_volume),
        position_delta: position_delta(position, previous),
        trend: classify_trend(position, previous, config.trend_threshold),
        observed_at,
    }
}
