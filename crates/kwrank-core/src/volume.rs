//! Search-demand estimation from SERP composition.
//!
//! No storefront publishes search volume, so demand is inferred from three
//! signals: how full the result list is (competition), how popular the top
//! ten results are (rating counts), and how long the query is (long phrases
//! are searched less). The estimate is a pure function of its inputs.

use serde::{Deserialize, Serialize};

use crate::types::{DemandTier, SerpItem, MAX_TRACKED_DEPTH};

/// Points contributed by a completely full result list.
pub const COMPETITION_WEIGHT: f64 = 20.0;
/// Points contributed when every top-ten result carries the maximum popularity.
pub const POPULARITY_WEIGHT: f64 = 55.0;
/// `log10(rating_count + 1)` at which a single result's popularity saturates.
pub const POPULARITY_LOG_CEILING: f64 = 7.0;
/// Rating count above which a result counts as a heavy hitter.
pub const HEAVY_HITTER_RATINGS: u64 = 100_000;
/// Heavy hitters required in the top ten before the bonus applies.
pub const HEAVY_HITTER_MIN_COUNT: usize = 3;
pub const HEAVY_HITTER_BONUS: f64 = 10.0;
/// Words a query may have before the length penalty starts.
pub const FREE_QUERY_WORDS: usize = 2;
pub const PENALTY_PER_EXTRA_WORD: f64 = 8.0;
pub const MAX_LENGTH_PENALTY: f64 = 24.0;
/// Upper score bounds of the low, medium and high tiers.
pub const LOW_TIER_MAX: f64 = 30.0;
pub const MEDIUM_TIER_MAX: f64 = 50.0;
pub const HIGH_TIER_MAX: f64 = 75.0;
/// `estimated_volume = 10^(VOLUME_LOG_OFFSET + score / VOLUME_LOG_DIVISOR)`.
pub const VOLUME_LOG_OFFSET: f64 = 1.0;
pub const VOLUME_LOG_DIVISOR: f64 = 20.0;

const TOP_RESULTS: usize = 10;

/// Output of [`estimate_demand`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeEstimate {
    pub tier: DemandTier,
    /// Composite demand score in `0..=100`.
    pub score: f64,
    /// Relative daily search estimate used to weight traffic.
    pub estimated_volume: f64,
}

/// Estimate the demand tier of `keyword` from its SERP.
///
/// `result_count` is the number of results the storefront reported (or the
/// number parsed when the storefront reports none).
#[must_use]
pub fn estimate_demand(keyword: &str, items: &[SerpItem], result_count: u32) -> VolumeEstimate {
    let score = (competition_points(result_count) + popularity_points(items)
        - length_penalty(keyword))
    .clamp(0.0, 100.0);

    VolumeEstimate {
        tier: tier_for_score(score),
        score,
        estimated_volume: 10f64.powf(VOLUME_LOG_OFFSET + score / VOLUME_LOG_DIVISOR),
    }
}

/// Map a composite score onto a demand tier.
#[must_use]
pub fn tier_for_score(score: f64) -> DemandTier {
    if score < LOW_TIER_MAX {
        DemandTier::Low
    } else if score < MEDIUM_TIER_MAX {
        DemandTier::Medium
    } else if score < HIGH_TIER_MAX {
        DemandTier::High
    } else {
        DemandTier::VeryHigh
    }
}

fn competition_points(result_count: u32) -> f64 {
    let filled = f64::from(result_count.min(MAX_TRACKED_DEPTH)) / f64::from(MAX_TRACKED_DEPTH);
    COMPETITION_WEIGHT * filled
}

#[allow(clippy::cast_precision_loss)]
fn popularity_points(items: &[SerpItem]) -> f64 {
    let mut top: Vec<&SerpItem> = items.iter().collect();
    top.sort_by_key(|item| item.position);
    top.truncate(TOP_RESULTS);

    // Missing slots and missing rating counts contribute zero, so a sparse
    // top ten always scores below a full one.
    let normalized_sum: f64 = top
        .iter()
        .map(|item| {
            let ratings = item.rating_count.unwrap_or(0) as f64;
            ((ratings + 1.0).log10() / POPULARITY_LOG_CEILING).min(1.0)
        })
        .sum();
    let popularity = POPULARITY_WEIGHT * normalized_sum / TOP_RESULTS as f64;

    let heavy_hitters = top
        .iter()
        .filter(|item| item.rating_count.unwrap_or(0) >= HEAVY_HITTER_RATINGS)
        .count();
    if heavy_hitters >= HEAVY_HITTER_MIN_COUNT {
        popularity + HEAVY_HITTER_BONUS
    } else {
        popularity
    }
}

#[allow(clippy::cast_precision_loss)]
fn length_penalty(keyword: &str) -> f64 {
    let words = keyword.split_whitespace().count();
    let extra = words.saturating_sub(FREE_QUERY_WORDS) as f64;
    (extra * PENALTY_PER_EXTRA_WORD).min(MAX_LENGTH_PENALTY)
}
