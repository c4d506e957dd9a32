//! Pure ranking metrics: visibility, estimated traffic and trend.
//!
//! Every coefficient lives in [`MetricsConfig`] so the heuristics can be
//! recalibrated from configuration without touching the worker code.

use crate::types::{DemandTier, Trend, MAX_TRACKED_DEPTH};

/// Click-through rates for positions 1 through 10.
pub const DEFAULT_CTR_TABLE: [f64; 10] = [
    0.30, 0.20, 0.15, 0.10, 0.07, 0.05, 0.04, 0.03, 0.025, 0.02,
];
pub const DEFAULT_CTR_TAIL_K: f64 = 0.2;
pub const DEFAULT_CTR_TAIL_C: f64 = 0.0;
pub const DEFAULT_CTR_TAIL_P: f64 = 1.0;
pub const DEFAULT_CONVERSION_RATE: f64 = 0.3;
pub const DEFAULT_TREND_THRESHOLD: i32 = 3;

/// Visibility weight of each demand tier. The top tier at position 1 scores 100.
const LOW_WEIGHT: f64 = 25.0;
const MEDIUM_WEIGHT: f64 = 50.0;
const HIGH_WEIGHT: f64 = 75.0;
const VERY_HIGH_WEIGHT: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Tracked depth `D`; positions beyond it count as not ranking.
    pub depth: u32,
    pub ctr_table: [f64; 10],
    /// Tail curve `k / (position - c)^p` used for positions 11 through `D`.
    pub ctr_tail_k: f64,
    pub ctr_tail_c: f64,
    pub ctr_tail_p: f64,
    pub conversion_rate: f64,
    /// Minimum position change reported as rising or falling.
    pub trend_threshold: i32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            depth: MAX_TRACKED_DEPTH,
            ctr_table: DEFAULT_CTR_TABLE,
            ctr_tail_k: DEFAULT_CTR_TAIL_K,
            ctr_tail_c: DEFAULT_CTR_TAIL_C,
            ctr_tail_p: DEFAULT_CTR_TAIL_P,
            conversion_rate: DEFAULT_CONVERSION_RATE,
            trend_threshold: DEFAULT_TREND_THRESHOLD,
        }
    }
}

/// Visibility multiplier for a demand tier.
#[must_use]
pub fn demand_weight(tier: DemandTier) -> f64 {
    match tier {
        DemandTier::Low => LOW_WEIGHT,
        DemandTier::Medium => MEDIUM_WEIGHT,
        DemandTier::High => HIGH_WEIGHT,
        DemandTier::VeryHigh => VERY_HIGH_WEIGHT,
    }
}

fn within_depth(position: Option<u32>, depth: u32) -> Option<u32> {
    position.filter(|&p| p >= 1 && p <= depth)
}

/// `(D + 1 - position) * weight(tier) / D`, or `0.0` when not ranking.
#[must_use]
pub fn visibility_score(config: &MetricsConfig, position: Option<u32>, tier: DemandTier) -> f64 {
    let Some(position) = within_depth(position, config.depth) else {
        return 0.0;
    };
    let depth = f64::from(config.depth);
    (depth + 1.0 - f64::from(position)) * demand_weight(tier) / depth
}

/// Expected click-through rate at `position`; `0.0` outside `1..=D`.
#[must_use]
pub fn ctr(config: &MetricsConfig, position: u32) -> f64 {
    if position == 0 || position > config.depth {
        return 0.0;
    }
    if let Some(rate) = config.ctr_table.get(position as usize - 1) {
        return *rate;
    }
    let base = f64::from(position) - config.ctr_tail_c;
    if base <= 0.0 {
        return 0.0;
    }
    config.ctr_tail_k / base.powf(config.ctr_tail_p)
}

/// `round(volume * ctr(position) * conversion_rate)`; `0` when not ranking.
#[must_use]
pub fn estimated_traffic(config: &MetricsConfig, position: Option<u32>, volume: f64) -> i64 {
    let Some(position) = within_depth(position, config.depth) else {
        return 0;
    };
    round_non_negative(volume * ctr(config, position) * config.conversion_rate)
}

#[allow(clippy::cast_possible_truncation)]
fn round_non_negative(value: f64) -> i64 {
    if value.is_finite() && value > 0.0 {
        value.round() as i64
    } else {
        0
    }
}

/// `previous - current` when both positions exist.
#[must_use]
pub fn position_delta(current: Option<u32>, previous: Option<u32>) -> Option<i32> {
    match (current, previous) {
        (Some(cur), Some(prev)) => {
            let cur = i32::try_from(cur).ok()?;
            let prev = i32::try_from(prev).ok()?;
            Some(prev - cur)
        }
        _ => None,
    }
}

/// Classify movement between the previous and current observation.
#[must_use]
pub fn classify_trend(current: Option<u32>, previous: Option<u32>, threshold: i32) -> Trend {
    match (current, previous) {
        (Some(_), None) => Trend::New,
        (None, Some(_)) => Trend::Lost,
        (None, None) => Trend::Stable,
        (Some(_), Some(_)) => {
            let delta = position_delta(current, previous).unwrap_or(0);
            if delta >= threshold {
                Trend::Rising
            } else if delta <= -threshold {
                Trend::Falling
            } else {
                Trend::Stable
            }
        }
    }
}
