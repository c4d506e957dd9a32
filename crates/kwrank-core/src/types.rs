//! Domain types shared by every kwrank crate.
//!
//! Enum variants round-trip through their lowercase string form, which is also
//! the representation stored in Postgres `TEXT` columns.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Deepest SERP position the pipeline ever tracks.
pub const MAX_TRACKED_DEPTH: u32 = 50;

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(CoreError::InvalidValue {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

/// Storefront a keyword is tracked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

string_enum!(Platform, "platform", { Ios => "ios", Android => "android" });

/// How a tracked keyword came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Manual,
    Auto,
    Competitor,
}

string_enum!(DiscoveryMethod, "discovery method", {
    Manual => "manual",
    Auto => "auto",
    Competitor => "competitor",
});

/// Coarse bucket of estimated search demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandTier {
    Low,
    Medium,
    High,
    VeryHigh,
}

string_enum!(DemandTier, "demand tier", {
    Low => "low",
    Medium => "medium",
    High => "high",
    VeryHigh => "very_high",
});

/// Movement of a keyword between two consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    New,
    Lost,
    Rising,
    Falling,
    Stable,
}

string_enum!(Trend, "trend", {
    New => "new",
    Lost => "lost",
    Rising => "rising",
    Falling => "falling",
    Stable => "stable",
});

/// Lifecycle state of a [`RefreshJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

string_enum!(JobStatus, "job status", {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

/// Confidence attached to a discovered keyword candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Medium,
    High,
}

string_enum!(Confidence, "confidence", { Medium => "medium", High => "high" });

/// One ranked entry of a storefront search result page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerpItem {
    /// 1-based rank within the result list.
    pub position: u32,
    pub app_id: String,
    pub display_name: Option<String>,
    pub developer: Option<String>,
    /// Review/rating count; the popularity proxy used by the volume estimator.
    pub rating_count: Option<u64>,
    pub rating: Option<f64>,
}

/// A (app, keyword, platform, region) tuple the pipeline keeps fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedKeyword {
    pub id: i64,
    /// Storefront identifier of the owning app (iOS numeric id or Android package).
    pub app_id: String,
    pub keyword: String,
    pub platform: Platform,
    pub region: String,
    pub is_tracking: bool,
    pub discovery_method: DiscoveryMethod,
    pub needs_review: bool,
    pub last_tracked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Immutable daily observation of a tracked keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSnapshot {
    pub tracked_keyword_id: i64,
    pub snapshot_date: NaiveDate,
    /// `None` when the app is outside the tracked depth.
    pub position: Option<u32>,
    /// Ordered app identifiers of the SERP as observed.
    pub serp: Vec<String>,
    pub result_count: u32,
    pub demand_tier: DemandTier,
    pub demand_score: f64,
    pub estimated_volume: f64,
    pub visibility_score: f64,
    pub estimated_traffic: i64,
    /// `previous - current`; positive means the app moved up.
    pub position_delta: Option<i32>,
    pub trend: Trend,
    pub observed_at: DateTime<Utc>,
}

/// A competing app seen on a keyword's SERP on a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorObservation {
    pub tracked_keyword_id: i64,
    pub snapshot_date: NaiveDate,
    pub competitor_app_id: String,
    pub competitor_name: Option<String>,
    pub position: u32,
    pub rating_count: Option<u64>,
}

/// A queued refresh of one tracked keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshJob {
    pub id: i64,
    pub tracked_keyword_id: i64,
    pub status: JobStatus,
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Listing text of an app, the input to keyword discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppListing {
    pub app_id: String,
    pub name: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Trim, lowercase and collapse internal whitespace of a keyword phrase.
///
/// # Errors
///
/// Returns [`CoreError::InvalidKeyword`] when the phrase is empty after
/// normalisation or longer than 100 characters.
pub fn normalize_keyword(raw: &str) -> Result<String, CoreError> {
    let normalized = raw
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");

    if normalized.is_empty() {
        return Err(CoreError::InvalidKeyword(raw.to_string()));
    }
    if normalized.chars().count() > 100 {
        return Err(CoreError::InvalidKeyword(raw.to_string()));
    }
    Ok(normalized)
}

/// Validate a storefront region and return its lowercase ISO 3166-1 alpha-2 form.
///
/// # Errors
///
/// Returns [`CoreError::InvalidRegion`] unless `raw` is exactly two ASCII letters.
pub fn normalize_region(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(trimmed.to_ascii_lowercase())
    } else {
        Err(CoreError::InvalidRegion(raw.to_string()))
    }
}
