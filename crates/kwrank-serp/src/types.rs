use kwrank_core::{Platform, SerpItem};
use serde::{Deserialize, Serialize};

use crate::parse::ParseStrategy;

/// One ranked-search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerpQuery {
    pub keyword: String,
    pub platform: Platform,
    /// Lowercase ISO 3166-1 alpha-2 storefront code.
    pub region: String,
    /// Number of positions to keep, at most 50.
    pub depth: u32,
}

/// A parsed SERP together with the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerpResult {
    pub strategy: ParseStrategy,
    /// Rank-ordered, positions `1..=depth`.
    pub items: Vec<SerpItem>,
    /// Size of the result set the storefront reported, or the number parsed
    /// when it reports none.
    pub result_count: u32,
}

impl SerpResult {
    /// 1-based position of `app_id`, or `None` when it is not within the tracked depth.
    #[must_use]
    pub fn position_of(&self, app_id: &str) -> Option<u32> {
        self.items
            .iter()
            .find(|item| item.app_id == app_id)
            .map(|item| item.position)
    }

    /// App identifiers in rank order.
    #[must_use]
    pub fn app_ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.app_id.clone()).collect()
    }
}

/// iTunes Search/Lookup API envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItunesResponse {
    #[serde(default)]
    pub result_count: Option<u32>,
    #[serde(default)]
    pub results: Vec<ItunesApp>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItunesApp {
    pub track_id: Option<u64>,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub user_rating_count: Option<u64>,
    pub average_user_rating: Option<f64>,
    pub description: Option<String>,
    pub primary_genre_name: Option<String>,
}
