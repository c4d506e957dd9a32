//! SERP parser strategies.
//!
//! Each platform has an ordered list of strategies: a structured parse first,
//! then a heuristic link scan. The first strategy yielding at least one item
//! wins, and the result records which one it was. When every strategy comes
//! up empty the fetch is a [`SerpError::Parse`], never an empty success.

mod html;
mod itunes;
mod jsonld;
mod listing;

use kwrank_core::{Platform, SerpItem};
use serde::{Deserialize, Serialize};

use crate::error::SerpError;
use crate::types::SerpResult;

pub use itunes::parse_itunes_lookup;
pub use listing::parse_play_listing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// iTunes Search API JSON.
    ItunesJson,
    /// schema.org `ItemList` / `SoftwareApplication` blocks.
    JsonLd,
    /// Storefront detail-page links scraped from raw markup.
    HtmlAppLinks,
}

impl ParseStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ParseStrategy::ItunesJson => "itunes_json",
            ParseStrategy::JsonLd => "json_ld",
            ParseStrategy::HtmlAppLinks => "html_app_links",
        }
    }

    /// Strategies tried for `platform`, in priority order.
    #[must_use]
    pub fn chain(platform: Platform) -> &'static [ParseStrategy] {
        match platform {
            Platform::Ios => &[ParseStrategy::ItunesJson, ParseStrategy::HtmlAppLinks],
            Platform::Android => &[ParseStrategy::JsonLd, ParseStrategy::HtmlAppLinks],
        }
    }

    /// Run this strategy alone. Returns the items (in rank order) and the
    /// result count reported by the payload, if any.
    fn run(self, platform: Platform, body: &str) -> (Vec<SerpItem>, Option<u32>) {
        match self {
            ParseStrategy::ItunesJson => itunes::parse_itunes_search(body),
            ParseStrategy::JsonLd => (jsonld::parse_jsonld_items(body), None),
            ParseStrategy::HtmlAppLinks => (html::parse_app_links(platform, body), None),
        }
    }
}

impl std::fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse `body` with the platform's strategy chain and truncate to `depth`.
///
/// # Errors
///
/// Returns [`SerpError::Parse`] when no strategy produces a single item.
pub fn parse_with_fallback(
    platform: Platform,
    keyword: &str,
    body: &str,
    depth: u32,
) -> Result<SerpResult, SerpError> {
    let chain = ParseStrategy::chain(platform);

    for &strategy in chain {
        let (items, reported) = strategy.run(platform, body);
        if items.is_empty() {
            tracing::debug!(
                keyword,
                platform = %platform,
                strategy = %strategy,
                "parser strategy produced no items; trying next"
            );
            continue;
        }

        let parsed = u32::try_from(items.len()).unwrap_or(u32::MAX);
        let result_count = reported.unwrap_or(parsed).max(parsed);
        let items = renumber(items, depth);
        return Ok(SerpResult {
            strategy,
            items,
            result_count,
        });
    }

    Err(SerpError::Parse {
        keyword: keyword.to_owned(),
        attempted: chain
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Drop duplicate app ids, assign dense positions `1..` and cut at `depth`.
fn renumber(items: Vec<SerpItem>, depth: u32) -> Vec<SerpItem> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.app_id.clone()))
        .zip(1..=depth)
        .map(|(item, position)| SerpItem { position, ..item })
        .collect()
}
