//! Heuristic fallback: scan markup for storefront detail-page links.

use std::sync::LazyLock;

use kwrank_core::{Platform, SerpItem};
use regex::Regex;

static APPLE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"apps\.apple\.com/[a-z]{2}/app/(?:[^/\s]+/)?id(\d+)").expect("valid regex")
});

static PLAY_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/store/apps/details\?id=([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)+)").expect("valid regex")
});

/// Detail-page links in document order. Duplicates are removed later when
/// positions are assigned.
pub(super) fn parse_app_links(platform: Platform, body: &str) -> Vec<SerpItem> {
    let re = match platform {
        Platform::Ios => &*APPLE_LINK_RE,
        Platform::Android => &*PLAY_LINK_RE,
    };

    re.captures_iter(body)
        .filter_map(|cap| cap.get(1))
        .map(|m| SerpItem {
            position: 0,
            app_id: m.as_str().to_owned(),
            display_name: None,
            developer: None,
            rating_count: None,
            rating: None,
        })
        .collect()
}
