//! Play Store details page metadata.

use std::sync::LazyLock;

use kwrank_core::AppListing;
use regex::Regex;

static META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?is)<meta\s+(?:property|name)\s*=\s*["']([a-z:]+)["']"#,
        r#"\s+content\s*=\s*["']([^"']*)["']"#,
    ))
    .expect("valid regex")
});

static CATEGORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""applicationCategory"\s*:\s*"([^"]+)""#).expect("valid regex")
});

const TITLE_SUFFIX: &str = " - Apps on Google Play";

/// Build a listing from `og:title` and the description meta tags.
///
/// Returns `None` when the page carries no title at all.
pub fn parse_play_listing(app_id: &str, html: &str) -> Option<AppListing> {
    let mut title = None;
    let mut og_description = None;
    let mut description = None;

    for cap in META_RE.captures_iter(html) {
        let (Some(key), Some(content)) = (cap.get(1), cap.get(2)) else {
            continue;
        };
        let content = decode_entities(content.as_str());
        match key.as_str().to_ascii_lowercase().as_str() {
            "og:title" => title = Some(content),
            "og:description" => og_description = Some(content),
            "description" => description = Some(content),
            _ => {}
        }
    }

    let name = title?
        .trim_end_matches(TITLE_SUFFIX)
        .trim()
        .to_owned();
    if name.is_empty() {
        return None;
    }

    Some(AppListing {
        app_id: app_id.to_owned(),
        name,
        subtitle: None,
        description: description.or(og_description),
        category: CATEGORY_RE
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_owned()),
    })
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}
