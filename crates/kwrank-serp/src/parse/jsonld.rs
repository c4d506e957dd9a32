//! schema.org JSON-LD extraction.

use std::sync::LazyLock;

use kwrank_core::SerpItem;
use regex::Regex;
use serde_json::Value;

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]+type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

static DETAILS_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]id=([A-Za-z0-9_.]+)").expect("valid regex"));

/// Extract ranked apps from `<script type="application/ld+json">` blocks.
///
/// Accepts an `ItemList` of `ListItem`s, bare `SoftwareApplication` objects,
/// top-level arrays and `@graph` containers.
pub(super) fn parse_jsonld_items(html: &str) -> Vec<SerpItem> {
    let mut ranked: Vec<(Option<u64>, SerpItem)> = Vec::new();

    for cap in SCRIPT_RE.captures_iter(html) {
        let Some(json_text) = cap.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(json_text) else {
            continue;
        };

        for node in flatten(value) {
            if has_type(&node, "ItemList") {
                let elements = node
                    .get("itemListElement")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                for element in elements {
                    let position = element.get("position").and_then(as_u64);
                    let app = element.get("item").cloned().unwrap_or(element);
                    if let Some(item) = software_application(&app) {
                        ranked.push((position, item));
                    }
                }
            } else if let Some(item) = software_application(&node) {
                ranked.push((None, item));
            }
        }
    }

    // Stable sort keeps document order for entries without an explicit position.
    ranked.sort_by_key(|(position, _)| position.unwrap_or(u64::MAX));
    ranked.into_iter().map(|(_, item)| item).collect()
}

fn flatten(value: Value) -> Vec<Value> {
    let mut nodes = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    let graphs: Vec<Value> = nodes
        .iter()
        .filter_map(|n| n.get("@graph").and_then(Value::as_array))
        .flatten()
        .cloned()
        .collect();
    nodes.extend(graphs);
    nodes
}

/// `@type` may be a string or an array of strings.
fn has_type(node: &Value, wanted: &str) -> bool {
    match node.get("@type") {
        Some(Value::String(s)) => s.eq_ignore_ascii_case(wanted),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|s| s.eq_ignore_ascii_case(wanted)),
        _ => false,
    }
}

fn software_application(node: &Value) -> Option<SerpItem> {
    if !(has_type(node, "SoftwareApplication") || has_type(node, "MobileApplication")) {
        return None;
    }

    let app_id = ["url", "@id"]
        .iter()
        .filter_map(|key| node.get(*key).and_then(Value::as_str))
        .find_map(|url| DETAILS_ID_RE.captures(url))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
        .or_else(|| {
            node.get("identifier")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        })?;

    let rating = node.get("aggregateRating");
    Some(SerpItem {
        position: 0,
        app_id,
        display_name: node.get("name").and_then(Value::as_str).map(ToOwned::to_owned),
        developer: node
            .get("author")
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        rating_count: rating
            .and_then(|r| r.get("ratingCount").or_else(|| r.get("reviewCount")))
            .and_then(as_u64),
        rating: rating.and_then(|r| r.get("ratingValue")).and_then(as_f64),
    })
}

/// Numbers in JSON-LD are frequently serialised as strings.
fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
