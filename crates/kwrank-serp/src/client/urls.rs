use reqwest::Url;

use crate::error::SerpError;

fn parse_base(base: &str, path: &str) -> Result<Url, SerpError> {
    let raw = format!("{base}{path}");
    Url::parse(&raw).map_err(|e| SerpError::InvalidRequest {
        reason: format!("base URL \"{base}\" is not valid: {e}"),
    })
}

/// `{base}/search?term=..&country=..&entity=software&limit=..`
pub(super) fn itunes_search_url(
    base: &str,
    keyword: &str,
    region: &str,
    depth: u32,
) -> Result<String, SerpError> {
    let mut url = parse_base(base, "/search")?;
    url.query_pairs_mut()
        .append_pair("term", keyword)
        .append_pair("country", region)
        .append_pair("entity", "software")
        .append_pair("limit", &depth.to_string());
    Ok(url.to_string())
}

pub(super) fn itunes_lookup_url(
    base: &str,
    app_id: &str,
    region: &str,
) -> Result<String, SerpError> {
    let mut url = parse_base(base, "/lookup")?;
    url.query_pairs_mut()
        .append_pair("id", app_id)
        .append_pair("country", region);
    Ok(url.to_string())
}

/// `{base}/store/search?q=..&c=apps&gl=..&hl=en`
pub(super) fn play_search_url(
    base: &str,
    keyword: &str,
    region: &str,
) -> Result<String, SerpError> {
    let mut url = parse_base(base, "/store/search")?;
    url.query_pairs_mut()
        .append_pair("q", keyword)
        .append_pair("c", "apps")
        .append_pair("gl", &region.to_ascii_uppercase())
        .append_pair("hl", "en");
    Ok(url.to_string())
}

pub(super) fn play_details_url(
    base: &str,
    app_id: &str,
    region: &str,
) -> Result<String, SerpError> {
    let mut url = parse_base(base, "/store/apps/details")?;
    url.query_pairs_mut()
        .append_pair("id", app_id)
        .append_pair("gl", &region.to_ascii_uppercase())
        .append_pair("hl", "en");
    Ok(url.to_string())
}
