//! iTunes Search and Lookup API payloads.

use kwrank_core::{AppListing, SerpItem};

use crate::types::{ItunesApp, ItunesResponse};

/// Parse a search payload. Entries without a `trackId` are skipped; a body
/// that is not iTunes JSON yields no items.
pub(super) fn parse_itunes_search(body: &str) -> (Vec<SerpItem>, Option<u32>) {
    let Ok(response) = serde_json::from_str::<ItunesResponse>(body) else {
        return (Vec::new(), None);
    };

    let items = response
        .results
        .into_iter()
        .filter_map(|app| {
            let app_id = app.track_id?.to_string();
            Some(SerpItem {
                position: 0,
                app_id,
                display_name: app.track_name,
                developer: app.artist_name,
                rating_count: app.user_rating_count,
                rating: app.average_user_rating,
            })
        })
        .collect();

    (items, response.result_count)
}

/// Parse a lookup payload into the listing of its first result.
pub fn parse_itunes_lookup(app_id: &str, body: &str) -> Option<AppListing> {
    let response = serde_json::from_str::<ItunesResponse>(body).ok()?;
    let app: ItunesApp = response.results.into_iter().next()?;
    Some(AppListing {
        app_id: app_id.to_owned(),
        name: app.track_name.unwrap_or_default(),
        subtitle: None,
        description: app.description,
        category: app.primary_genre_name,
    })
}
