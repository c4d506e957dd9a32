//! `discover`: search candidate keywords for an app and optionally track the hits.

use kwrank_core::{load_category_seeds, AppConfig, AppListing, DiscoveryMethod, Platform};
use kwrank_serp::SerpClient;
use kwrank_tracker::{discover, DiscoveredKeyword, DiscoveryOptions};

use crate::keywords::track_keyword;

#[derive(Debug)]
pub(crate) struct DiscoverArgs {
    pub app_id: String,
    pub platform: Platform,
    pub region: String,
    pub name: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub max_candidates: Option<usize>,
    pub track: bool,
    pub json: bool,
}

/// Build the listing from the supplied text, or look it up when no name is given.
async fn resolve_listing(serp: &SerpClient, args: &DiscoverArgs) -> anyhow::Result<AppListing> {
    match &args.name {
        Some(name) => Ok(AppListing {
            app_id: args.app_id.clone(),
            name: name.clone(),
            subtitle: args.subtitle.clone(),
            description: args.description.clone(),
            category: args.category.clone(),
        }),
        None => {
            let mut listing = serp
                .lookup_app(&args.app_id, args.platform, &args.region)
                .await?;
            if args.category.is_some() {
                listing.category.clone_from(&args.category);
            }
            Ok(listing)
        }
    }
}

fn print_table(listing: &AppListing, found: &[DiscoveredKeyword]) {
    println!("{} ({}): {} ranked keyword(s)", listing.name, listing.app_id, found.len());
    if found.is_empty() {
        return;
    }
    println!("{:<6}{:<12}KEYWORD", "POS", "CONFIDENCE");
    for hit in found {
        println!(
            "{:<6}{:<12}{}",
            hit.position,
            hit.confidence.as_str(),
            hit.keyword
        );
    }
}

/// # Errors
///
/// Returns an error if the seed file cannot be loaded, the listing lookup
/// fails, the region is invalid, or tracking a found keyword fails.
pub(crate) async fn run_discover(
    config: &AppConfig,
    pool: &sqlx::PgPool,
    serp: &SerpClient,
    args: DiscoverArgs,
) -> anyhow::Result<()> {
    let seeds = load_category_seeds(&config.category_seeds_path)?;
    let mut options = DiscoveryOptions::from_app_config(config);
    if let Some(max) = args.max_candidates {
        options.max_candidates = max.max(1);
    }

    let listing = resolve_listing(serp, &args).await?;
    let found = discover(serp, &listing, args.platform, &args.region, &seeds, options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        print_table(&listing, &found);
    }

    if args.track {
        for hit in &found {
            let tracked = track_keyword(
                pool,
                &listing.app_id,
                &hit.keyword,
                args.platform,
                &args.region,
                DiscoveryMethod::Auto,
            )
            .await?;
            tracing::info!(
                keyword_id = tracked.id,
                keyword = %tracked.keyword,
                "discovery: keyword tracked"
            );
        }
        if !args.json {
            println!("tracking {} keyword(s)", found.len());
        }
    }
    Ok(())
}
