//! Keyword management and history commands.

use chrono::{Days, Utc};
use kwrank_core::{
    normalize_keyword, normalize_region, DiscoveryMethod, Platform, RankingSnapshot,
    TrackedKeyword,
};
use kwrank_db::NewTrackedKeyword;

const DASH: &str = "\u{2014}";

pub(crate) fn fmt_position(position: Option<u32>) -> String {
    position.map_or_else(|| DASH.to_string(), |p| p.to_string())
}

fn fmt_delta(delta: Option<i32>) -> String {
    match delta {
        Some(d) if d > 0 => format!("+{d}"),
        Some(d) => d.to_string(),
        None => DASH.to_string(),
    }
}

/// Upsert a tracked keyword after normalising its text and region.
///
/// # Errors
///
/// Returns an error if the keyword or region is invalid or the write fails.
pub(crate) async fn track_keyword(
    pool: &sqlx::PgPool,
    app_id: &str,
    keyword: &str,
    platform: Platform,
    region: &str,
    discovery_method: DiscoveryMethod,
) -> anyhow::Result<TrackedKeyword> {
    let keyword = normalize_keyword(keyword)?;
    let region = normalize_region(region)?;
    let row = kwrank_db::upsert_tracked_keyword(
        pool,
        &NewTrackedKeyword {
            app_id,
            keyword: &keyword,
            platform,
            region: &region,
            discovery_method,
        },
    )
    .await?;
    Ok(TrackedKeyword::try_from(row)?)
}

pub(crate) async fn run_track(
    pool: &sqlx::PgPool,
    app_id: &str,
    keyword: &str,
    platform: Platform,
    region: &str,
) -> anyhow::Result<()> {
    let tracked =
        track_keyword(pool, app_id, keyword, platform, region, DiscoveryMethod::Manual).await?;
    println!(
        "tracking #{} \"{}\" for {} ({} / {})",
        tracked.id, tracked.keyword, tracked.app_id, tracked.platform, tracked.region
    );
    Ok(())
}

pub(crate) async fn run_untrack(pool: &sqlx::PgPool, id: i64) -> anyhow::Result<()> {
    match kwrank_db::disable_tracked_keyword(pool, id).await {
        Ok(()) => {
            println!("keyword #{id} is no longer tracked; history is kept");
            Ok(())
        }
        Err(kwrank_db::DbError::NotFound) => anyhow::bail!("keyword #{id} not found"),
        Err(e) => Err(e.into()),
    }
}

/// List tracked keywords as a table.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_list(pool: &sqlx::PgPool, tracking_only: bool) -> anyhow::Result<()> {
    let rows = kwrank_db::list_tracked_keywords(pool, tracking_only).await?;
    if rows.is_empty() {
        println!("no keywords tracked; run `track` or `discover --track` first");
        return Ok(());
    }

    println!(
        "{:<7}{:<22}{:<9}{:<8}{:<11}{:<8}{:<18}KEYWORD",
        "ID", "APP", "PLATFORM", "REGION", "METHOD", "STATE", "LAST TRACKED"
    );
    for row in rows {
        let kw = TrackedKeyword::try_from(row)?;
        let state = match (kw.is_tracking, kw.needs_review) {
            (false, _) => "off",
            (true, true) => "review",
            (true, false) => "on",
        };
        let last = kw.last_tracked_at.map_or_else(
            || DASH.to_string(),
            |t| t.format("%Y-%m-%d %H:%M").to_string(),
        );
        println!(
            "{:<7}{:<22}{:<9}{:<8}{:<11}{:<8}{:<18}{}",
            kw.id,
            kw.app_id,
            kw.platform.as_str(),
            kw.region,
            kw.discovery_method.as_str(),
            state,
            last,
            kw.keyword
        );
    }
    Ok(())
}

/// Print the last `days` days of snapshots for a keyword, oldest first.
///
/// # Errors
///
/// Returns an error if the keyword does not exist or a query fails.
pub(crate) async fn run_history(pool: &sqlx::PgPool, id: i64, days: u32) -> anyhow::Result<()> {
    let keyword = match kwrank_db::get_tracked_keyword(pool, id).await {
        Ok(row) => TrackedKeyword::try_from(row)?,
        Err(kwrank_db::DbError::NotFound) => anyhow::bail!("keyword #{id} not found"),
        Err(e) => return Err(e.into()),
    };

    let to = Utc::now().date_naive();
    let from = to.checked_sub_days(Days::new(u64::from(days))).unwrap_or(to);
    let snapshots = kwrank_db::list_snapshots(pool, id, from, to)
        .await?
        .into_iter()
        .map(RankingSnapshot::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    println!(
        "#{} \"{}\" {} ({} / {})",
        keyword.id, keyword.keyword, keyword.app_id, keyword.platform, keyword.region
    );
    if keyword.needs_review {
        println!("needs review: the storefront rejected the last refresh");
    }
    if snapshots.is_empty() {
        println!("no snapshots between {from} and {to}");
        return Ok(());
    }

    println!();
    println!(
        "{:<12}{:<6}{:<7}{:<9}{:<11}{:<11}{:<9}TRAFFIC",
        "DATE", "POS", "DELTA", "TREND", "DEMAND", "VISIBILITY", "RESULTS"
    );
    for snap in &snapshots {
        println!(
            "{:<12}{:<6}{:<7}{:<9}{:<11}{:<11.1}{:<9}{}",
            snap.snapshot_date.to_string(),
            fmt_position(snap.position),
            fmt_delta(snap.position_delta),
            snap.trend.as_str(),
            snap.demand_tier.as_str(),
            snap.visibility_score,
            snap.result_count,
            snap.estimated_traffic
        );
    }
    Ok(())
}
