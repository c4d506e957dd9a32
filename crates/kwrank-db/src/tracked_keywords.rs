//! Database operations for `tracked_keywords`.

use chrono::{DateTime, Utc};
use kwrank_core::{DiscoveryMethod, Platform, TrackedKeyword};
use sqlx::PgPool;

use crate::{decode_enum, DbError};

/// A row from the `tracked_keywords` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrackedKeywordRow {
    pub id: i64,
    pub app_id: String,
    pub keyword: String,
    pub platform: String,
    pub region: String,
    pub is_tracking: bool,
    pub discovery_method: String,
    pub needs_review: bool,
    pub last_tracked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TrackedKeywordRow> for TrackedKeyword {
    type Error = DbError;

    fn try_from(row: TrackedKeywordRow) -> Result<Self, Self::Error> {
        Ok(TrackedKeyword {
            id: row.id,
            platform: decode_enum::<Platform>("platform", &row.platform)?,
            discovery_method: decode_enum::<DiscoveryMethod>(
                "discovery_method",
                &row.discovery_method,
            )?,
            app_id: row.app_id,
            keyword: row.keyword,
            region: row.region,
            is_tracking: row.is_tracking,
            needs_review: row.needs_review,
            last_tracked_at: row.last_tracked_at,
            created_at: row.created_at,
        })
    }
}

/// Identity and origin of a keyword to track. Text fields are expected to be
/// normalised already (see [`kwrank_core::normalize_keyword`]).
#[derive(Debug, Clone)]
pub struct NewTrackedKeyword<'a> {
    pub app_id: &'a str,
    pub keyword: &'a str,
    pub platform: Platform,
    pub region: &'a str,
    pub discovery_method: DiscoveryMethod,
}

const COLUMNS: &str = "id, app_id, keyword, platform, region, is_tracking, discovery_method, \
                       needs_review, last_tracked_at, created_at";

/// Inserts a tracked keyword, or re-enables the existing row with the same
/// `(app_id, keyword, platform, region)`.
///
/// Re-enabling keeps the original `discovery_method` and clears `needs_review`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_tracked_keyword(
    pool: &PgPool,
    new: &NewTrackedKeyword<'_>,
) -> Result<TrackedKeywordRow, DbError> {
    let sql = format!(
        "INSERT INTO tracked_keywords (app_id, keyword, platform, region, discovery_method) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (app_id, keyword, platform, region) DO UPDATE \
         SET is_tracking = TRUE, needs_review = FALSE, updated_at = NOW() \
         RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, TrackedKeywordRow>(&sql)
        .bind(new.app_id)
        .bind(new.keyword)
        .bind(new.platform.as_str())
        .bind(new.region)
        .bind(new.discovery_method.as_str())
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Sets `is_tracking = FALSE`. History and queued jobs are left in place;
/// the claim query skips jobs whose keyword is not tracking.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn disable_tracked_keyword(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE tracked_keywords SET is_tracking = FALSE, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn get_tracked_keyword(pool: &PgPool, id: i64) -> Result<TrackedKeywordRow, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM tracked_keywords WHERE id = $1");
    sqlx::query_as::<_, TrackedKeywordRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Lists keywords ordered by app then keyword; `tracking_only` drops disabled rows.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_tracked_keywords(
    pool: &PgPool,
    tracking_only: bool,
) -> Result<Vec<TrackedKeywordRow>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM tracked_keywords \
         WHERE ($1 = FALSE OR is_tracking) \
         ORDER BY app_id, platform, region, keyword"
    );
    let rows = sqlx::query_as::<_, TrackedKeywordRow>(&sql)
        .bind(tracking_only)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Marks a keyword for manual review after a permanent refresh failure.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn flag_needs_review(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE tracked_keywords SET needs_review = TRUE, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Records a successful refresh and clears the review flag.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_tracked(pool: &PgPool, id: i64, at: DateTime<Utc>) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE tracked_keywords \
         SET last_tracked_at = GREATEST(COALESCE(last_tracked_at, $2), $2), \
             needs_review = FALSE, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(())
}
