//! Database operations for `ranking_snapshots`.
//!
//! There is exactly one snapshot per `(tracked_keyword_id, snapshot_date)`.
//! Writes are upserts guarded by `observed_at`: a row is only replaced by an
//! observation that is strictly newer, so a slow earlier attempt can never
//! overwrite a later one and replaying the same observation is a no-op.

use chrono::{DateTime, NaiveDate, Utc};
use kwrank_core::{CompetitorObservation, DemandTier, RankingSnapshot, Trend};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::competitor_observations::replace_competitors;
use crate::{decode_enum, decode_u32, encode_u32, DbError};

/// A row from the `ranking_snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RankingSnapshotRow {
    pub id: i64,
    pub tracked_keyword_id: i64,
    pub snapshot_date: NaiveDate,
    pub position: Option<i32>,
    pub serp: Json<Vec<String>>,
    pub result_count: i32,
    pub demand_tier: String,
    pub demand_score: f64,
    pub estimated_volume: f64,
    pub visibility_score: f64,
    pub estimated_traffic: i64,
    pub position_delta: Option<i32>,
    pub trend: String,
    pub observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RankingSnapshotRow> for RankingSnapshot {
    type Error = DbError;

    fn try_from(row: RankingSnapshotRow) -> Result<Self, Self::Error> {
        Ok(RankingSnapshot {
            tracked_keyword_id: row.tracked_keyword_id,
            snapshot_date: row.snapshot_date,
            position: row.position.map(|p| decode_u32("position", p)).transpose()?,
            serp: row.serp.0,
            result_count: decode_u32("result_count", row.result_count)?,
            demand_tier: decode_enum::<DemandTier>("demand_tier", &row.demand_tier)?,
            demand_score: row.demand_score,
            estimated_volume: row.estimated_volume,
            visibility_score: row.visibility_score,
            estimated_traffic: row.estimated_traffic,
            position_delta: row.position_delta,
            trend: decode_enum::<Trend>("trend", &row.trend)?,
            observed_at: row.observed_at,
        })
    }
}

/// Outcome of [`upsert_snapshot_with_competitors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotWrite {
    /// The snapshot (and its competitor rows) were inserted or replaced.
    Written { snapshot_id: i64 },
    /// An observation at least as new is already stored; nothing changed.
    Unchanged,
}

const COLUMNS: &str = "id, tracked_keyword_id, snapshot_date, position, serp, result_count, \
                       demand_tier, demand_score, estimated_volume, visibility_score, \
                       estimated_traffic, position_delta, trend, observed_at, created_at";

/// Writes the day's snapshot and its competitor observations in one transaction.
///
/// Competitor rows are replaced only when the snapshot row itself was written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; the transaction is rolled back.
pub async fn upsert_snapshot_with_competitors(
    pool: &PgPool,
    snapshot: &RankingSnapshot,
    competitors: &[CompetitorObservation],
) -> Result<SnapshotWrite, DbError> {
    let position = snapshot
        .position
        .map(|p| encode_u32("position", p))
        .transpose()?;
    let result_count = encode_u32("result_count", snapshot.result_count)?;

    let mut tx = pool.begin().await?;

    let snapshot_id: Option<i64> = sqlx::query_scalar::<_, i64>(
        "INSERT INTO ranking_snapshots \
             (tracked_keyword_id, snapshot_date, position, serp, result_count, demand_tier, \
              demand_score, estimated_volume, visibility_score, estimated_traffic, \
              position_delta, trend, observed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (tracked_keyword_id, snapshot_date) DO UPDATE SET \
             position = EXCLUDED.position, \
             serp = EXCLUDED.serp, \
             result_count = EXCLUDED.result_count, \
             demand_tier = EXCLUDED.demand_tier, \
             demand_score = EXCLUDED.demand_score, \
             estimated_volume = EXCLUDED.estimated_volume, \
             visibility_score = EXCLUDED.visibility_score, \
             estimated_traffic = EXCLUDED.estimated_traffic, \
             position_delta = EXCLUDED.position_delta, \
             trend = EXCLUDED.trend, \
             observed_at = EXCLUDED.observed_at \
         WHERE ranking_snapshots.observed_at < EXCLUDED.observed_at \
         RETURNING id",
    )
    .bind(snapshot.tracked_keyword_id)
    .bind(snapshot.snapshot_date)
    .bind(position)
    .bind(Json(&snapshot.serp))
    .bind(result_count)
    .bind(snapshot.demand_tier.as_str())
    .bind(snapshot.demand_score)
    .bind(snapshot.estimated_volume)
    .bind(snapshot.visibility_score)
    .bind(snapshot.estimated_traffic)
    .bind(snapshot.position_delta)
    .bind(snapshot.trend.as_str())
    .bind(snapshot.observed_at)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(snapshot_id) = snapshot_id else {
        tx.rollback().await?;
        return Ok(SnapshotWrite::Unchanged);
    };

    replace_competitors(&mut tx, snapshot_id, competitors).await?;
    tx.commit().await?;

    Ok(SnapshotWrite::Written { snapshot_id })
}

/// Most recent snapshot strictly before `date`, used as the trend baseline.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_snapshot_before(
    pool: &PgPool,
    tracked_keyword_id: i64,
    date: NaiveDate,
) -> Result<Option<RankingSnapshotRow>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM ranking_snapshots \
         WHERE tracked_keyword_id = $1 AND snapshot_date < $2 \
         ORDER BY snapshot_date DESC \
         LIMIT 1"
    );
    let row = sqlx::query_as::<_, RankingSnapshotRow>(&sql)
        .bind(tracked_keyword_id)
        .bind(date)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Snapshot history within `[from, to]`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_snapshots(
    pool: &PgPool,
    tracked_keyword_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<RankingSnapshotRow>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM ranking_snapshots \
         WHERE tracked_keyword_id = $1 AND snapshot_date BETWEEN $2 AND $3 \
         ORDER BY snapshot_date ASC"
    );
    let rows = sqlx::query_as::<_, RankingSnapshotRow>(&sql)
        .bind(tracked_keyword_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
