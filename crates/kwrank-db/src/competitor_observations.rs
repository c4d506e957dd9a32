//! Database operations for `competitor_observations`.

use chrono::NaiveDate;
use kwrank_core::CompetitorObservation;
use sqlx::{PgPool, Postgres, Transaction};

use crate::{decode_u32, encode_u32, DbError};

/// A row from the `competitor_observations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompetitorObservationRow {
    pub id: i64,
    pub ranking_snapshot_id: i64,
    pub tracked_keyword_id: i64,
    pub snapshot_date: NaiveDate,
    pub competitor_app_id: String,
    pub competitor_name: Option<String>,
    pub position: i32,
    pub rating_count: Option<i64>,
}

impl TryFrom<CompetitorObservationRow> for CompetitorObservation {
    type Error = DbError;

    fn try_from(row: CompetitorObservationRow) -> Result<Self, Self::Error> {
        Ok(CompetitorObservation {
            tracked_keyword_id: row.tracked_keyword_id,
            snapshot_date: row.snapshot_date,
            competitor_app_id: row.competitor_app_id,
            competitor_name: row.competitor_name,
            position: decode_u32("position", row.position)?,
            rating_count: row.rating_count.and_then(|c| u64::try_from(c).ok()),
        })
    }
}

/// Replace the competitor rows owned by `snapshot_id`.
pub(crate) async fn replace_competitors(
    tx: &mut Transaction<'_, Postgres>,
    snapshot_id: i64,
    competitors: &[CompetitorObservation],
) -> Result<(), DbError> {
    sqlx::query("DELETE FROM competitor_observations WHERE ranking_snapshot_id = $1")
        .bind(snapshot_id)
        .execute(&mut **tx)
        .await?;

    for competitor in competitors {
        sqlx::query(
            "INSERT INTO competitor_observations \
                 (ranking_snapshot_id, tracked_keyword_id, snapshot_date, competitor_app_id, \
                  competitor_name, position, rating_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (ranking_snapshot_id, competitor_app_id) DO NOTHING",
        )
        .bind(snapshot_id)
        .bind(competitor.tracked_keyword_id)
        .bind(competitor.snapshot_date)
        .bind(&competitor.competitor_app_id)
        .bind(competitor.competitor_name.as_deref())
        .bind(encode_u32("position", competitor.position)?)
        .bind(competitor.rating_count.and_then(|c| i64::try_from(c).ok()))
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Competitors recorded for a keyword on `date`, best position first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_competitors(
    pool: &PgPool,
    tracked_keyword_id: i64,
    date: NaiveDate,
) -> Result<Vec<CompetitorObservationRow>, DbError> {
    let rows = sqlx::query_as::<_, CompetitorObservationRow>(
        "SELECT id, ranking_snapshot_id, tracked_keyword_id, snapshot_date, competitor_app_id, \
                competitor_name, position, rating_count \
         FROM competitor_observations \
         WHERE tracked_keyword_id = $1 AND snapshot_date = $2 \
         ORDER BY position ASC",
    )
    .bind(tracked_keyword_id)
    .bind(date)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
