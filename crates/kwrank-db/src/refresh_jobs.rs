//! Durable refresh queue stored in `refresh_jobs`.
//!
//! State machine: `pending -> processing -> completed | pending (retry) | failed`.
//! Every transition out of `processing` is guarded on the current status, so
//! a job can only be moved by the worker that claimed it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kwrank_core::{JobStatus, RefreshJob};
use sqlx::PgPool;

use crate::{decode_enum, decode_u32, encode_u32, DbError};

/// A row from the `refresh_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshJobRow {
    pub id: i64,
    pub tracked_keyword_id: i64,
    pub status: String,
    pub priority: i32,
    pub retry_count: i32,
    pub max_retries: i32,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RefreshJobRow> for RefreshJob {
    type Error = DbError;

    fn try_from(row: RefreshJobRow) -> Result<Self, Self::Error> {
        Ok(RefreshJob {
            id: row.id,
            tracked_keyword_id: row.tracked_keyword_id,
            status: decode_enum::<JobStatus>("status", &row.status)?,
            priority: row.priority,
            retry_count: decode_u32("retry_count", row.retry_count)?,
            max_retries: decode_u32("max_retries", row.max_retries)?,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_detail: row.error_detail,
            created_at: row.created_at,
        })
    }
}

const COLUMNS: &str = "id, tracked_keyword_id, status, priority, retry_count, max_retries, \
                       scheduled_at, started_at, completed_at, error_detail, created_at";

/// Enqueues one pending job per tracking-enabled keyword, staggered evenly
/// across `window` starting at `now`.
///
/// Keywords that already have a pending or processing job are skipped, as
/// are keywords flagged for review; [`enqueue_manual`] still reaches those.
/// Least recently refreshed keywords get the earliest slots. Returns the
/// number of jobs inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn enqueue_cycle(
    pool: &PgPool,
    now: DateTime<Utc>,
    window: Duration,
    max_retries: u32,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "WITH due AS ( \
             SELECT tk.id, \
                    ROW_NUMBER() OVER ( \
                        ORDER BY tk.last_tracked_at ASC NULLS FIRST, tk.id) - 1 AS slot, \
                    COUNT(*) OVER () AS total \
             FROM tracked_keywords tk \
             WHERE tk.is_tracking AND NOT tk.needs_review \
               AND NOT EXISTS ( \
                   SELECT 1 FROM refresh_jobs rj \
                   WHERE rj.tracked_keyword_id = tk.id \
                     AND rj.status IN ('pending', 'processing')) \
         ) \
         INSERT INTO refresh_jobs \
             (tracked_keyword_id, status, priority, max_retries, scheduled_at) \
         SELECT id, 'pending', 0, $3, $1 + make_interval(secs => slot * $2 / total) \
         FROM due \
         ON CONFLICT (tracked_keyword_id) WHERE status IN ('pending', 'processing') DO NOTHING",
    )
    .bind(now)
    .bind(window.as_secs_f64())
    .bind(encode_u32("max_retries", max_retries)?)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Queues an immediate refresh for each id in `keyword_ids`.
///
/// An existing pending job is promoted (priority raised, `scheduled_at`
/// pulled to `now`); otherwise a new job is inserted at `priority`. Disabled
/// keywords and keywords with a job already processing are left alone.
/// Returns the number of jobs inserted or promoted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either statement fails.
pub async fn enqueue_manual(
    pool: &PgPool,
    keyword_ids: &[i64],
    priority: i32,
    max_retries: u32,
    now: DateTime<Utc>,
) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;

    let promoted = sqlx::query(
        "UPDATE refresh_jobs rj \
         SET priority = GREATEST(rj.priority, $2), scheduled_at = LEAST(rj.scheduled_at, $3) \
         FROM tracked_keywords tk \
         WHERE tk.id = rj.tracked_keyword_id \
           AND tk.is_tracking \
           AND rj.tracked_keyword_id = ANY($1) \
           AND rj.status = 'pending'",
    )
    .bind(keyword_ids)
    .bind(priority)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let inserted = sqlx::query(
        "INSERT INTO refresh_jobs \
             (tracked_keyword_id, status, priority, max_retries, scheduled_at) \
         SELECT tk.id, 'pending', $2, $3, $4 \
         FROM tracked_keywords tk \
         WHERE tk.id = ANY($1) AND tk.is_tracking \
         ON CONFLICT (tracked_keyword_id) WHERE status IN ('pending', 'processing') DO NOTHING",
    )
    .bind(keyword_ids)
    .bind(priority)
    .bind(encode_u32("max_retries", max_retries)?)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;
    Ok(promoted + inserted)
}

/// Atomically claims the most urgent due job: highest priority first, then
/// earliest `scheduled_at`.
///
/// Jobs whose keyword has been disabled are never claimed. `SKIP LOCKED`
/// lets concurrent workers claim different jobs without blocking.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn claim_next_job(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Option<RefreshJobRow>, DbError> {
    let sql = format!(
        "UPDATE refresh_jobs \
         SET status = 'processing', started_at = $1 \
         WHERE id = ( \
             SELECT rj.id FROM refresh_jobs rj \
             JOIN tracked_keywords tk ON tk.id = rj.tracked_keyword_id \
             WHERE rj.status = 'pending' AND rj.scheduled_at <= $1 AND tk.is_tracking \
             ORDER BY rj.priority DESC, rj.scheduled_at ASC, rj.id ASC \
             LIMIT 1 \
             FOR UPDATE OF rj SKIP LOCKED) \
         RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, RefreshJobRow>(&sql)
        .bind(now)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

fn ensure_transitioned(rows_affected: u64, id: i64) -> Result<(), DbError> {
    if rows_affected == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "processing",
        });
    }
    Ok(())
}

/// `processing -> completed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not processing.
pub async fn complete_job(pool: &PgPool, id: i64, now: DateTime<Utc>) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE refresh_jobs \
         SET status = 'completed', completed_at = $2, error_detail = NULL \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;
    ensure_transitioned(result.rows_affected(), id)
}

/// `processing -> pending` with an incremented retry count.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not processing.
pub async fn retry_job(
    pool: &PgPool,
    id: i64,
    retry_count: u32,
    scheduled_at: DateTime<Utc>,
    error_detail: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE refresh_jobs \
         SET status = 'pending', retry_count = $2, scheduled_at = $3, error_detail = $4, \
             started_at = NULL \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(encode_u32("retry_count", retry_count)?)
    .bind(scheduled_at)
    .bind(error_detail)
    .execute(pool)
    .await?;
    ensure_transitioned(result.rows_affected(), id)
}

/// `processing -> failed` (terminal).
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not processing.
pub async fn fail_job(
    pool: &PgPool,
    id: i64,
    error_detail: &str,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE refresh_jobs \
         SET status = 'failed', completed_at = $2, error_detail = $3 \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(now)
    .bind(error_detail)
    .execute(pool)
    .await?;
    ensure_transitioned(result.rows_affected(), id)
}

/// `processing -> pending` without consuming a retry, for attempts abandoned
/// at shutdown.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not processing.
pub async fn requeue_job(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE refresh_jobs SET status = 'pending', started_at = NULL \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .execute(pool)
    .await?;
    ensure_transitioned(result.rows_affected(), id)
}

/// Returns jobs stuck in `processing` for longer than `lease` to `pending`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn recover_stale_jobs(
    pool: &PgPool,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE refresh_jobs SET status = 'pending', started_at = NULL \
         WHERE status = 'processing' AND started_at < $1 - make_interval(secs => $2)",
    )
    .bind(now)
    .bind(lease.as_secs_f64())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Deletes completed and failed jobs finished more than `retention` ago.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_finished_jobs(
    pool: &PgPool,
    now: DateTime<Utc>,
    retention: Duration,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM refresh_jobs \
         WHERE status IN ('completed', 'failed') \
           AND completed_at < $1 - make_interval(secs => $2)",
    )
    .bind(now)
    .bind(retention.as_secs_f64())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn get_refresh_job(pool: &PgPool, id: i64) -> Result<RefreshJobRow, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM refresh_jobs WHERE id = $1");
    sqlx::query_as::<_, RefreshJobRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// The most recently created job for a keyword, if any survives retention.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_job_for_keyword(
    pool: &PgPool,
    tracked_keyword_id: i64,
) -> Result<Option<RefreshJobRow>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM refresh_jobs \
         WHERE tracked_keyword_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT 1"
    );
    let row = sqlx::query_as::<_, RefreshJobRow>(&sql)
        .bind(tracked_keyword_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}
