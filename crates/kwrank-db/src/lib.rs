use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/kwrank-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &kwrank_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("refresh job {id} is not in status '{expected_status}'")]
    InvalidJobTransition {
        id: i64,
        expected_status: &'static str,
    },
    #[error("cannot decode column {column}: {value}")]
    Decode { column: &'static str, value: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// `true` for a Postgres unique-constraint violation (SQLSTATE 23505).
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

/// Open a Postgres pool sized by `config`.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the first connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

async fn applied_migrations(pool: &PgPool) -> i64 {
    // `_sqlx_migrations` does not exist until the first run.
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Apply pending migrations from `migrations/` and return how many ran.
///
/// # Errors
///
/// Returns [`DbError::Migration`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, DbError> {
    let before = applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let after = applied_migrations(pool).await;
    Ok(usize::try_from(after - before).unwrap_or(0))
}

/// `SELECT 1` against the pool; used by the server health endpoint.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if no connection can be acquired or the query fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}

pub(crate) fn decode_enum<T: std::str::FromStr>(
    column: &'static str,
    value: &str,
) -> Result<T, DbError> {
    value.parse::<T>().map_err(|_| DbError::Decode {
        column,
        value: value.to_string(),
    })
}

pub(crate) fn decode_u32(column: &'static str, value: i32) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|_| DbError::Decode {
        column,
        value: value.to_string(),
    })
}

pub(crate) fn encode_u32(column: &'static str, value: u32) -> Result<i32, DbError> {
    i32::try_from(value).map_err(|_| DbError::Decode {
        column,
        value: value.to_string(),
    })
}


pub mod competitor_observations;
pub mod ranking_snapshots;
pub mod refresh_jobs;
pub mod tracked_keywords;

pub use competitor_observations::{list_competitors, CompetitorObservationRow};
pub use ranking_snapshots::{
    latest_snapshot_before, list_snapshots, upsert_snapshot_with_competitors, RankingSnapshotRow,
    SnapshotWrite,
};
pub use refresh_jobs::{
    claim_next_job, complete_job, enqueue_cycle, enqueue_manual, fail_job, get_refresh_job,
    latest_job_for_keyword, purge_finished_jobs, recover_stale_jobs, requeue_job, retry_job,
    RefreshJobRow,
};
pub use tracked_keywords::{
    disable_tracked_keyword, flag_needs_review, get_tracked_keyword, list_tracked_keywords,
    mark_tracked, upsert_tracked_keyword, NewTrackedKeyword, TrackedKeywordRow,
};
