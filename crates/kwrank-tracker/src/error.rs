use kwrank_core::CoreError;
use kwrank_db::DbError;
use kwrank_serp::SerpError;
use thiserror::Error;

/// Failure of a [`RankingStore`](crate::RankingStore) operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent attempt already wrote the day's snapshot.
    #[error("snapshot for keyword {tracked_keyword_id} was written concurrently")]
    PersistenceConflict { tracked_keyword_id: i64 },

    #[error("database error: {0}")]
    Db(#[from] DbError),
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Serp(#[from] SerpError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    Invalid(#[from] CoreError),
}
