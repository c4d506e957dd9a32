//! Rank tracking pipeline: discovery, scheduled refresh and snapshot
//! computation on top of `kwrank-serp` and `kwrank-db`.

pub mod competitors;
pub mod discovery;
pub mod error;
pub mod pg_store;
pub mod scheduler;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod testing;

pub use competitors::CompetitorRecorder;
pub use discovery::{
    build_candidates, discover, Candidate, DiscoveredKeyword, DiscoveryOptions,
};
pub use error::{StoreError, TrackerError};
pub use pg_store::PgStore;
pub use scheduler::{
    process_job, system_clock, Clock, CycleReport, JobOutcome, RefreshScheduler,
    SchedulerSettings, WorkerContext, WorkerStats,
};
pub use snapshot::compute_snapshot;
pub use store::{ClaimedJob, RankingStore, SerpSource, WriteOutcome};
