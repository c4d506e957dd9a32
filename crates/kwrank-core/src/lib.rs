pub mod app_config;
pub mod category_seeds;
pub mod config;
pub mod metrics;
pub mod retry;
pub mod types;
pub mod volume;

pub use app_config::{AppConfig, Environment};
pub use category_seeds::{load_category_seeds, parse_category_seeds, CategorySeeds};
pub use config::{load_app_config, load_app_config_from_env};
pub use metrics::MetricsConfig;
pub use retry::{ErrorClass, FailReason, JobTransition, RetryPolicy};
pub use types::{
    normalize_keyword, normalize_region, AppListing, CompetitorObservation, Confidence,
    DemandTier, DiscoveryMethod, JobStatus, Platform, RankingSnapshot, RefreshJob, SerpItem,
    TrackedKeyword, Trend, MAX_TRACKED_DEPTH,
};
pub use volume::{estimate_demand, VolumeEstimate};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid {kind}: {value}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("invalid keyword: {0}")]
    InvalidKeyword(String),

    #[error("invalid region: {0}")]
    InvalidRegion(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read category seeds file {path}: {source}")]
    SeedsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse category seeds file: {0}")]
    SeedsFileParse(#[source] serde_yaml::Error),

    #[error("config validation failed: {0}")]
    Validation(String),
}
