use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::metrics::MetricsConfig;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub serp_request_timeout_secs: u64,
    /// Client identifiers rotated across outbound requests. Empty means the
    /// built-in browser pool.
    pub serp_user_agents: Vec<String>,
    pub ios_requests_per_minute: u32,
    pub android_requests_per_minute: u32,
    pub ios_base_url: String,
    pub android_base_url: String,
    pub serp_depth: u32,
    pub worker_count: usize,
    pub job_max_retries: u32,
    pub job_backoff_base_secs: u64,
    pub job_backoff_jitter_secs: u64,
    pub job_backoff_max_secs: u64,
    pub cycle_cron: String,
    pub cycle_window_secs: u64,
    pub manual_refresh_priority: i32,
    pub job_lease_secs: u64,
    pub job_retention_days: u32,
    pub stale_after_hours: u32,
    pub trend_threshold: i32,
    pub conversion_rate: f64,
    pub ctr_table: [f64; 10],
    pub ctr_tail_k: f64,
    pub ctr_tail_c: f64,
    pub ctr_tail_p: f64,
    pub competitor_top_n: usize,
    pub discovery_max_candidates: usize,
    pub discovery_concurrency: usize,
    pub category_seeds_path: PathBuf,
}

impl AppConfig {
    #[must_use]
    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            depth: self.serp_depth,
            ctr_table: self.ctr_table,
            ctr_tail_k: self.ctr_tail_k,
            ctr_tail_c: self.ctr_tail_c,
            ctr_tail_p: self.ctr_tail_p,
            conversion_rate: self.conversion_rate,
            trend_threshold: self.trend_threshold,
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.job_max_retries,
            base: Duration::from_secs(self.job_backoff_base_secs),
            jitter: Duration::from_secs(self.job_backoff_jitter_secs),
            max_delay: Duration::from_secs(self.job_backoff_max_secs),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("serp_request_timeout_secs", &self.serp_request_timeout_secs)
            .field("serp_user_agents", &self.serp_user_agents.len())
            .field("ios_requests_per_minute", &self.ios_requests_per_minute)
            .field(
                "android_requests_per_minute",
                &self.android_requests_per_minute,
            )
            .field("ios_base_url", &self.ios_base_url)
            .field("android_base_url", &self.android_base_url)
            .field("serp_depth", &self.serp_depth)
            .field("worker_count", &self.worker_count)
            .field("job_max_retries", &self.job_max_retries)
            .field("job_backoff_base_secs", &self.job_backoff_base_secs)
            .field("job_backoff_jitter_secs", &self.job_backoff_jitter_secs)
            .field("job_backoff_max_secs", &self.job_backoff_max_secs)
            .field("cycle_cron", &self.cycle_cron)
            .field("cycle_window_secs", &self.cycle_window_secs)
            .field("manual_refresh_priority", &self.manual_refresh_priority)
            .field("job_lease_secs", &self.job_lease_secs)
            .field("job_retention_days", &self.job_retention_days)
            .field("stale_after_hours", &self.stale_after_hours)
            .field("trend_threshold", &self.trend_threshold)
            .field("conversion_rate", &self.conversion_rate)
            .field("ctr_table", &self.ctr_table)
            .field("ctr_tail_k", &self.ctr_tail_k)
            .field("ctr_tail_c", &self.ctr_tail_c)
            .field("ctr_tail_p", &self.ctr_tail_p)
            .field("competitor_top_n", &self.competitor_top_n)
            .field("discovery_max_candidates", &self.discovery_max_candidates)
            .field("discovery_concurrency", &self.discovery_concurrency)
            .field("category_seeds_path", &self.category_seeds_path)
            .finish()
    }
}
