use std::fmt::Display;
use std::str::FromStr;

use crate::app_config::{AppConfig, Environment};
use crate::metrics::DEFAULT_CTR_TABLE;
use crate::types::MAX_TRACKED_DEPTH;
use crate::ConfigError;

pub const DEFAULT_IOS_BASE_URL: &str = "https://itunes.apple.com";
pub const DEFAULT_ANDROID_BASE_URL: &str = "https://play.google.com";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl Display) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation are decoupled from the process environment so
/// tests can drive them with a plain `HashMap`.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    fn parse_value<T>(var: &str, raw: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        raw.trim().parse::<T>().map_err(|e| invalid(var, e))
    }

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("KWRANK_ENV", "development"))?;
    let bind_addr: SocketAddr =
        parse_value("KWRANK_BIND_ADDR", &or_default("KWRANK_BIND_ADDR", "0.0.0.0:3000"))?;
    let log_level = or_default("KWRANK_LOG_LEVEL", "info");

    let db_max_connections = parse_value(
        "KWRANK_DB_MAX_CONNECTIONS",
        &or_default("KWRANK_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections = parse_value(
        "KWRANK_DB_MIN_CONNECTIONS",
        &or_default("KWRANK_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs = parse_value(
        "KWRANK_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("KWRANK_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let serp_request_timeout_secs = parse_value(
        "KWRANK_SERP_REQUEST_TIMEOUT_SECS",
        &or_default("KWRANK_SERP_REQUEST_TIMEOUT_SECS", "20"),
    )?;
    let serp_user_agents = or_default("KWRANK_SERP_USER_AGENTS", "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect();

    let ios_requests_per_minute = parse_positive_u32(
        "KWRANK_IOS_REQUESTS_PER_MINUTE",
        &or_default("KWRANK_IOS_REQUESTS_PER_MINUTE", "20"),
    )?;
    let android_requests_per_minute = parse_positive_u32(
        "KWRANK_ANDROID_REQUESTS_PER_MINUTE",
        &or_default("KWRANK_ANDROID_REQUESTS_PER_MINUTE", "30"),
    )?;
    let ios_base_url = or_default("KWRANK_IOS_BASE_URL", DEFAULT_IOS_BASE_URL);
    let android_base_url = or_default("KWRANK_ANDROID_BASE_URL", DEFAULT_ANDROID_BASE_URL);

    let serp_depth =
        parse_positive_u32("KWRANK_SERP_DEPTH", &or_default("KWRANK_SERP_DEPTH", "50"))?
            .min(MAX_TRACKED_DEPTH);

    let worker_count: usize =
        parse_value("KWRANK_WORKER_COUNT", &or_default("KWRANK_WORKER_COUNT", "5"))?;
    if worker_count == 0 {
        return Err(invalid("KWRANK_WORKER_COUNT", "must be at least 1"));
    }

    let job_max_retries = parse_value(
        "KWRANK_JOB_MAX_RETRIES",
        &or_default("KWRANK_JOB_MAX_RETRIES", "3"),
    )?;
    let job_backoff_base_secs = parse_value(
        "KWRANK_JOB_BACKOFF_BASE_SECS",
        &or_default("KWRANK_JOB_BACKOFF_BASE_SECS", "60"),
    )?;
    let job_backoff_jitter_secs = parse_value(
        "KWRANK_JOB_BACKOFF_JITTER_SECS",
        &or_default("KWRANK_JOB_BACKOFF_JITTER_SECS", "30"),
    )?;
    let job_backoff_max_secs = parse_value(
        "KWRANK_JOB_BACKOFF_MAX_SECS",
        &or_default("KWRANK_JOB_BACKOFF_MAX_SECS", "21600"),
    )?;

    let cycle_cron = or_default("KWRANK_CYCLE_CRON", "0 0 3 * * *");
    let cycle_window_secs = parse_value(
        "KWRANK_CYCLE_WINDOW_SECS",
        &or_default("KWRANK_CYCLE_WINDOW_SECS", "21600"),
    )?;
    let manual_refresh_priority = parse_value(
        "KWRANK_MANUAL_REFRESH_PRIORITY",
        &or_default("KWRANK_MANUAL_REFRESH_PRIORITY", "10"),
    )?;
    let job_lease_secs = parse_value(
        "KWRANK_JOB_LEASE_SECS",
        &or_default("KWRANK_JOB_LEASE_SECS", "900"),
    )?;
    let job_retention_days = parse_value(
        "KWRANK_JOB_RETENTION_DAYS",
        &or_default("KWRANK_JOB_RETENTION_DAYS", "14"),
    )?;
    let stale_after_hours = parse_positive_u32(
        "KWRANK_STALE_AFTER_HOURS",
        &or_default("KWRANK_STALE_AFTER_HOURS", "24"),
    )?;

    let trend_threshold: i32 = parse_value(
        "KWRANK_TREND_THRESHOLD",
        &or_default("KWRANK_TREND_THRESHOLD", "3"),
    )?;
    if trend_threshold < 1 {
        return Err(invalid("KWRANK_TREND_THRESHOLD", "must be at least 1"));
    }

    let conversion_rate = parse_fraction(
        "KWRANK_CONVERSION_RATE",
        &or_default("KWRANK_CONVERSION_RATE", "0.3"),
    )?;
    let ctr_table = match lookup("KWRANK_CTR_TABLE") {
        Ok(raw) => parse_ctr_table(&raw)?,
        Err(_) => DEFAULT_CTR_TABLE,
    };
    let ctr_tail_k = parse_value("KWRANK_CTR_TAIL_K", &or_default("KWRANK_CTR_TAIL_K", "0.2"))?;
    let ctr_tail_c = parse_value("KWRANK_CTR_TAIL_C", &or_default("KWRANK_CTR_TAIL_C", "0.0"))?;
    let ctr_tail_p = parse_value("KWRANK_CTR_TAIL_P", &or_default("KWRANK_CTR_TAIL_P", "1.0"))?;
    validate_ctr_tail(&ctr_table, ctr_tail_k, ctr_tail_c, ctr_tail_p)?;

    let competitor_top_n = parse_value(
        "KWRANK_COMPETITOR_TOP_N",
        &or_default("KWRANK_COMPETITOR_TOP_N", "10"),
    )?;
    let discovery_max_candidates = parse_value(
        "KWRANK_DISCOVERY_MAX_CANDIDATES",
        &or_default("KWRANK_DISCOVERY_MAX_CANDIDATES", "40"),
    )?;
    let discovery_concurrency: usize = parse_value(
        "KWRANK_DISCOVERY_CONCURRENCY",
        &or_default("KWRANK_DISCOVERY_CONCURRENCY", "4"),
    )?;
    let category_seeds_path = PathBuf::from(or_default(
        "KWRANK_CATEGORY_SEEDS_PATH",
        "./config/category_seeds.yaml",
    ));

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        serp_request_timeout_secs,
        serp_user_agents,
        ios_requests_per_minute,
        android_requests_per_minute,
        ios_base_url,
        android_base_url,
        serp_depth,
        worker_count,
        job_max_retries,
        job_backoff_base_secs,
        job_backoff_jitter_secs,
        job_backoff_max_secs,
        cycle_cron,
        cycle_window_secs,
        manual_refresh_priority,
        job_lease_secs,
        job_retention_days,
        stale_after_hours,
        trend_threshold,
        conversion_rate,
        ctr_table,
        ctr_tail_k,
        ctr_tail_c,
        ctr_tail_p,
        competitor_top_n,
        discovery_max_candidates,
        discovery_concurrency: discovery_concurrency.max(1),
        category_seeds_path,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(invalid(
            "KWRANK_ENV",
            format!("unknown environment '{other}'"),
        )),
    }
}

fn parse_positive_u32(var: &str, raw: &str) -> Result<u32, ConfigError> {
    let value = raw.trim().parse::<u32>().map_err(|e| invalid(var, e))?;
    if value == 0 {
        return Err(invalid(var, "must be greater than zero"));
    }
    Ok(value)
}

fn parse_fraction(var: &str, raw: &str) -> Result<f64, ConfigError> {
    let value = raw.trim().parse::<f64>().map_err(|e| invalid(var, e))?;
    if !(value > 0.0 && value <= 1.0) {
        return Err(invalid(var, "must be within (0, 1]"));
    }
    Ok(value)
}

/// Parse ten comma-separated click-through fractions, strictly decreasing.
fn parse_ctr_table(raw: &str) -> Result<[f64; 10], ConfigError> {
    const VAR: &str = "KWRANK_CTR_TABLE";

    let values = raw
        .split(',')
        .map(|part| parse_fraction(VAR, part))
        .collect::<Result<Vec<f64>, _>>()?;
    let table: [f64; 10] = values
        .try_into()
        .map_err(|v: Vec<f64>| invalid(VAR, format!("expected 10 values, got {}", v.len())))?;

    if table.windows(2).any(|w| w[0] <= w[1]) {
        return Err(invalid(VAR, "values must be strictly decreasing"));
    }
    Ok(table)
}

/// The tail `k / (position - c)^p` must keep decreasing past position 10 and
/// start below the table's last entry.
fn validate_ctr_tail(table: &[f64; 10], k: f64, c: f64, p: f64) -> Result<(), ConfigError> {
    if !(k.is_finite() && k > 0.0) {
        return Err(invalid("KWRANK_CTR_TAIL_K", "must be positive"));
    }
    if !(p.is_finite() && p > 0.0) {
        return Err(invalid("KWRANK_CTR_TAIL_P", "must be positive"));
    }
    if !(c.is_finite() && c < 11.0) {
        return Err(invalid("KWRANK_CTR_TAIL_C", "must be below 11"));
    }
    let first_tail = k / (11.0 - c).powf(p);
    if !(first_tail.is_finite() && first_tail < table[9]) {
        return Err(invalid(
            "KWRANK_CTR_TAIL_K",
            format!("tail at position 11 ({first_tail}) must be below {}", table[9]),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
