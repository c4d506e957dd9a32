//! HTTP client for storefront search and listing pages.

mod urls;

use std::sync::Arc;
use std::time::Duration;

use kwrank_core::{normalize_region, AppConfig, AppListing, Platform, MAX_TRACKED_DEPTH};
use reqwest::Client;

use crate::error::SerpError;
use crate::parse::{parse_itunes_lookup, parse_play_listing, parse_with_fallback};
use crate::rate_limit::{RateLimiter, SurfaceLimiters, MAX_RETRY_AFTER_SECS};
use crate::types::{SerpQuery, SerpResult};
use crate::user_agents::UserAgentPool;

/// Used when a 429 carries no parseable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Ranked-search client for the App Store and Google Play.
///
/// Every request goes through the [`RateLimiter`] of its platform, so the
/// same [`SurfaceLimiters`] must be shared by every component that talks to
/// the storefronts. Retrying is the scheduler's job: each call here is
/// exactly one attempt.
pub struct SerpClient {
    client: Client,
    user_agents: UserAgentPool,
    limiters: SurfaceLimiters,
    ios_base_url: String,
    android_base_url: String,
}

impl SerpClient {
    /// # Errors
    ///
    /// Returns [`SerpError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        timeout_secs: u64,
        user_agents: Vec<String>,
        limiters: SurfaceLimiters,
        ios_base_url: &str,
        android_base_url: &str,
    ) -> Result<Self, SerpError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            user_agents: UserAgentPool::new(user_agents),
            limiters,
            ios_base_url: ios_base_url.trim_end_matches('/').to_owned(),
            android_base_url: android_base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// # Errors
    ///
    /// Returns [`SerpError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig, limiters: SurfaceLimiters) -> Result<Self, SerpError> {
        Self::new(
            config.serp_request_timeout_secs,
            config.serp_user_agents.clone(),
            limiters,
            &config.ios_base_url,
            &config.android_base_url,
        )
    }

    #[must_use]
    pub fn limiter(&self, platform: Platform) -> &Arc<RateLimiter> {
        self.limiters.for_platform(platform)
    }

    /// Fetch one SERP and return its top `depth` entries (at most 50).
    ///
    /// # Errors
    ///
    /// - [`SerpError::InvalidRequest`] for a blank keyword, bad region or zero depth.
    /// - [`SerpError::RateLimited`] on HTTP 429. The platform's limiter is
    ///   penalised for the advertised `Retry-After`.
    /// - [`SerpError::NotFound`] / [`SerpError::UnexpectedStatus`] for other non-2xx.
    /// - [`SerpError::Http`] on network failure or timeout.
    /// - [`SerpError::Parse`] when no parser strategy yields a result.
    pub async fn fetch_ranking(&self, query: &SerpQuery) -> Result<SerpResult, SerpError> {
        let keyword = query.keyword.trim();
        if keyword.is_empty() {
            return Err(SerpError::InvalidRequest {
                reason: "keyword must be non-empty".to_owned(),
            });
        }
        let region = normalize_region(&query.region).map_err(|e| SerpError::InvalidRequest {
            reason: e.to_string(),
        })?;
        if query.depth == 0 {
            return Err(SerpError::InvalidRequest {
                reason: "depth must be at least 1".to_owned(),
            });
        }
        let depth = query.depth.min(MAX_TRACKED_DEPTH);

        let url = match query.platform {
            Platform::Ios => urls::itunes_search_url(&self.ios_base_url, keyword, &region, depth)?,
            Platform::Android => urls::play_search_url(&self.android_base_url, keyword, &region)?,
        };

        let body = self.get_text(query.platform, &url).await?;
        let result = parse_with_fallback(query.platform, keyword, &body, depth).inspect_err(|e| {
            tracing::warn!(
                keyword,
                platform = %query.platform,
                region = %region,
                kind = "parse_failure",
                error = %e,
                "SERP markup produced no results"
            );
        })?;

        tracing::debug!(
            keyword,
            platform = %query.platform,
            region = %region,
            strategy = %result.strategy,
            items = result.items.len(),
            "fetched SERP"
        );
        Ok(result)
    }

    /// Fetch the public listing of `app_id` for keyword discovery.
    ///
    /// # Errors
    ///
    /// Returns [`SerpError::NotFound`] when the storefront has no listing for
    /// the app, and the same transport errors as [`Self::fetch_ranking`].
    pub async fn lookup_app(
        &self,
        app_id: &str,
        platform: Platform,
        region: &str,
    ) -> Result<AppListing, SerpError> {
        let region = normalize_region(region).map_err(|e| SerpError::InvalidRequest {
            reason: e.to_string(),
        })?;

        let url = match platform {
            Platform::Ios => urls::itunes_lookup_url(&self.ios_base_url, app_id, &region)?,
            Platform::Android => urls::play_details_url(&self.android_base_url, app_id, &region)?,
        };

        let body = self.get_text(platform, &url).await?;
        let listing = match platform {
            Platform::Ios => parse_itunes_lookup(app_id, &body),
            Platform::Android => parse_play_listing(app_id, &body),
        };
        listing.ok_or(SerpError::NotFound { url })
    }

    /// One rate-limited GET returning the body of a 2xx response.
    async fn get_text(&self, platform: Platform, url: &str) -> Result<String, SerpError> {
        let limiter = self.limiters.for_platform(platform);
        let user_agent = self.user_agents.next_agent().to_owned();

        let response = limiter
            .execute(|| {
                self.client
                    .get(url)
                    .header(reqwest::header::USER_AGENT, user_agent)
                    .header(
                        reqwest::header::ACCEPT,
                        "application/json,text/html;q=0.9,*/*;q=0.8",
                    )
                    .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
                    .send()
            })
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
                .min(MAX_RETRY_AFTER_SECS);
            limiter.penalize(Duration::from_secs(retry_after_secs));
            return Err(SerpError::RateLimited {
                surface: limiter.surface().to_owned(),
                retry_after_secs,
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SerpError::NotFound {
                url: url.to_owned(),
            });
        }

        if !status.is_success() {
            return Err(SerpError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        limiter.record_success();
        Ok(response.text().await?)
    }
}
