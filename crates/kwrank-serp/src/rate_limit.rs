//! Per-surface dispatch spacing for outbound storefront requests.
//!
//! Each external surface owns exactly one [`RateLimiter`]. Callers queue on a
//! fair async mutex, so admission is strictly first-come first-served, and a
//! request is dispatched only once `min_interval` has elapsed since the
//! previous dispatch on the same surface. Limiters are passed around as
//! `Arc`s; there is no process-global dispatch state.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kwrank_core::{AppConfig, Platform};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Ceiling of the exponent behind [`RateLimiter::backoff_multiplier`] (`2^4 = 16`).
const MAX_THROTTLE_EXPONENT: u32 = 4;

/// Longest pause a single throttling response can impose on a surface.
pub const MAX_RETRY_AFTER_SECS: u64 = 3600;

#[derive(Debug)]
pub struct RateLimiter {
    surface: String,
    min_interval: Duration,
    /// Time of the last admitted dispatch. Holding the lock is what
    /// serialises admission.
    last_dispatch: Mutex<Option<Instant>>,
    epoch: Instant,
    /// Milliseconds after `epoch` before which nothing is admitted; `0` = unset.
    blocked_until_ms: AtomicU64,
    consecutive_throttles: AtomicU32,
}

impl RateLimiter {
    /// Build a limiter that admits at most `requests_per_minute` dispatches per minute.
    ///
    /// A budget of zero is treated as one request per minute.
    #[must_use]
    pub fn per_minute(surface: impl Into<String>, requests_per_minute: u32) -> Self {
        let rpm = requests_per_minute.max(1);
        Self::with_interval(surface, Duration::from_secs(60) / rpm)
    }

    #[must_use]
    pub fn with_interval(surface: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            surface: surface.into(),
            min_interval,
            last_dispatch: Mutex::new(None),
            epoch: Instant::now(),
            blocked_until_ms: AtomicU64::new(0),
            consecutive_throttles: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn surface(&self) -> &str {
        &self.surface
    }

    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for this surface's next dispatch slot.
    ///
    /// Dropping the returned future while it waits gives up the slot without
    /// recording a dispatch, so a cancelled caller never consumes budget.
    pub async fn acquire(&self) {
        let mut last = self.last_dispatch.lock().await;
        loop {
            let now = Instant::now();
            let mut ready = last.map_or(now, |t| t + self.min_interval);
            if let Some(blocked) = self.blocked_until() {
                ready = ready.max(blocked);
            }
            if ready <= now {
                break;
            }
            // Re-evaluated after waking: a penalty may have arrived meanwhile.
            tokio::time::sleep_until(ready).await;
        }
        *last = Some(Instant::now());
    }

    /// Run `op` once admitted. Spacing applies to dispatch start times only.
    pub async fn execute<T, F, Fut>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await;
        op().await
    }

    /// Block the surface for `retry_after` (at most [`MAX_RETRY_AFTER_SECS`])
    /// and count one more consecutive throttle.
    pub fn penalize(&self, retry_after: Duration) {
        let retry_after = retry_after.min(Duration::from_secs(MAX_RETRY_AFTER_SECS));
        let now = Instant::now();
        let until = now.checked_add(retry_after).unwrap_or(now);
        let millis = u64::try_from(until.duration_since(self.epoch).as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        self.blocked_until_ms.fetch_max(millis, Ordering::SeqCst);
        let throttles = self.consecutive_throttles.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::warn!(
            surface = %self.surface,
            kind = "rate_limited",
            retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            consecutive_throttles = throttles,
            "storefront throttled requests; pausing surface"
        );
    }

    /// Reset the throttle streak after a successful response.
    pub fn record_success(&self) {
        self.consecutive_throttles.store(0, Ordering::SeqCst);
    }

    /// `2^n` for `n` consecutive throttles, capped at 16.
    #[must_use]
    pub fn backoff_multiplier(&self) -> u32 {
        let n = self
            .consecutive_throttles
            .load(Ordering::SeqCst)
            .min(MAX_THROTTLE_EXPONENT);
        1 << n
    }

    fn blocked_until(&self) -> Option<Instant> {
        match self.blocked_until_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(self.epoch + Duration::from_millis(ms)),
        }
    }
}

/// One limiter per storefront surface.
#[derive(Debug, Clone)]
pub struct SurfaceLimiters {
    ios: Arc<RateLimiter>,
    android: Arc<RateLimiter>,
}

impl SurfaceLimiters {
    #[must_use]
    pub fn new(ios: Arc<RateLimiter>, android: Arc<RateLimiter>) -> Self {
        Self { ios, android }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(RateLimiter::per_minute(
                Platform::Ios.as_str(),
                config.ios_requests_per_minute,
            )),
            Arc::new(RateLimiter::per_minute(
                Platform::Android.as_str(),
                config.android_requests_per_minute,
            )),
        )
    }

    #[must_use]
    pub fn for_platform(&self, platform: Platform) -> &Arc<RateLimiter> {
        match platform {
            Platform::Ios => &self.ios,
            Platform::Android => &self.android,
        }
    }

    pub async fn execute<T, F, Fut>(&self, platform: Platform, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.for_platform(platform).execute(op).await
    }
}
