//! Retry bookkeeping for refresh jobs.
//!
//! The worker never sleeps between attempts. A failed attempt is turned into
//! a [`JobTransition`] here and persisted, and the next attempt is picked up
//! once the job's `scheduled_at` has elapsed.
//!
//! | retry_count before failure | delay (base = 1 s)   |
//! |----------------------------|----------------------|
//! | 0                          | 1 s + jitter         |
//! | 1                          | 2 s + jitter         |
//! | 2                          | 4 s + jitter         |

use std::time::Duration;

use chrono::{DateTime, Utc};

/// How a failed attempt should be treated by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The storefront signalled throttling; retried with a surface-scaled backoff.
    RateLimited,
    /// Network trouble, timeouts, 5xx or unparseable markup; retried.
    Transient,
    /// The request can never succeed as stated; fails without retry.
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    /// Upper bound of the uniformly sampled jitter added to every delay.
    pub jitter: Duration,
    pub max_delay: Duration,
}

/// What happens to a job after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTransition {
    /// Back to `pending` with an incremented retry count.
    Retry {
        retry_count: u32,
        scheduled_at: DateTime<Utc>,
        delay: Duration,
    },
    /// Terminal `failed`.
    Fail { reason: FailReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    Permanent,
    RetriesExhausted,
}

impl RetryPolicy {
    /// `base * 2^retry_count * multiplier`, capped at `max_delay`. Jitter excluded.
    #[must_use]
    pub fn backoff_delay(&self, retry_count: u32, multiplier: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry_count.min(31))
            .unwrap_or(u32::MAX)
            .saturating_mul(multiplier.max(1));
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decide the next state of a job whose attempt number `retry_count` failed.
    ///
    /// `multiplier` scales the delay for throttled surfaces and
    /// `jitter_sample` is a value in `[0, 1)` choosing the point within the
    /// jitter bound.
    #[must_use]
    pub fn next_transition(
        &self,
        retry_count: u32,
        class: ErrorClass,
        now: DateTime<Utc>,
        multiplier: u32,
        jitter_sample: f64,
    ) -> JobTransition {
        if class == ErrorClass::Permanent {
            return JobTransition::Fail {
                reason: FailReason::Permanent,
            };
        }

        let next_count = retry_count.saturating_add(1);
        if next_count > self.max_retries {
            return JobTransition::Fail {
                reason: FailReason::RetriesExhausted,
            };
        }

        let multiplier = if class == ErrorClass::RateLimited {
            multiplier
        } else {
            1
        };
        let delay = self.backoff_delay(retry_count, multiplier)
            + self.jitter.mul_f64(jitter_sample.clamp(0.0, 1.0));
        let scheduled_at = now
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(24));

        JobTransition::Retry {
            retry_count: next_count,
            scheduled_at,
            delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base: Duration::from_secs(1),
            jitter: Duration::from_millis(500),
            max_delay: Duration::from_secs(3600),
        }
    }

    #[test]
    fn delays_double_per_retry() {
        let p = policy();
        assert_eq!(p.backoff_delay(0, 1), Duration::from_secs(1));
        assert_eq!(p.backoff_delay(1, 1), Duration::from_secs(2));
        assert_eq!(p.backoff_delay(2, 1), Duration::from_secs(4));
    }

    #[test]
    fn delay_is_capped() {
        let p = policy();
        assert_eq!(p.backoff_delay(40, 16), Duration::from_secs(3600));
    }

    #[test]
    fn transient_failure_reschedules_within_jitter_bound() {
        let p = policy();
        let now = Utc::now();
        for (retry_count, expected_secs) in [(0u32, 1u64), (1, 2), (2, 4)] {
            for sample in [0.0, 0.5, 0.999] {
                match p.next_transition(retry_count, ErrorClass::Transient, now, 1, sample) {
                    JobTransition::Retry {
                        retry_count: next,
                        scheduled_at,
                        delay,
                    } => {
                        assert_eq!(next, retry_count + 1);
                        let lower = Duration::from_secs(expected_secs);
                        assert!(delay >= lower && delay <= lower + p.jitter);
                        assert_eq!(
                            scheduled_at,
                            now + chrono::Duration::from_std(delay).unwrap()
                        );
                    }
                    other @ JobTransition::Fail { .. } => panic!("unexpected {other:?}"),
                }
            }
        }
    }

    #[test]
    fn exhausted_retries_fail() {
        let p = policy();
        let transition = p.next_transition(3, ErrorClass::Transient, Utc::now(), 1, 0.0);
        assert_eq!(
            transition,
            JobTransition::Fail {
                reason: FailReason::RetriesExhausted
            }
        );
    }

    #[test]
    fn permanent_failure_bypasses_retries() {
        let p = policy();
        let transition = p.next_transition(0, ErrorClass::Permanent, Utc::now(), 1, 0.0);
        assert_eq!(
            transition,
            JobTransition::Fail {
                reason: FailReason::Permanent
            }
        );
    }

    #[test]
    fn rate_limited_failures_use_surface_multiplier() {
        let p = policy();
        let JobTransition::Retry { delay, .. } =
            p.next_transition(1, ErrorClass::RateLimited, Utc::now(), 4, 0.0)
        else {
            panic!("expected retry");
        };
        assert_eq!(delay, Duration::from_secs(8));

        let JobTransition::Retry { delay, .. } =
            p.next_transition(1, ErrorClass::Transient, Utc::now(), 4, 0.0)
        else {
            panic!("expected retry");
        };
        assert_eq!(delay, Duration::from_secs(2));
    }
}
