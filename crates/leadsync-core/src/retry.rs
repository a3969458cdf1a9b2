//! Bounded retry policy with per-cause backoff

use std::time::Duration;

/// Default attempt budget per logical request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Why an attempt is being retried
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryCause {
    /// 429 with the server's `Retry-After` advice, if any
    RateLimited { advised: Option<Duration> },
    /// Network-level failure or timeout
    Transient,
}

/// Retry limits and backoff per cause.
///
/// Independent of how waiting is performed; see [`Sleeper`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after a 429 without a usable `Retry-After`
    pub rate_limit_fallback: Duration,
    /// Upper bound on any server-advised wait
    pub max_rate_limit_wait: Duration,
    /// Fixed wait after a transient failure
    pub transient_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rate_limit_fallback: Duration::from_secs(2),
            max_rate_limit_wait: Duration::from_secs(60),
            transient_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Wait before the next attempt
    pub fn backoff(&self, cause: RetryCause) -> Duration {
        match cause {
            RetryCause::RateLimited { advised } => advised
                .unwrap_or(self.rate_limit_fallback)
                .min(self.max_rate_limit_wait),
            RetryCause::Transient => self.transient_backoff,
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    pub fn can_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Suspends the calling worker. Swapped out in tests.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocking `std::thread::sleep`
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_uses_advice() {
        let policy = RetryPolicy::default();
        let wait = policy.backoff(RetryCause::RateLimited {
            advised: Some(Duration::from_secs(7)),
        });
        assert_eq!(wait, Duration::from_secs(7));
    }

    #[test]
    fn rate_limit_falls_back_to_two_seconds() {
        let policy = RetryPolicy::default();
        let wait = policy.backoff(RetryCause::RateLimited { advised: None });
        assert_eq!(wait, Duration::from_secs(2));
    }

    #[test]
    fn advised_wait_is_capped() {
        let policy = RetryPolicy::default();
        let wait = policy.backoff(RetryCause::RateLimited {
            advised: Some(Duration::from_secs(3600)),
        });
        assert_eq!(wait, Duration::from_secs(60));
    }

    #[test]
    fn transient_is_fixed() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(RetryCause::Transient), Duration::from_secs(2));
    }

    #[test]
    fn attempt_budget() {
        let policy = RetryPolicy::default().with_max_attempts(3);
        assert!(policy.can_retry_after(1));
        assert!(policy.can_retry_after(2));
        assert!(!policy.can_retry_after(3));
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::default().with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.can_retry_after(1));
    }
}
