//! Sliding-window request limiter shared by all workers.
//!
//! Uses `Mutex` from std; the lock is held only for window bookkeeping,
//! never while sleeping.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// `capacity` requests per trailing `window`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateWindow {
    pub capacity: usize,
    pub window: Duration,
}

impl RateWindow {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
        }
    }

    /// Even spacing that keeps a single caller within the budget (`W / R`)
    pub fn spacing(&self) -> Duration {
        self.window / u32::try_from(self.capacity).unwrap_or(u32::MAX)
    }
}

/// Guarantees that no more than `capacity` permits are granted inside any
/// trailing `window`, across all threads.
pub struct RateLimiter {
    limit: Option<RateWindow>,
    grants: Mutex<VecDeque<Instant>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(limit: RateWindow) -> Self {
        Self {
            limit: Some(limit),
            grants: Mutex::new(VecDeque::with_capacity(limit.capacity)),
        }
    }

    /// Limiter that never blocks (offline paths, tests)
    pub fn unlimited() -> Self {
        Self {
            limit: None,
            grants: Mutex::new(VecDeque::new()),
        }
    }

    pub fn limit(&self) -> Option<RateWindow> {
        self.limit
    }

    /// Delay applied between sequential calls made outside the worker pool
    pub fn request_delay(&self) -> Duration {
        self.limit.map_or(Duration::ZERO, |l| l.spacing())
    }

    /// Block until one request may be issued. Returns the instant the permit
    /// was recorded at.
    ///
    /// Each wait lasts at most one window, until the oldest grant expires; a
    /// caller that loses the race re-checks and waits again.
    pub fn acquire(&self) -> Instant {
        let Some(limit) = self.limit else {
            return Instant::now();
        };
        loop {
            let wait = {
                let mut grants = self.grants.lock().expect("rate limiter lock poisoned");
                let now = Instant::now();
                while grants
                    .front()
                    .is_some_and(|&t| now.duration_since(t) >= limit.window)
                {
                    grants.pop_front();
                }
                if grants.len() < limit.capacity {
                    grants.push_back(now);
                    return now;
                }
                let oldest = grants[0];
                limit.window.saturating_sub(now.duration_since(oldest))
            };
            log::trace!("rate window full, waiting {wait:?}");
            std::thread::sleep(wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn spacing_with_huge_capacity() {
        let rate = RateWindow::new(usize::MAX, Duration::from_secs(2));
        assert_eq!(rate.spacing(), Duration::from_secs(2) / u32::MAX);
    }

    /// Max number of instants falling inside any half-open interval of `window`
    fn max_in_window(mut times: Vec<Instant>, window: Duration) -> usize {
        times.sort();
        let mut best = 0;
        let mut lo = 0;
        for hi in 0..times.len() {
            while times[hi].duration_since(times[lo]) >= window {
                lo += 1;
            }
            best = best.max(hi - lo + 1);
        }
        best
    }

    #[test]
    fn spacing_is_window_over_capacity() {
        let w = RateWindow::new(20, Duration::from_secs(2));
        assert_eq!(w.spacing(), Duration::from_millis(100));
    }

    #[test]
    fn unlimited_never_blocks() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..10_000 {
            limiter.acquire();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(limiter.request_delay(), Duration::ZERO);
    }

    #[test]
    fn burst_up_to_capacity_then_waits() {
        let window = Duration::from_millis(150);
        let limiter = RateLimiter::new(RateWindow::new(3, window));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire();
        }
        assert!(start.elapsed() < window);
        limiter.acquire();
        assert!(start.elapsed() >= window);
    }

    #[test]
    fn concurrent_grants_respect_window() {
        let window = Duration::from_millis(100);
        let capacity = 4;
        let limiter = Arc::new(RateLimiter::new(RateWindow::new(capacity, window)));
        let times = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let limiter = limiter.clone();
                let times = times.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        let granted = limiter.acquire();
                        times.lock().unwrap().push(granted);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let times = Arc::try_unwrap(times).unwrap().into_inner().unwrap();
        assert_eq!(times.len(), 30);
        assert!(max_in_window(times, window) <= capacity);
    }
}
