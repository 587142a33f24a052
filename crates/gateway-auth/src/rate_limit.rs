//! Sliding-window rate limiting, keyed by peer IP or composite client id.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Outcome of [`RateLimiter::account`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOutcome {
    /// The request is within the configured window.
    Ok,
    /// The client has exceeded `rate_limit_max` requests in the window.
    Throttled,
}

/// Per-client sliding window of recent request timestamps.
///
/// Entries are created lazily on first use and purged once their window
/// empties out.
pub struct RateLimiter {
    window: Duration,
    max: u32,
    windows: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max` requests per `window`.
    #[must_use]
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            window,
            max,
            windows: DashMap::new(),
        }
    }

    /// Record a request for `key` at the current time, returning whether it
    /// falls within the sliding window.
    pub fn account(&self, key: &str) -> RateOutcome {
        self.account_at(key, Instant::now())
    }

    fn account_at(&self, key: &str, now: Instant) -> RateOutcome {
        let mut entry = self.windows.entry(key.to_string()).or_default();
        purge(&mut entry, self.window, now);

        if entry.len() as u32 >= self.max {
            return RateOutcome::Throttled;
        }

        entry.push_back(now);
        RateOutcome::Ok
    }

    /// Current request count for `key` within the window, without recording
    /// a new request.
    #[must_use]
    pub fn current_count(&self, key: &str) -> u32 {
        let now = Instant::now();
        self.windows
            .get(key)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|&&t| now.duration_since(t) <= self.window)
                    .count() as u32
            })
            .unwrap_or(0)
    }

    /// Evict windows that have gone fully idle. Run periodically by the
    /// background sweeper; failure here must never affect `account`.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.windows.retain(|_, entries| {
            purge(entries, self.window, now);
            !entries.is_empty()
        });
    }

    /// Number of tracked client keys, for health/metrics reporting.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

fn purge(entries: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while let Some(&oldest) = entries.front() {
        if now.duration_since(oldest) > window {
            entries.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_requests() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 5);
        for _ in 0..5 {
            assert_eq!(limiter.account("1.2.3.4"), RateOutcome::Ok);
        }
        assert_eq!(limiter.account("1.2.3.4"), RateOutcome::Throttled);
    }

    #[test]
    fn independent_keys_have_independent_windows() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert_eq!(limiter.account("a"), RateOutcome::Ok);
        assert_eq!(limiter.account("b"), RateOutcome::Ok);
        assert_eq!(limiter.account("a"), RateOutcome::Throttled);
        assert_eq!(limiter.account("b"), RateOutcome::Throttled);
    }

    #[test]
    fn window_slides_with_time() {
        let limiter = RateLimiter::new(Duration::from_millis(50), 1);
        assert_eq!(limiter.account_at("a", Instant::now()), RateOutcome::Ok);
        let later = Instant::now() + Duration::from_millis(100);
        assert_eq!(limiter.account_at("a", later), RateOutcome::Ok);
    }

    #[test]
    fn sweep_removes_empty_entries() {
        let limiter = RateLimiter::new(Duration::from_millis(10), 10);
        limiter.account("a");
        assert_eq!(limiter.tracked_clients(), 1);
        std::thread::sleep(Duration::from_millis(20));
        limiter.sweep();
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn monotone_within_window() {
        // Once a denial happens at time t, every earlier time in the same
        // window would also have denied.
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);
        let t0 = Instant::now();
        assert_eq!(limiter.account_at("a", t0), RateOutcome::Ok);
        assert_eq!(
            limiter.account_at("a", t0 + Duration::from_millis(1)),
            RateOutcome::Ok
        );
        assert_eq!(
            limiter.account_at("a", t0 + Duration::from_millis(2)),
            RateOutcome::Throttled
        );
    }
}
