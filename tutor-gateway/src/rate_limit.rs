//! Per-address sliding-window rate limiter.
//!
//! Process-local and not persisted: a restart resets every window.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Length of the sliding window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Hits allowed per address within one window.
pub const DEFAULT_CAP: usize = 10;

/// Sliding-window limiter keyed by client address.
///
/// Only accepted hits are recorded, so a client hammering a closed window
/// does not extend its own lockout.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    cap: usize,
    hits: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_CAP)
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(window: Duration, cap: usize) -> Self {
        Self { window, cap, hits: Mutex::new(HashMap::new()) }
    }

    /// Check and record a hit for `addr` at the current instant.
    pub fn allow(&self, addr: IpAddr) -> bool {
        self.check_at(addr, Instant::now())
    }

    /// Check and record a hit for `addr` at `now`.
    ///
    /// Prune, count and append happen under one lock acquisition.
    ///
    /// # Panics
    /// Panics if the internal `Mutex` is poisoned.
    pub fn check_at(&self, addr: IpAddr, now: Instant) -> bool {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut hits = self.hits.lock().expect("rate limiter lock poisoned");
        let window = hits.entry(addr).or_default();

        while window.front().is_some_and(|t| now.saturating_duration_since(*t) >= self.window) {
            window.pop_front();
        }
        if window.len() >= self.cap {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Drop addresses whose every hit has left the window.
    ///
    /// # Panics
    /// Panics if the internal `Mutex` is poisoned.
    pub fn sweep_at(&self, now: Instant) -> usize {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut hits = self.hits.lock().expect("rate limiter lock poisoned");
        let before = hits.len();
        hits.retain(|_, window| {
            window.back().is_some_and(|t| now.saturating_duration_since(*t) < self.window)
        });
        before - hits.len()
    }

    /// Number of addresses currently tracked.
    ///
    /// # Panics
    /// Panics if the internal `Mutex` is poisoned.
    #[must_use]
    pub fn tracked(&self) -> usize {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let hits = self.hits.lock().expect("rate limiter lock poisoned");
        hits.len()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, last))
    }

    #[test]
    fn cap_hits_pass_then_reject() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        for i in 0..DEFAULT_CAP {
            assert!(limiter.check_at(ip(1), start), "hit {i} must pass");
        }
        assert!(!limiter.check_at(ip(1), start), "hit past the cap must be rejected");
    }

    #[test]
    fn window_slides_open_again() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        for _ in 0..DEFAULT_CAP {
            limiter.check_at(ip(1), start);
        }
        assert!(!limiter.check_at(ip(1), start + Duration::from_secs(59)));
        assert!(limiter.check_at(ip(1), start + DEFAULT_WINDOW));
    }

    #[test]
    fn rejected_attempts_are_not_recorded() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 2);
        let start = Instant::now();
        assert!(limiter.check_at(ip(1), start));
        assert!(limiter.check_at(ip(1), start + Duration::from_secs(5)));
        // Rejections at t=6..9 must not push the reopening past t=10.
        for s in 6..10 {
            assert!(!limiter.check_at(ip(1), start + Duration::from_secs(s)));
        }
        assert!(limiter.check_at(ip(1), start + Duration::from_secs(10)));
    }

    #[test]
    fn addresses_are_independent() {
        let limiter = RateLimiter::new(DEFAULT_WINDOW, 1);
        let now = Instant::now();
        assert!(limiter.check_at(ip(1), now));
        assert!(!limiter.check_at(ip(1), now));
        assert!(limiter.check_at(ip(2), now));
    }

    #[test]
    fn sweep_forgets_idle_addresses() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        limiter.check_at(ip(1), start);
        limiter.check_at(ip(2), start + Duration::from_secs(30));
        assert_eq!(limiter.sweep_at(start + DEFAULT_WINDOW), 1);
        assert_eq!(limiter.tracked(), 1);
    }

    proptest::proptest! {
        #[test]
        fn proptest_exactly_cap_calls_pass_within_window(
            cap in 1usize..20,
            calls in 1usize..60,
            window_secs in 1u64..120,
        ) {
            let limiter = RateLimiter::new(Duration::from_secs(window_secs), cap);
            let start = Instant::now();
            let passed = (0..calls)
                .filter(|_| limiter.check_at(ip(9), start))
                .count();
            proptest::prop_assert_eq!(passed, calls.min(cap));
            proptest::prop_assert!(
                limiter.check_at(ip(9), start + Duration::from_secs(window_secs)),
                "after a full window the address must be admitted again"
            );
        }
    }
}
