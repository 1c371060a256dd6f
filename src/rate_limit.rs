//! Fixed-window rate limiter (C6, spec §4.6), keyed by client IP.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { max_requests: 100, window: Duration::from_secs(60) }
    }
}

#[derive(Debug, Clone, Copy)]
struct RateEntry {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Outcome of `check(key)`: whether the call is admitted, how many remain
/// in the window, and when the window resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: DashMap<String, RateEntry>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self { config, entries: DashMap::new() }
    }

    /// Atomic with respect to other `check`s on the same key (spec §5):
    /// `DashMap`'s sharded locking serializes the read-modify-write per
    /// shard, and we hold the entry for the whole decision.
    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Utc::now())
    }

    fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateDecision {
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| RateEntry {
            count: 0,
            reset_at: now - chrono::Duration::seconds(1),
        });

        if now > entry.reset_at {
            entry.count = 1;
            entry.reset_at = now + chrono::Duration::milliseconds(self.config.window.as_millis() as i64);
            return RateDecision {
                allowed: true,
                limit: self.config.max_requests,
                remaining: self.config.max_requests.saturating_sub(1),
                reset_at: entry.reset_at,
            };
        }

        if entry.count >= self.config.max_requests {
            return RateDecision { allowed: false, limit: self.config.max_requests, remaining: 0, reset_at: entry.reset_at };
        }

        entry.count += 1;
        RateDecision {
            allowed: true,
            limit: self.config.max_requests,
            remaining: self.config.max_requests.saturating_sub(entry.count),
            reset_at: entry.reset_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig { max_requests: max, window: Duration::from_millis(window_ms) })
    }

    #[test]
    fn admits_up_to_max_then_rejects() {
        let limiter = limiter(3, 60_000);
        let now = Utc::now();

        assert!(limiter.check_at("1.2.3.4", now).allowed);
        assert!(limiter.check_at("1.2.3.4", now).allowed);
        assert!(limiter.check_at("1.2.3.4", now).allowed);

        let rejected = limiter.check_at("1.2.3.4", now);
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
    }

    #[test]
    fn remaining_counts_down_correctly() {
        let limiter = limiter(2, 60_000);
        let now = Utc::now();

        let first = limiter.check_at("k", now);
        assert_eq!(first.remaining, 1);
        let second = limiter.check_at("k", now);
        assert_eq!(second.remaining, 0);
    }

    #[test]
    fn resets_after_window_elapses() {
        let limiter = limiter(1, 1_000);
        let start = Utc::now();

        assert!(limiter.check_at("k", start).allowed);
        assert!(!limiter.check_at("k", start).allowed);

        let after_window = start + chrono::Duration::milliseconds(1_001);
        let decision = limiter.check_at("k", after_window);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn different_keys_are_independent() {
        let limiter = limiter(1, 60_000);
        let now = Utc::now();

        assert!(limiter.check_at("a", now).allowed);
        assert!(limiter.check_at("b", now).allowed);
        assert!(!limiter.check_at("a", now).allowed);
    }
}
