//! Fixed-window rate limiting.
//!
//! # Responsibilities
//! - Bound request rate per key within a rolling window
//! - Support independent rules: global per-IP, per-user, per-endpoint+IP
//! - Compute a retry-after hint for rejected requests
//!
//! # Design Decisions
//! - Fixed window, not sliding log: O(1) memory and check cost per key.
//!   Bursts of up to 2x the configured rate are possible at window
//!   boundaries; accepted trade-off.
//! - One shared counter map; callers prefix keys with the rule scope so
//!   rules never collide
//! - Stale windows are dropped by a periodic sweep; counters themselves
//!   reset lazily on the first check after the window elapses

use dashmap::DashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::config::schema::RateRuleConfig;

/// A single fixed-window rule.
#[derive(Debug, Clone, Copy)]
pub struct RateRule {
    pub window: Duration,
    pub max: u32,
}

impl From<RateRuleConfig> for RateRule {
    fn from(config: RateRuleConfig) -> Self {
        Self {
            window: Duration::from_millis(config.window_ms),
            max: config.max,
        }
    }
}

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Rejected { retry_after: Duration },
}

#[derive(Debug)]
struct WindowCounter {
    count: u32,
    window_start: Instant,
}

/// Shared fixed-window limiter.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, WindowCounter>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and count one request for `key` under `rule`.
    pub fn check(&self, key: &str, rule: RateRule) -> RateDecision {
        let now = Instant::now();
        let mut counter = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowCounter {
                count: 0,
                window_start: now,
            });

        let elapsed = now.duration_since(counter.window_start);
        if elapsed >= rule.window {
            counter.count = 0;
            counter.window_start = now;
        }

        if counter.count < rule.max {
            counter.count += 1;
            RateDecision::Allowed
        } else {
            let retry_after = rule.window.saturating_sub(now.duration_since(counter.window_start));
            RateDecision::Rejected { retry_after }
        }
    }

    /// Drop windows that have been idle longer than `older_than`.
    pub fn sweep(&self, older_than: Duration) {
        self.windows
            .retain(|_, counter| counter.window_start.elapsed() < older_than);
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Key for the global per-client rule.
pub fn client_key(ip: IpAddr) -> String {
    format!("global:{ip}")
}

/// Key for the per-user rule, falling back to the client IP when anonymous.
pub fn user_key(user: Option<&str>, ip: IpAddr) -> String {
    match user {
        Some(user) => format!("user:{user}"),
        None => format!("user:anon:{ip}"),
    }
}

/// Key for an endpoint-specific rule.
pub fn endpoint_key(method: &str, path: &str, ip: IpAddr) -> String {
    format!("endpoint:{method}:{path}:{ip}")
}
