//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: upstream assumed down, requests fail fast
//! - Half-Open: testing if the upstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: after reset timeout, first caller claims the probe
//! Half-Open → Closed: probe request succeeds
//! Half-Open → Open: probe request fails (timeout window restarts)
//! ```
//!
//! # Design Decisions
//! - Per-service breakers owned by an injected registry (no globals)
//! - Fail fast in Open state: rejection happens before any network call
//! - Single probe in Half-Open, arbitrated by compare-and-set on an atomic
//!   flag so no lock is ever held across the upstream call
//! - 4xx responses never count as failures; classification is the caller's
//!   job (connection errors, timeouts, and 5xx feed `record_failure`)

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::schema::CircuitBreakerConfig;

/// Verdict for a single call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Circuit is closed; proceed normally.
    Proceed,
    /// Circuit is half-open and this caller holds the single probe slot.
    ProceedAsProbe,
    /// Circuit is open; fail fast without a network attempt.
    Reject,
}

/// Breaker state, exposed for the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Effective settings for one breaker.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(30_000),
        }
    }
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// Health gate for a single upstream service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    core: Mutex<BreakerCore>,
    probe_in_flight: AtomicBool,
    settings: BreakerSettings,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            service: service.into(),
            core: Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
            }),
            probe_in_flight: AtomicBool::new(false),
            settings,
        }
    }

    /// Decide whether a call to this service may proceed.
    pub fn allow(&self) -> Decision {
        let mut core = self.lock();
        match core.state {
            CircuitState::Closed => Decision::Proceed,
            CircuitState::Open => {
                let cooled_down = core
                    .last_failure
                    .map(|at| at.elapsed() > self.settings.reset_timeout)
                    .unwrap_or(true);
                if cooled_down && self.claim_probe() {
                    core.state = CircuitState::HalfOpen;
                    tracing::info!(service = %self.service, "circuit half-open, probing upstream");
                    Decision::ProceedAsProbe
                } else {
                    Decision::Reject
                }
            }
            CircuitState::HalfOpen => {
                if self.claim_probe() {
                    Decision::ProceedAsProbe
                } else {
                    Decision::Reject
                }
            }
        }
    }

    /// Report a successful call (any response below 500).
    pub fn record_success(&self) {
        let mut core = self.lock();
        match core.state {
            CircuitState::HalfOpen => {
                core.state = CircuitState::Closed;
                core.consecutive_failures = 0;
                self.release_probe();
                tracing::info!(service = %self.service, "probe succeeded, circuit closed");
            }
            CircuitState::Closed => core.consecutive_failures = 0,
            // A straggler from before the trip; the probe decides recovery.
            CircuitState::Open => {}
        }
    }

    /// Report a failed call (connection error, timeout, or 5xx).
    ///
    /// Returns `true` when this failure tripped the circuit open.
    pub fn record_failure(&self) -> bool {
        let mut core = self.lock();
        match core.state {
            CircuitState::HalfOpen => {
                core.state = CircuitState::Open;
                core.last_failure = Some(Instant::now());
                self.release_probe();
                tracing::warn!(service = %self.service, "probe failed, circuit reopened");
                true
            }
            CircuitState::Closed => {
                core.consecutive_failures += 1;
                if core.consecutive_failures >= self.settings.failure_threshold {
                    core.state = CircuitState::Open;
                    core.last_failure = Some(Instant::now());
                    tracing::warn!(
                        service = %self.service,
                        failures = core.consecutive_failures,
                        "failure threshold reached, circuit opened"
                    );
                    true
                } else {
                    false
                }
            }
            CircuitState::Open => false,
        }
    }

    /// Release the probe slot without recording an outcome.
    ///
    /// Used when a probe request is dropped mid-flight (client disconnect)
    /// so the breaker does not reject probes forever.
    pub fn release_probe(&self) {
        self.probe_in_flight.store(false, Ordering::Release);
    }

    /// Current state and failure count, for the admin API.
    pub fn view(&self) -> CircuitView {
        let core = self.lock();
        CircuitView {
            service: self.service.clone(),
            state: core.state,
            consecutive_failures: core.consecutive_failures,
        }
    }

    fn claim_probe(&self) -> bool {
        self.probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerCore> {
        self.core.lock().expect("circuit breaker mutex poisoned")
    }
}

/// Admin-facing view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitView {
    pub service: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Owns one breaker per upstream service.
///
/// Breakers are created lazily on first use with the global settings,
/// unless the configuration carries a per-service override.
#[derive(Debug, Default)]
pub struct CircuitRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: BreakerSettings,
    overrides: DashMap<String, BreakerSettings>,
}

impl CircuitRegistry {
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        let defaults = BreakerSettings {
            failure_threshold: config.failure_threshold,
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
        };
        let overrides = DashMap::new();
        for (service, over) in &config.per_service {
            overrides.insert(
                service.clone(),
                BreakerSettings {
                    failure_threshold: over.failure_threshold.unwrap_or(defaults.failure_threshold),
                    reset_timeout: over
                        .reset_timeout_ms
                        .map(Duration::from_millis)
                        .unwrap_or(defaults.reset_timeout),
                },
            );
        }
        Self {
            breakers: DashMap::new(),
            defaults,
            overrides,
        }
    }

    /// Breaker for a service, creating it on first use.
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                let settings = self
                    .overrides
                    .get(service)
                    .map(|s| *s)
                    .unwrap_or(self.defaults);
                Arc::new(CircuitBreaker::new(service, settings))
            })
            .clone()
    }

    /// Views of every breaker created so far.
    pub fn views(&self) -> Vec<CircuitView> {
        let mut views: Vec<_> = self.breakers.iter().map(|b| b.view()).collect();
        views.sort_by(|a, b| a.service.cmp(&b.service));
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "orders",
            BreakerSettings {
                failure_threshold: threshold,
                reset_timeout: Duration::from_millis(reset_ms),
            },
        )
    }

    #[test]
    fn trips_at_exact_threshold() {
        let cb = breaker(3, 10_000);
        assert!(!cb.record_failure());
        assert!(!cb.record_failure());
        assert_eq!(cb.allow(), Decision::Proceed);
        assert!(cb.record_failure());
        assert_eq!(cb.view().state, CircuitState::Open);
        assert_eq!(cb.allow(), Decision::Reject);
    }

    #[test]
    fn success_resets_failure_count_while_closed() {
        let cb = breaker(3, 10_000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.view().state, CircuitState::Closed);
        assert!(cb.record_failure());
    }

    #[test]
    fn single_probe_after_reset_timeout() {
        let cb = breaker(1, 50);
        cb.record_failure();
        assert_eq!(cb.allow(), Decision::Reject);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.allow(), Decision::ProceedAsProbe);
        // Second caller while the probe is in flight.
        assert_eq!(cb.allow(), Decision::Reject);
    }

    #[test]
    fn successful_probe_closes_circuit() {
        let cb = breaker(1, 50);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.allow(), Decision::ProceedAsProbe);
        cb.record_success();

        let view = cb.view();
        assert_eq!(view.state, CircuitState::Closed);
        assert_eq!(view.consecutive_failures, 0);
        assert_eq!(cb.allow(), Decision::Proceed);
    }

    #[test]
    fn failed_probe_reopens_and_restarts_window() {
        let cb = breaker(1, 50);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.allow(), Decision::ProceedAsProbe);
        assert!(cb.record_failure());
        assert_eq!(cb.view().state, CircuitState::Open);
        // Window restarted: still rejecting right after the failed probe.
        assert_eq!(cb.allow(), Decision::Reject);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.allow(), Decision::ProceedAsProbe);
    }

    #[test]
    fn released_probe_can_be_reclaimed() {
        let cb = breaker(1, 50);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.allow(), Decision::ProceedAsProbe);
        // Probe dropped without an outcome (client disconnected).
        cb.release_probe();
        assert_eq!(cb.allow(), Decision::ProceedAsProbe);
    }

    #[test]
    fn registry_applies_per_service_override() {
        let mut config = CircuitBreakerConfig::default();
        config.per_service.insert(
            "orders".to_string(),
            crate::config::schema::CircuitBreakerOverride {
                failure_threshold: Some(2),
                reset_timeout_ms: None,
            },
        );
        let registry = CircuitRegistry::from_config(&config);

        let orders = registry.breaker("orders");
        orders.record_failure();
        assert!(orders.record_failure());

        let crm = registry.breaker("crm");
        crm.record_failure();
        crm.record_failure();
        assert_eq!(crm.view().state, CircuitState::Closed);
    }

    #[test]
    fn registry_returns_same_breaker_per_service() {
        let registry = CircuitRegistry::from_config(&CircuitBreakerConfig::default());
        let a = registry.breaker("orders");
        let b = registry.breaker("orders");
        a.record_failure();
        assert_eq!(b.view().consecutive_failures, 1);
    }
}
