//! In-process metrics collection.
//!
//! # Responsibilities
//! - Count requests by route and responses by status code
//! - Track latency, overall and per upstream service
//! - Count errors by kind and circuit trips by service
//! - Produce consistent point-in-time snapshots for the admin API
//!
//! # Design Decisions
//! - Self-contained: no exporter, no external metrics pipeline; the admin
//!   snapshot/reset endpoints are the only consumers
//! - One mutex guards the whole aggregate so a snapshot never observes a
//!   half-applied update; every recording operation is a short critical
//!   section with no I/O

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Latency aggregate for one upstream service.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceLatency {
    pub total_latency_ms: u64,
    pub samples: u64,
    pub average_latency_ms: f64,
}

/// Point-in-time view of the gateway's counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub requests_by_route: HashMap<String, u64>,
    pub total_latency_ms: u64,
    pub latency_samples: u64,
    pub average_latency_ms: f64,
    pub per_service_latency: HashMap<String, ServiceLatency>,
    pub status_codes: HashMap<u16, u64>,
    pub errors: HashMap<String, u64>,
    pub circuit_trips: HashMap<String, u64>,
}

#[derive(Debug, Default)]
struct Aggregate {
    total_requests: u64,
    requests_by_route: HashMap<String, u64>,
    total_latency_ms: u64,
    latency_samples: u64,
    per_service: HashMap<String, (u64, u64)>, // (total_ms, samples)
    status_codes: HashMap<u16, u64>,
    errors: HashMap<String, u64>,
    circuit_trips: HashMap<String, u64>,
}

/// Process-wide metrics collector, shared via `Arc`.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    inner: Mutex<Aggregate>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an inbound request.
    pub fn record_request(&self, method: &str, path: &str) {
        let mut inner = self.lock();
        inner.total_requests += 1;
        *inner
            .requests_by_route
            .entry(format!("{method} {path}"))
            .or_insert(0) += 1;
    }

    /// Record a latency sample; `service` attributes it to an upstream.
    pub fn record_latency(&self, ms: u64, service: Option<&str>) {
        let mut inner = self.lock();
        inner.total_latency_ms += ms;
        inner.latency_samples += 1;
        if let Some(service) = service {
            let entry = inner.per_service.entry(service.to_string()).or_insert((0, 0));
            entry.0 += ms;
            entry.1 += 1;
        }
    }

    /// Count a response status code.
    pub fn record_status(&self, code: u16) {
        let mut inner = self.lock();
        *inner.status_codes.entry(code).or_insert(0) += 1;
    }

    /// Count an error by kind, optionally scoped to a service.
    pub fn record_error(&self, kind: &str, service: Option<&str>) {
        let key = match service {
            Some(service) => format!("{kind}:{service}"),
            None => kind.to_string(),
        };
        let mut inner = self.lock();
        *inner.errors.entry(key).or_insert(0) += 1;
    }

    /// Count a circuit transition to open for a service.
    pub fn record_circuit_trip(&self, service: &str) {
        let mut inner = self.lock();
        *inner.circuit_trips.entry(service.to_string()).or_insert(0) += 1;
    }

    /// Consistent snapshot of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        let average = if inner.latency_samples > 0 {
            inner.total_latency_ms as f64 / inner.latency_samples as f64
        } else {
            0.0
        };
        MetricsSnapshot {
            total_requests: inner.total_requests,
            requests_by_route: inner.requests_by_route.clone(),
            total_latency_ms: inner.total_latency_ms,
            latency_samples: inner.latency_samples,
            average_latency_ms: average,
            per_service_latency: inner
                .per_service
                .iter()
                .map(|(name, (total, samples))| {
                    let avg = if *samples > 0 {
                        *total as f64 / *samples as f64
                    } else {
                        0.0
                    };
                    (
                        name.clone(),
                        ServiceLatency {
                            total_latency_ms: *total,
                            samples: *samples,
                            average_latency_ms: avg,
                        },
                    )
                })
                .collect(),
            status_codes: inner.status_codes.clone(),
            errors: inner.errors.clone(),
            circuit_trips: inner.circuit_trips.clone(),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = Aggregate::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Aggregate> {
        self.inner.lock().expect("metrics mutex poisoned")
    }
}
