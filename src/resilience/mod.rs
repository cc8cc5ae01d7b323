//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → circuit_breaker.rs allow() (fail fast while open)
//!     → proxy::forwarder (bounded by the per-service timeout)
//!     → outcome reported back: record_success / record_failure
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - The breaker prevents cascading failures; recovery is automatic
//! - State checks are short, non-blocking critical sections

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitRegistry, CircuitState, CircuitView, Decision};
