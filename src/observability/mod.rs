//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, correlation ID on every span)
//!     → metrics.rs (counters + latency aggregates)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Admin API (metrics snapshot / reset)
//! ```

pub mod logging;
pub mod metrics;

pub use metrics::{MetricsCollector, MetricsSnapshot};
