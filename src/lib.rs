//! Resilient API gateway core.
//!
//! A single entry point in front of a fleet of HTTP services. Every
//! request is tagged with a correlation ID, metered, rate limited,
//! authenticated, optionally served from cache, and forwarded through a
//! per-service circuit breaker.
//!
//! # Architecture
//! ```text
//! client
//!   → http::server (router + middleware stack)
//!       → security (auth, revocation, rate limits, headers)
//!       → cache (TTL response cache)
//!       → proxy (upstream registry + forwarder)
//!           → resilience (circuit breakers)
//!       → observability (correlation-aware logs, metrics)
//!   ← response
//! ```

pub mod admin;
pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod resilience;
pub mod security;

pub use config::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
