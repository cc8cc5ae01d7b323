//! Upstream forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline → forwarder.rs
//!     → circuit breaker allow() (fail fast while open)
//!     → hyper client call, bounded by the service timeout
//!     → outcome classified → breaker + metrics updated
//!     → buffered response returned for caching / replay
//! ```

pub mod forwarder;
pub mod registry;

pub use forwarder::{ProxiedResponse, ServiceProxy};
pub use registry::{Upstream, UpstreamRegistry};
