//! Security subsystem: credentials, revocation, rate limits, headers.

pub mod auth;
pub mod headers;
pub mod rate_limit;
pub mod revocation;

pub use auth::{AuthManager, Claims};
pub use rate_limit::{RateDecision, RateLimiter, RateRule};
pub use revocation::RevocationRegistry;
