//! Response caching subsystem.

pub mod response_cache;

pub use response_cache::{CachePolicy, CachedResponse, ResponseCache};
