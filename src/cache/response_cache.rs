//! TTL response cache for idempotent reads.
//!
//! # Responsibilities
//! - Memoize successful (2xx) responses for a bounded time
//! - Serve hits without touching the proxy or the circuit breaker, so
//!   cached data stays available while an upstream circuit is open
//! - Enforce expiry both lazily on read and by a periodic sweep
//!
//! # Design Decisions
//! - Key derivation and cacheability are pluggable; the defaults cache GET
//!   only and scope the key by query string and authenticated user to
//!   prevent cross-user leakage
//! - Entries hold buffered bodies; the pipeline already buffers responses
//!   for forwarding, so storage is a cheap clone of `Bytes`

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A captured response ready for replay.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug)]
struct CacheEntry {
    response: CachedResponse,
    expires_at: Instant,
}

/// Concurrent TTL cache, shared via `Arc`.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a fresh entry; an expired one counts as a miss and is
    /// removed immediately.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if now < entry.expires_at {
                return Some(entry.response.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| now >= entry.expires_at);
        None
    }

    /// Store a response. Only 2xx responses are eligible; anything else is
    /// silently ignored.
    pub fn set(&self, key: &str, response: CachedResponse, ttl: Duration) {
        if !response.status.is_success() {
            return;
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                response,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove a single key.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every entry.
    pub fn clear(&self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Currently stored keys, for the admin API.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries that were never read again.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| now < entry.expires_at);
    }
}

type CacheablePredicate = dyn Fn(&Method) -> bool + Send + Sync;
type KeyFn = dyn Fn(&Method, &Uri, Option<&str>) -> String + Send + Sync;

/// Pluggable cacheability and key-derivation policy.
#[derive(Clone)]
pub struct CachePolicy {
    pub is_cacheable: Arc<CacheablePredicate>,
    pub key_for: Arc<KeyFn>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            is_cacheable: Arc::new(|method| method == Method::GET),
            key_for: Arc::new(|method, uri, user| {
                let path_and_query = uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or_else(|| uri.path());
                match user {
                    Some(user) => format!("{method}:{path_and_query}|user:{user}"),
                    None => format!("{method}:{path_and_query}"),
                }
            }),
        }
    }
}
