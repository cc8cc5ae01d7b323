//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection limits).
    pub listener: ListenerConfig,

    /// Upstream business-service definitions.
    pub services: Vec<ServiceConfig>,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Bearer-token issuing and validation settings.
    pub auth: AuthConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Security hardening settings.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrently served requests; arrivals past the limit wait
    /// for a free slot.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// An upstream business service reachable through the gateway.
///
/// Requests to `/api/<name>/...` are forwarded to `url` with the original
/// path preserved.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique service identifier, also the routing prefix.
    pub name: String,

    /// Base URL of the upstream origin (e.g., "http://127.0.0.1:3001").
    pub url: String,

    /// Per-request timeout for calls to this upstream, in milliseconds.
    #[serde(default = "default_service_timeout_ms")]
    pub timeout_ms: u64,

    /// Require a valid bearer token for this service.
    #[serde(default = "default_true")]
    pub auth_required: bool,

    /// Restrict this service to callers with the admin role.
    #[serde(default)]
    pub admin_only: bool,

    /// Cache successful GET responses from this service.
    #[serde(default)]
    pub cache: bool,

    /// Cache TTL override in seconds; implies `cache = true` when set.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
}

fn default_service_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Time the circuit stays open before a recovery probe is allowed,
    /// in milliseconds.
    pub reset_timeout_ms: u64,

    /// Per-service overrides, keyed by service name.
    pub per_service: HashMap<String, CircuitBreakerOverride>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            per_service: HashMap::new(),
        }
    }
}

/// Partial circuit breaker settings for a single service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CircuitBreakerOverride {
    pub failure_threshold: Option<u32>,
    pub reset_timeout_ms: Option<u64>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Limit applied per client IP across all routes.
    pub global: RateRuleConfig,

    /// Limit applied per authenticated user (per IP when anonymous).
    pub per_user: RateRuleConfig,

    /// Endpoint-specific limits, keyed by method and path.
    pub endpoints: Vec<EndpointRuleConfig>,

    /// Interval between stale-window sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global: RateRuleConfig {
                window_ms: 60_000,
                max: 1_000,
            },
            per_user: RateRuleConfig {
                window_ms: 60_000,
                max: 300,
            },
            endpoints: Vec::new(),
            sweep_interval_secs: 300,
        }
    }
}

/// A single fixed-window rate rule.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RateRuleConfig {
    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Maximum requests allowed per window.
    pub max: u32,
}

/// A rate rule scoped to one endpoint (matched by method and exact path).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointRuleConfig {
    pub method: String,
    pub path: String,
    pub window_ms: u64,
    pub max: u32,
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching.
    pub enabled: bool,

    /// TTL for services that enable caching without an explicit TTL,
    /// in seconds.
    pub default_ttl_secs: u64,

    /// Interval between expired-entry sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 60,
            sweep_interval_secs: 30,
        }
    }
}

/// Bearer-token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for signing and verifying tokens.
    pub jwt_secret: String,

    /// Issued-token lifetime in seconds.
    pub token_ttl_secs: u64,

    /// Issuer claim stamped on issued tokens.
    pub issuer: String,

    /// Interval between revocation-registry sweeps, in seconds.
    pub revocation_sweep_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 3_600,
            issuer: "service-gateway".to_string(),
            revocation_sweep_secs: 60,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security response headers.
    pub enable_headers: bool,

    /// Maximum buffered body size in bytes (requests and upstream responses).
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
