//! HTTP server setup and the gateway pipeline.
//!
//! # Responsibilities
//! - Create the Axum router and wire up the middleware stack
//! - Run the request pipeline: tag → meter → secure headers → global rate
//!   limit → authenticate → authorize → throttle → cache lookup →
//!   breaker-gated proxy → cache store → meter finish
//! - Spawn background sweeps (cache, rate windows, revocations)
//! - Serve with graceful shutdown
//!
//! # Design Decisions
//! - All shared stores (breaker registry, cache, limiter, revocations,
//!   metrics) are constructed once and injected through `AppState`; there
//!   are no process-wide singletons, so tests get isolated instances
//! - Cache lookup runs before the breaker: cached data stays servable
//!   while an upstream circuit is open
//! - Cross-cutting stages (tagging, metering, headers, the global limit)
//!   are tower layers; request-specific stages run in order inside the
//!   handler and short-circuit by returning a `GatewayError`

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::cache::{CachePolicy, CachedResponse, ResponseCache};
use crate::config::loader::ConfigError;
use crate::config::validation::validate_config;
use crate::config::GatewayConfig;
use crate::http::correlation::{CorrelationId, CorrelationLayer};
use crate::http::error::GatewayError;
use crate::http::session;
use crate::lifecycle::Shutdown;
use crate::observability::MetricsCollector;
use crate::proxy::forwarder::forwardable_headers;
use crate::proxy::{ServiceProxy, Upstream, UpstreamRegistry};
use crate::resilience::CircuitRegistry;
use crate::security::rate_limit::{self, RateDecision, RateLimiter, RateRule};
use crate::security::{auth, AuthManager, RevocationRegistry};

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub upstreams: Arc<UpstreamRegistry>,
    pub proxy: Arc<ServiceProxy>,
    pub circuits: Arc<CircuitRegistry>,
    pub cache: Arc<ResponseCache>,
    pub cache_policy: CachePolicy,
    pub limiter: Arc<RateLimiter>,
    pub auth: Arc<AuthManager>,
    pub revocations: Arc<RevocationRegistry>,
    pub metrics: Arc<MetricsCollector>,
}

/// The authenticated caller, derived from a verified bearer token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub sub: String,
    pub role: String,
    pub jti: String,
    pub exp: u64,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    /// Build the server and all its stores from a validated configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let upstreams = Arc::new(
            UpstreamRegistry::from_config(&config.services, &config.cache)
                .map_err(ConfigError::Validation)?,
        );
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let circuits = Arc::new(CircuitRegistry::from_config(&config.circuit_breaker));
        let metrics = Arc::new(MetricsCollector::new());
        let proxy = Arc::new(ServiceProxy::new(
            client,
            circuits.clone(),
            metrics.clone(),
            config.security.max_body_size,
        ));
        let auth = Arc::new(AuthManager::new(&config.auth));

        let state = AppState {
            config: Arc::new(config),
            upstreams,
            proxy,
            circuits,
            cache: Arc::new(ResponseCache::new()),
            cache_policy: CachePolicy::default(),
            limiter: Arc::new(RateLimiter::new()),
            auth,
            revocations: Arc::new(RevocationRegistry::new()),
            metrics,
        };

        let router = Self::build_router(&state);
        Ok(Self { router, state })
    }

    /// Build the Axum router with the full middleware stack.
    fn build_router(state: &AppState) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/auth/login", post(session::login))
            .route("/auth/logout", post(session::logout))
            .route("/api/{service}", any(gateway_handler))
            .route("/api/{service}/{*path}", any(gateway_handler))
            .with_state(state.clone());

        if state.config.admin.enabled {
            router = router.merge(admin::router(state.clone()));
        }
        if state.config.rate_limit.enabled {
            router = router.layer(middleware::from_fn_with_state(
                state.clone(),
                global_rate_limit_middleware,
            ));
        }
        if state.config.security.enable_headers {
            router = crate::security::headers::apply(router);
        }
        router
            .layer(middleware::from_fn_with_state(state.clone(), meter_middleware))
            .layer(CorrelationLayer)
            .layer(TraceLayer::new_for_http())
            // Backpressure: one shared semaphore bounds in-flight requests;
            // callers past the limit wait for a slot rather than failing.
            .layer(GlobalConcurrencyLimitLayer::new(
                state.config.listener.max_connections,
            ))
    }

    /// Shared state, exposed for the admin API and tests.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            services = self.state.upstreams.len(),
            max_connections = self.state.config.listener.max_connections,
            "gateway starting"
        );

        spawn_sweepers(&self.state, &shutdown);

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        let mut rx = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
            })
            .await?;

        tracing::info!("gateway stopped");
        Ok(())
    }
}

/// Spawn the background expiry sweeps, decoupled from request handling.
fn spawn_sweepers(state: &AppState, shutdown: &Shutdown) {
    if state.config.cache.enabled {
        let cache = state.cache.clone();
        let period = Duration::from_secs(state.config.cache.sweep_interval_secs.max(1));
        let mut rx = shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => cache.sweep(),
                    _ = rx.recv() => break,
                }
            }
        });
    }

    if state.config.rate_limit.enabled {
        let limiter = state.limiter.clone();
        let period = Duration::from_secs(state.config.rate_limit.sweep_interval_secs.max(1));
        let retention = {
            let rl = &state.config.rate_limit;
            let mut max_ms = rl.global.window_ms.max(rl.per_user.window_ms);
            for rule in &rl.endpoints {
                max_ms = max_ms.max(rule.window_ms);
            }
            Duration::from_millis(max_ms.saturating_mul(2).max(60_000))
        };
        let mut rx = shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => limiter.sweep(retention),
                    _ = rx.recv() => break,
                }
            }
        });
    }

    let revocations = state.revocations.clone();
    let period = Duration::from_secs(state.config.auth.revocation_sweep_secs.max(1));
    let mut rx = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => revocations.sweep(),
                _ = rx.recv() => break,
            }
        }
    });
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Meter stage: counts the request and, once the response exists, its
/// status and overall latency.
async fn meter_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    state.metrics.record_request(&method, &path);

    let response = next.run(req).await;

    state.metrics.record_status(response.status().as_u16());
    state
        .metrics
        .record_latency(started.elapsed().as_millis() as u64, None);
    response
}

/// Global per-client rate limit, applied before authentication.
async fn global_rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let rule: RateRule = state.config.rate_limit.global.into();
    let key = rate_limit::client_key(addr.ip());
    match state.limiter.check(&key, rule) {
        RateDecision::Allowed => next.run(req).await,
        RateDecision::Rejected { retry_after } => {
            let correlation = req
                .extensions()
                .get::<CorrelationId>()
                .cloned()
                .unwrap_or_else(CorrelationId::generate);
            tracing::warn!(
                client = %addr.ip(),
                correlation_id = %correlation,
                "global rate limit exceeded"
            );
            state.metrics.record_error("rate_limited", None);
            GatewayError::RateLimited {
                retry_after_secs: retry_after_secs(retry_after),
            }
            .into_response(correlation.as_str())
        }
    }
}

/// Main gateway handler for `/api/{service}/...`.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
) -> Response {
    let correlation = req
        .extensions()
        .get::<CorrelationId>()
        .cloned()
        .unwrap_or_else(CorrelationId::generate);

    match run_pipeline(&state, addr, req, &correlation).await {
        Ok(response) => response,
        Err(err) => {
            state.metrics.record_error(err.code(), err.service());
            err.into_response(correlation.as_str())
        }
    }
}

/// The request-specific pipeline stages, in order. Any stage may
/// short-circuit by returning an error.
async fn run_pipeline(
    state: &AppState,
    addr: SocketAddr,
    req: Request<Body>,
    correlation: &CorrelationId,
) -> Result<Response, GatewayError> {
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let uri = parts.uri.clone();
    let path = uri.path().to_string();

    // Resolve the upstream from the path: /api/<service>/...
    let service_name = path
        .strip_prefix("/api/")
        .and_then(|rest| rest.split('/').next())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::UnknownService(path.clone()))?;
    let upstream = state
        .upstreams
        .get(service_name)
        .ok_or_else(|| GatewayError::UnknownService(service_name.to_string()))?;

    // Authenticate. Anonymous-allowed routes still pick up a valid token
    // when one is presented, for per-user limits and cache scoping.
    let auth_ctx = if upstream.auth_required || upstream.admin_only {
        Some(authenticate(state, &parts.headers)?)
    } else {
        authenticate(state, &parts.headers).ok()
    };

    // Authorize.
    if upstream.admin_only {
        let ctx = auth_ctx
            .as_ref()
            .ok_or(GatewayError::Unauthenticated("credentials required"))?;
        if ctx.role != "admin" {
            tracing::warn!(
                correlation_id = %correlation,
                user = %ctx.sub,
                service = %upstream.name,
                "rejected non-admin access to admin-only service"
            );
            return Err(GatewayError::Forbidden);
        }
    }

    // Per-user and endpoint throttles; every applicable rule must pass.
    if state.config.rate_limit.enabled {
        let user = auth_ctx.as_ref().map(|ctx| ctx.sub.as_str());
        throttle(
            state,
            &rate_limit::user_key(user, addr.ip()),
            state.config.rate_limit.per_user.into(),
        )?;
        for rule in &state.config.rate_limit.endpoints {
            if rule.method.eq_ignore_ascii_case(method.as_str()) && rule.path == path {
                throttle(
                    state,
                    &rate_limit::endpoint_key(method.as_str(), &path, addr.ip()),
                    RateRule {
                        window: Duration::from_millis(rule.window_ms),
                        max: rule.max,
                    },
                )?;
            }
        }
    }

    // Cache lookup; a hit never touches the proxy or the breaker.
    let cache_key = cache_key_for(state, &upstream, &method, &uri, auth_ctx.as_ref());
    if let Some(key) = &cache_key {
        if let Some(hit) = state.cache.get(key) {
            tracing::debug!(correlation_id = %correlation, key = %key, "cache hit");
            return Ok(build_response(hit.status, hit.headers, hit.body, Some("HIT")));
        }
    }

    // Forward through the breaker-gated proxy.
    let body = axum::body::to_bytes(body, state.config.security.max_body_size)
        .await
        .map_err(|_| GatewayError::BadRequest("request body too large or unreadable"))?;
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(&path);
    let proxied = state
        .proxy
        .forward(
            &upstream,
            method,
            path_and_query,
            &parts.headers,
            body,
            correlation.as_str(),
        )
        .await?;

    // Cache store, then reply.
    let headers = forwardable_headers(&proxied.headers);
    if let Some(key) = &cache_key {
        if proxied.status.is_success() {
            if let Some(ttl) = upstream.cache_ttl {
                state.cache.set(
                    key,
                    CachedResponse {
                        status: proxied.status,
                        headers: headers.clone(),
                        body: proxied.body.clone(),
                    },
                    ttl,
                );
            }
        }
        return Ok(build_response(proxied.status, headers, proxied.body, Some("MISS")));
    }
    Ok(build_response(proxied.status, headers, proxied.body, None))
}

/// Verify the bearer token and consult the revocation registry.
pub(crate) fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthContext, GatewayError> {
    let token = auth::bearer_token(headers)
        .ok_or(GatewayError::Unauthenticated("missing bearer token"))?;
    let claims = state
        .auth
        .verify(token)
        .map_err(|err| GatewayError::Unauthenticated(err.reason()))?;
    if state.revocations.is_revoked(&claims.jti) {
        return Err(GatewayError::Unauthenticated("token revoked"));
    }
    Ok(AuthContext {
        sub: claims.sub,
        role: claims.role,
        jti: claims.jti,
        exp: claims.exp,
    })
}

fn throttle(state: &AppState, key: &str, rule: RateRule) -> Result<(), GatewayError> {
    match state.limiter.check(key, rule) {
        RateDecision::Allowed => Ok(()),
        RateDecision::Rejected { retry_after } => Err(GatewayError::RateLimited {
            retry_after_secs: retry_after_secs(retry_after),
        }),
    }
}

fn retry_after_secs(retry_after: Duration) -> u64 {
    (retry_after.as_millis().div_ceil(1000) as u64).max(1)
}

/// Cache key when this request is cache-eligible, `None` otherwise.
fn cache_key_for(
    state: &AppState,
    upstream: &Upstream,
    method: &axum::http::Method,
    uri: &axum::http::Uri,
    auth_ctx: Option<&AuthContext>,
) -> Option<String> {
    if !state.config.cache.enabled || upstream.cache_ttl.is_none() {
        return None;
    }
    if !(state.cache_policy.is_cacheable)(method) {
        return None;
    }
    // Scope by subject whenever the caller authenticated, even on
    // anonymous-allowed routes: the credential is forwarded upstream, so
    // the response may be personalized.
    let user = auth_ctx.map(|ctx| ctx.sub.as_str());
    Some((state.cache_policy.key_for)(method, uri, user))
}

fn build_response(
    status: axum::http::StatusCode,
    headers: HeaderMap,
    body: bytes::Bytes,
    cache_marker: Option<&'static str>,
) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    if let Some(marker) = cache_marker {
        response.headers_mut().insert(
            HeaderName::from_static("x-cache"),
            HeaderValue::from_static(marker),
        );
    }
    response
}
