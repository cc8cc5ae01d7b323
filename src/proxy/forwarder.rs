//! Request forwarding to upstream services.
//!
//! # Responsibilities
//! - Consult the circuit breaker before any network attempt
//! - Forward method, headers, query, and body to the upstream origin,
//!   bounded by the per-service timeout
//! - Classify outcomes and report them back to the breaker
//! - Record per-service latency for every outcome
//!
//! # Failure classification
//! - connection refused / unreachable → unavailable, counts as failure
//! - deadline exceeded → timeout, counts as failure
//! - 5xx → counts as failure, but the upstream response is still
//!   propagated to the caller
//! - anything below 500 → success (4xx is the caller's error, not the
//!   upstream's)

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Uri};
use bytes::Bytes;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use std::sync::Arc;
use std::time::Instant;

use crate::http::correlation::CORRELATION_HEADER;
use crate::http::error::GatewayError;
use crate::observability::MetricsCollector;
use crate::proxy::registry::Upstream;
use crate::resilience::circuit_breaker::{CircuitBreaker, Decision};
use crate::resilience::CircuitRegistry;

/// Hop-by-hop headers that must not be forwarded in either direction.
fn is_hop_by_hop(name: &header::HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Copy `from` into a fresh header map, dropping hop-by-hop headers plus
/// host and content-length (both derived from the rebuilt request).
pub fn forwardable_headers(from: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in from.iter() {
        if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        headers.insert(name.clone(), value.clone());
    }
    headers
}

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    pub status: axum::http::StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Clears the breaker's probe slot if the forwarding future is dropped
/// before an outcome was recorded (client disconnect mid-probe).
struct ProbeGuard {
    breaker: Arc<CircuitBreaker>,
    armed: bool,
}

impl ProbeGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}

/// Forwards requests to upstream origins and keeps their breakers honest.
pub struct ServiceProxy {
    client: Client<HttpConnector, Body>,
    circuits: Arc<CircuitRegistry>,
    metrics: Arc<MetricsCollector>,
    max_body_size: usize,
}

impl ServiceProxy {
    pub fn new(
        client: Client<HttpConnector, Body>,
        circuits: Arc<CircuitRegistry>,
        metrics: Arc<MetricsCollector>,
        max_body_size: usize,
    ) -> Self {
        Self {
            client,
            circuits,
            metrics,
            max_body_size,
        }
    }

    /// Forward one request to `upstream`.
    ///
    /// `path_and_query` is the original request path (and query string),
    /// appended to the upstream's base URL unchanged.
    pub async fn forward(
        &self,
        upstream: &Upstream,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
        correlation_id: &str,
    ) -> Result<ProxiedResponse, GatewayError> {
        let breaker = self.circuits.breaker(&upstream.name);
        let mut probe_guard = match breaker.allow() {
            Decision::Reject => {
                tracing::warn!(
                    correlation_id,
                    service = %upstream.name,
                    "circuit open, rejecting without network attempt"
                );
                return Err(GatewayError::CircuitOpen {
                    service: upstream.name.clone(),
                });
            }
            Decision::ProceedAsProbe => Some(ProbeGuard {
                breaker: breaker.clone(),
                armed: true,
            }),
            Decision::Proceed => None,
        };

        let request = self.build_request(upstream, method, path_and_query, headers, body, correlation_id)?;

        let started = Instant::now();
        let attempt = async {
            let response = self.client.request(request).await.map_err(|err| {
                tracing::warn!(
                    correlation_id,
                    service = %upstream.name,
                    error = %err,
                    "upstream unreachable"
                );
                GatewayError::UpstreamUnavailable {
                    service: upstream.name.clone(),
                }
            })?;

            let status = response.status();
            let (parts, incoming) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(incoming), self.max_body_size)
                .await
                .map_err(|err| {
                    tracing::warn!(
                        correlation_id,
                        service = %upstream.name,
                        error = %err,
                        "failed to read upstream response body"
                    );
                    GatewayError::UpstreamUnavailable {
                        service: upstream.name.clone(),
                    }
                })?;

            Ok::<ProxiedResponse, GatewayError>(ProxiedResponse {
                status,
                headers: parts.headers,
                body,
            })
        };

        let outcome = tokio::time::timeout(upstream.timeout, attempt).await;
        self.metrics
            .record_latency(started.elapsed().as_millis() as u64, Some(&upstream.name));

        let result = match outcome {
            Err(_) => {
                tracing::warn!(
                    correlation_id,
                    service = %upstream.name,
                    timeout_ms = upstream.timeout.as_millis() as u64,
                    "upstream call timed out"
                );
                self.note_failure(&breaker, &upstream.name);
                Err(GatewayError::UpstreamTimeout {
                    service: upstream.name.clone(),
                })
            }
            Ok(Err(err)) => {
                self.note_failure(&breaker, &upstream.name);
                Err(err)
            }
            Ok(Ok(proxied)) => {
                if proxied.status.is_server_error() {
                    self.note_failure(&breaker, &upstream.name);
                } else {
                    breaker.record_success();
                }
                Ok(proxied)
            }
        };

        if let Some(guard) = probe_guard.as_mut() {
            guard.disarm();
        }
        result
    }

    fn build_request(
        &self,
        upstream: &Upstream,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
        correlation_id: &str,
    ) -> Result<Request<Body>, GatewayError> {
        let target = format!(
            "{}{}",
            upstream.base_url.as_str().trim_end_matches('/'),
            path_and_query
        );
        let uri: Uri = target.parse().map_err(|_| {
            tracing::error!(service = %upstream.name, url = %target, "invalid upstream uri");
            GatewayError::UpstreamUnavailable {
                service: upstream.name.clone(),
            }
        })?;

        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(out_headers) = builder.headers_mut() {
            *out_headers = forwardable_headers(headers);
            if let Ok(value) = HeaderValue::from_str(correlation_id) {
                out_headers.insert(CORRELATION_HEADER, value);
            }
        }
        builder.body(Body::from(body)).map_err(|_| {
            GatewayError::UpstreamUnavailable {
                service: upstream.name.clone(),
            }
        })
    }

    fn note_failure(&self, breaker: &CircuitBreaker, service: &str) {
        if breaker.record_failure() {
            self.metrics.record_circuit_trip(service);
        }
    }
}
