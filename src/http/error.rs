//! Gateway error taxonomy.
//!
//! Breaker and limiter verdicts are consulted synchronously and translated
//! into this taxonomy at the pipeline boundary; they are never surfaced as
//! panics or opaque 500s. Every error response carries the request's
//! correlation identifier so it can be matched to server-side logs, and no
//! upstream connection detail leaks to the client.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Everything the pipeline can refuse a request with.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("service '{service}' is unavailable")]
    CircuitOpen { service: String },

    #[error("service '{service}' is unreachable")]
    UpstreamUnavailable { service: String },

    #[error("service '{service}' timed out")]
    UpstreamTimeout { service: String },

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),

    #[error("insufficient permissions")]
    Forbidden,

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("bad request: {0}")]
    BadRequest(&'static str),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::CircuitOpen { .. } | GatewayError::UpstreamUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::UnknownService(_) => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Machine-readable error code, also the metrics error kind.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::UpstreamUnavailable { .. } => "upstream_unavailable",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::Unauthenticated(_) => "unauthenticated",
            GatewayError::Forbidden => "forbidden",
            GatewayError::UnknownService(_) => "unknown_service",
            GatewayError::BadRequest(_) => "bad_request",
        }
    }

    /// Service this error is attributed to, when there is one.
    pub fn service(&self) -> Option<&str> {
        match self {
            GatewayError::CircuitOpen { service }
            | GatewayError::UpstreamUnavailable { service }
            | GatewayError::UpstreamTimeout { service } => Some(service),
            _ => None,
        }
    }

    /// Build the structured error response.
    pub fn into_response(self, correlation_id: &str) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({
            "status": status.as_u16(),
            "error": self.code(),
            "message": self.to_string(),
            "correlationId": correlation_id,
        });
        if let Some(service) = self.service() {
            body["service"] = serde_json::Value::String(service.to_string());
        }

        let mut response = (status, Json(body)).into_response();
        if let GatewayError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = header::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        let cases = [
            (
                GatewayError::CircuitOpen { service: "orders".into() },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                GatewayError::UpstreamTimeout { service: "crm".into() },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                GatewayError::RateLimited { retry_after_secs: 7 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                GatewayError::Unauthenticated("missing bearer token"),
                StatusCode::UNAUTHORIZED,
            ),
            (GatewayError::Forbidden, StatusCode::FORBIDDEN),
            (
                GatewayError::UnknownService("nope".into()),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected);
        }
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let response =
            GatewayError::RateLimited { retry_after_secs: 12 }.into_response("cid-1");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "12"
        );
    }
}
