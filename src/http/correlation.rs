//! Correlation ID tagging.
//!
//! # Responsibilities
//! - Reuse an inbound `X-Correlation-ID` or generate a UUID v4
//! - Make the ID available to handlers via request extensions
//! - Stamp the ID on every response
//!
//! # Design Decisions
//! - Applied as the outermost application layer so the ID exists before
//!   any other stage logs or fails
//! - The proxy propagates the same header to upstream calls, giving one
//!   identifier across the whole service hop chain

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use uuid::Uuid;

/// Header carrying the correlation identifier.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// The request's correlation identifier, stored in request extensions.
#[derive(Debug, Clone)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tower layer installing [`CorrelationService`].
#[derive(Debug, Clone, Default)]
pub struct CorrelationLayer;

impl<S> Layer<S> for CorrelationLayer {
    type Service = CorrelationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationService { inner }
    }
}

/// Middleware that tags request and response with the correlation ID.
#[derive(Debug, Clone)]
pub struct CorrelationService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for CorrelationService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let inbound = req
            .headers()
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let id = inbound.unwrap_or_else(|| Uuid::new_v4().to_string());
        let header_value = HeaderValue::from_str(&id)
            .unwrap_or_else(|_| HeaderValue::from_static("invalid-correlation-id"));

        req.headers_mut()
            .insert(CORRELATION_HEADER, header_value.clone());
        req.extensions_mut().insert(CorrelationId(id));

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move {
            let mut response = inner.call(req).await?;
            response
                .headers_mut()
                .insert(CORRELATION_HEADER, header_value);
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::{extract::Request as AxumRequest, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/echo",
                get(|req: AxumRequest| async move {
                    req.extensions()
                        .get::<CorrelationId>()
                        .map(|id| id.as_str().to_string())
                        .unwrap_or_default()
                }),
            )
            .layer(CorrelationLayer)
    }

    #[tokio::test]
    async fn inbound_id_is_reused() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header(CORRELATION_HEADER, "req-abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(CORRELATION_HEADER).unwrap(),
            "req-abc-123"
        );
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body, "req-abc-123");
    }

    #[tokio::test]
    async fn missing_id_is_generated() {
        let response = app()
            .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response
            .headers()
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(Uuid::parse_str(&header).is_ok());
    }
}
