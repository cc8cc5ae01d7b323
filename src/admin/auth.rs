//! API-key gate for the admin surface.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::http::server::AppState;

/// Require `Authorization: Bearer <api_key>` on every admin route.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected = format!("Bearer {}", state.config.admin.api_key);
    match req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        Some(value) if value == expected => Ok(next.run(req).await),
        _ => {
            tracing::warn!(path = %req.uri().path(), "rejected admin request with bad api key");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
