//! Session endpoints: token issuance and revocation.
//!
//! When an upstream named `auth` is configured, login credentials are
//! delegated to it and the gateway issues its own token only after the
//! upstream accepts them. Without one, the gateway issues tokens directly
//! from the supplied username, which is the single-binary development
//! posture.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::http::correlation::CorrelationId;
use crate::http::error::GatewayError;
use crate::http::server::{authenticate, AppState};
use crate::proxy::forwarder::forwardable_headers;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /auth/login
pub async fn login(State(state): State<AppState>, req: Request<Body>) -> Response {
    let correlation = req
        .extensions()
        .get::<CorrelationId>()
        .cloned()
        .unwrap_or_else(CorrelationId::generate);

    match login_inner(&state, req, &correlation).await {
        Ok(response) => response,
        Err(err) => {
            state.metrics.record_error(err.code(), err.service());
            err.into_response(correlation.as_str())
        }
    }
}

async fn login_inner(
    state: &AppState,
    req: Request<Body>,
    correlation: &CorrelationId,
) -> Result<Response, GatewayError> {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, state.config.security.max_body_size)
        .await
        .map_err(|_| GatewayError::BadRequest("request body too large or unreadable"))?;
    let login: LoginRequest = serde_json::from_slice(&body)
        .map_err(|_| GatewayError::BadRequest("malformed login payload"))?;
    if login.username.is_empty() || login.password.is_empty() {
        return Err(GatewayError::BadRequest("username and password are required"));
    }

    let (sub, role) = match state.upstreams.get("auth") {
        Some(auth_upstream) => {
            let proxied = state
                .proxy
                .forward(
                    &auth_upstream,
                    Method::POST,
                    "/auth/login",
                    &parts.headers,
                    body,
                    correlation.as_str(),
                )
                .await?;
            if !proxied.status.is_success() {
                // Credentials rejected upstream; pass its answer through.
                let mut response = Response::new(Body::from(proxied.body));
                *response.status_mut() = proxied.status;
                *response.headers_mut() = forwardable_headers(&proxied.headers);
                return Ok(response);
            }
            let reply: serde_json::Value =
                serde_json::from_slice(&proxied.body).unwrap_or_default();
            let sub = reply
                .get("user_id")
                .or_else(|| reply.get("sub"))
                .and_then(|v| v.as_str())
                .unwrap_or(&login.username)
                .to_string();
            let role = reply
                .get("role")
                .and_then(|v| v.as_str())
                .unwrap_or("user")
                .to_string();
            (sub, role)
        }
        None => {
            tracing::debug!(
                correlation_id = %correlation,
                user = %login.username,
                "issuing token without auth upstream"
            );
            (login.username.clone(), "user".to_string())
        }
    };

    let (token, claims) = state
        .auth
        .issue(&sub, &role)
        .map_err(|_| GatewayError::BadRequest("token issuance failed"))?;
    tracing::info!(
        correlation_id = %correlation,
        user = %claims.sub,
        role = %claims.role,
        "issued bearer token"
    );

    Ok((
        StatusCode::OK,
        Json(json!({
            "token": token,
            "tokenType": "Bearer",
            "expiresIn": state.auth.token_ttl_secs(),
            "correlationId": correlation.as_str(),
        })),
    )
        .into_response())
}

/// POST /auth/logout: revokes the presented token until its expiry.
pub async fn logout(State(state): State<AppState>, req: Request<Body>) -> Response {
    let correlation = req
        .extensions()
        .get::<CorrelationId>()
        .cloned()
        .unwrap_or_else(CorrelationId::generate);

    match authenticate(&state, req.headers()) {
        Ok(ctx) => {
            state.revocations.revoke(&ctx.jti, ctx.exp);
            tracing::info!(
                correlation_id = %correlation,
                user = %ctx.sub,
                jti = %ctx.jti,
                "token revoked"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "message": "token revoked",
                    "correlationId": correlation.as_str(),
                })),
            )
                .into_response()
        }
        Err(err) => {
            state.metrics.record_error(err.code(), err.service());
            err.into_response(correlation.as_str())
        }
    }
}
