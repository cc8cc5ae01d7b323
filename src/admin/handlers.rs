//! Admin endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::http::server::AppState;
use crate::observability::MetricsSnapshot;
use crate::resilience::CircuitView;

/// GET /admin/status
pub async fn get_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "services": state.upstreams.len(),
        "cacheEntries": state.cache.len(),
        "revokedTokens": state.revocations.len(),
    }))
}

/// GET /admin/metrics
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// POST /admin/metrics/reset
pub async fn reset_metrics(State(state): State<AppState>) -> StatusCode {
    state.metrics.reset();
    tracing::info!("metrics reset via admin api");
    StatusCode::NO_CONTENT
}

/// GET /admin/cache
pub async fn get_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "entries": state.cache.len(),
        "keys": state.cache.keys(),
    }))
}

/// DELETE /admin/cache
pub async fn clear_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cleared = state.cache.clear();
    tracing::info!(cleared, "cache cleared via admin api");
    Json(json!({ "cleared": cleared }))
}

/// GET /admin/circuits
pub async fn get_circuits(State(state): State<AppState>) -> Json<Vec<CircuitView>> {
    Json(state.circuits.views())
}
