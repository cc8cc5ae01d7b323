//! Admin API: runtime visibility and control, gated by a static API key.

pub mod auth;
pub mod handlers;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::http::server::AppState;

/// Build the admin router. Every route requires the admin API key.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(handlers::get_status))
        .route("/admin/metrics", get(handlers::get_metrics))
        .route("/admin/metrics/reset", post(handlers::reset_metrics))
        .route(
            "/admin/cache",
            get(handlers::get_cache).delete(handlers::clear_cache),
        )
        .route("/admin/circuits", get(handlers::get_circuits))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .with_state(state)
}
