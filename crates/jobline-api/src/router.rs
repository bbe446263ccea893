//! Route definitions for the Jobline HTTP API.

use axum::Router;
use axum::routing::get;

use crate::handlers;
use crate::state::AppState;

/// Build the Axum router with all routes.
///
/// Receives the fully-constructed `AppState` and threads it through
/// every route via `.with_state(state)`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(job_routes())
        .merge(health_routes())
        .with_state(state)
}

/// Job status and queue statistics
fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/stats", get(handlers::jobs::queue_stats))
        .route("/jobs/{id}", get(handlers::jobs::get_job))
}

/// Health check
fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}
