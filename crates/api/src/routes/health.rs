//! Health check endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Liveness plus the configured backend and number of unfinished bulk jobs.
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "wabulk-api",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.backend.base_url().as_str(),
        "running_jobs": state.jobs.running().await,
    }))
}
