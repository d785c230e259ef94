pub mod bulk;
pub mod health;
pub mod sessions;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(sessions::router())
        .merge(bulk::router())
        .with_state(state)
}
