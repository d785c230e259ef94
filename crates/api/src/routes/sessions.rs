//! Session routes, proxied to the messaging backend.

use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

use wabulk_common::error::AppError;
use wabulk_common::types::{QrResponse, Session, SessionState};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/{id}", delete(logout_session))
}

/// A backend session with its derived connection state.
#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub state: SessionState,
    pub display_name: String,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            state: session.state(),
            display_name: session.display_name().to_string(),
            session,
        }
    }
}

/// GET /api/sessions — Sessions of the configured user.
async fn list_sessions(State(state): State<AppState>) -> Result<Json<Vec<SessionView>>, AppError> {
    let sessions = state
        .backend
        .list_sessions(state.config.user_id.as_deref())
        .await?;
    Ok(Json(sessions.into_iter().map(SessionView::from).collect()))
}

/// POST /api/sessions — Start linking a new account; returns its QR code.
async fn create_session(State(state): State<AppState>) -> Result<Json<QrResponse>, AppError> {
    let qr = state
        .backend
        .create_session(state.config.user_id.as_deref())
        .await?;
    Ok(Json(qr))
}

/// DELETE /api/sessions/:id — Log out and remove a session.
async fn logout_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.backend.logout_and_delete(&id).await?;
    Ok(Json(json!({ "session_id": id, "logged_out": true })))
}
