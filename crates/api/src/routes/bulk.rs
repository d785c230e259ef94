//! Bulk job routes.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use wabulk_common::config::AppConfig;
use wabulk_common::error::AppError;
use wabulk_common::types::RecipientRow;
use wabulk_dispatcher::{Attachment, DispatchJob};
use wabulk_dispatcher::rows::{parse_delimited, parse_pasted};

use crate::jobs::JobSnapshot;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/bulk", post(start_bulk).get(list_bulk))
        .route("/api/bulk/{id}", get(get_bulk))
        .route("/api/bulk/{id}/cancel", post(cancel_bulk))
}

/// Body of `POST /api/bulk`.
///
/// Recipients come from `rows` if given, otherwise from `csv` (header line
/// first), otherwise from `text` (one `number,message` per line).
#[derive(Debug, Deserialize)]
pub struct StartBulkRequest {
    pub session_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub rows: Vec<RecipientRow>,
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// File sent with every message
    #[serde(default)]
    pub attachment: Option<AttachmentPayload>,
}

/// An attachment carried inline as base64.
#[derive(Debug, Deserialize)]
pub struct AttachmentPayload {
    pub file_name: String,
    /// Guessed from `file_name` when absent
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

impl AttachmentPayload {
    fn decode(self) -> Result<Attachment, AppError> {
        let bytes = BASE64.decode(self.data.trim()).map_err(|e| {
            AppError::Validation(format!(
                "attachment {} is not valid base64: {}",
                self.file_name, e
            ))
        })?;
        if bytes.is_empty() {
            return Err(AppError::Validation(format!(
                "attachment {} is empty",
                self.file_name
            )));
        }

        Ok(match self.mime_type.filter(|m| !m.trim().is_empty()) {
            Some(mime_type) => Attachment::new(self.file_name, mime_type, bytes),
            None => Attachment::guessed(self.file_name, bytes),
        })
    }
}

impl StartBulkRequest {
    fn into_job(self, config: &AppConfig) -> Result<DispatchJob, AppError> {
        let rows = if !self.rows.is_empty() {
            self.rows
        } else if let Some(csv) = self.csv.as_deref() {
            parse_delimited(csv)
        } else if let Some(text) = self.text.as_deref() {
            parse_pasted(text)
        } else {
            Vec::new()
        };

        let delay = self
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.dispatch_delay());

        let attachment = self.attachment.map(AttachmentPayload::decode).transpose()?;

        Ok(DispatchJob::new(self.session_id, rows)
            .with_message(self.message)
            .with_attachment(attachment)
            .with_delay(delay)
            .with_send_timeout(config.send_timeout()))
    }
}

/// POST /api/bulk — Start a bulk job; progress is polled via GET /api/bulk/:id.
async fn start_bulk(
    State(state): State<AppState>,
    Json(request): Json<StartBulkRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let job = request.into_job(&state.config)?;
    let snapshot = state.jobs.start(job, state.transport.clone()).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": snapshot.job_id, "total": snapshot.total })),
    ))
}

/// GET /api/bulk — All jobs known to this process.
async fn list_bulk(State(state): State<AppState>) -> Json<Vec<JobSnapshot>> {
    Json(state.jobs.list().await)
}

/// GET /api/bulk/:id — Current snapshot of one job.
async fn get_bulk(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobSnapshot>, AppError> {
    state
        .jobs
        .snapshot(id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("bulk job {} not found", id)))
}

/// POST /api/bulk/:id/cancel — Stop a job after its in-flight send.
async fn cancel_bulk(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.jobs.cancel(id).await {
        return Err(AppError::NotFound(format!("bulk job {} not found", id)));
    }
    Ok(Json(json!({ "job_id": id, "cancelling": true })))
}
