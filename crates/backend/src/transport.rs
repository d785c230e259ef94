//! Bulk dispatch transport backed by the messaging backend's `/send` endpoint.

use std::sync::Arc;

use wabulk_common::error::AppError;
use wabulk_common::types::RecipientRow;
use wabulk_dispatcher::{DispatchJob, Transport};

use crate::client::{BackendClient, OutboundMessage};

/// Sends each bulk row as one multipart POST.
///
/// A non-2xx answer is a rejected row (`Ok(false)`); network failures are
/// returned as errors. Both end up as `Failed` in the dispatcher.
#[derive(Clone)]
pub struct HttpTransport {
    client: Arc<BackendClient>,
}

impl HttpTransport {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        row: &RecipientRow,
        job: &DispatchJob,
        text: &str,
    ) -> anyhow::Result<bool> {
        let outbound = OutboundMessage {
            session_id: &job.session_id,
            number: &row.address,
            message: Some(text).filter(|t| !t.is_empty()),
            attachment: job.attachment.as_ref(),
        };

        match self.client.send_message(outbound).await {
            Ok(()) => Ok(true),
            Err(AppError::Backend { status, body }) => {
                tracing::warn!(
                    number = %row.address,
                    status,
                    body = %body,
                    "Backend rejected message"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
