//! Bulk job definition.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use wabulk_common::error::AppError;
use wabulk_common::types::RecipientRow;

use crate::template::render_template;

/// Default pause between two consecutive sends.
pub const DEFAULT_INTER_MESSAGE_DELAY: Duration = Duration::from_millis(2000);

/// Default upper bound for a single send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// A file sent alongside every message of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read attachment {}: {}", path.display(), e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());

        Ok(Self::guessed(file_name, bytes))
    }

    /// Build an attachment whose MIME type is guessed from `file_name`.
    pub fn guessed(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self::new(file_name, mime_type, bytes)
    }

    /// Coarse kind shown in previews ("image", "video", "application", ...).
    pub fn kind(&self) -> &str {
        self.mime_type
            .split('/')
            .next()
            .filter(|k| !k.is_empty())
            .unwrap_or("file")
    }
}

/// Summary of an attachment for progress previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentInfo {
    pub file_name: String,
    pub mime_type: String,
    pub kind: String,
}

impl From<&Attachment> for AttachmentInfo {
    fn from(a: &Attachment) -> Self {
        Self {
            file_name: a.file_name.clone(),
            mime_type: a.mime_type.clone(),
            kind: a.kind().to_string(),
        }
    }
}

/// One bulk run: an ordered recipient list and what to send them.
///
/// Rows are sent in insertion order. The job lives only for the run.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub rows: Vec<RecipientRow>,
    /// Shared text, may contain `{field}` placeholders. May be empty.
    pub shared_message: String,
    pub attachment: Option<Attachment>,
    pub session_id: String,
    pub inter_message_delay: Duration,
    pub send_timeout: Duration,
}

impl DispatchJob {
    pub fn new(session_id: impl Into<String>, rows: Vec<RecipientRow>) -> Self {
        Self {
            rows,
            shared_message: String::new(),
            attachment: None,
            session_id: session_id.into(),
            inter_message_delay: DEFAULT_INTER_MESSAGE_DELAY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.shared_message = message.into();
        self
    }

    pub fn with_attachment(mut self, attachment: Option<Attachment>) -> Self {
        self.attachment = attachment;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.inter_message_delay = delay;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Reject jobs that cannot be run at all.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.rows.is_empty() {
            return Err(AppError::InvalidJob("job has no recipients".to_string()));
        }
        if self.session_id.trim().is_empty() {
            return Err(AppError::InvalidJob("job has no session id".to_string()));
        }
        Ok(())
    }

    /// Text actually sent to `row`.
    ///
    /// The shared message wins unless it is empty, then the row's own text;
    /// placeholders are substituted last.
    pub fn message_for(&self, row: &RecipientRow) -> String {
        let template = if !self.shared_message.is_empty() {
            self.shared_message.as_str()
        } else {
            row.template_override.as_deref().unwrap_or_default()
        };
        render_template(template, row)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_rows() {
        let job = DispatchJob::new("s1", vec![]);
        assert!(matches!(job.validate(), Err(AppError::InvalidJob(_))));
    }

    #[test]
    fn test_validate_rejects_blank_session() {
        let job = DispatchJob::new("  ", vec![RecipientRow::new("A")]);
        assert!(matches!(job.validate(), Err(AppError::InvalidJob(_))));
    }

    #[test]
    fn test_shared_message_wins() {
        let job = DispatchJob::new("s1", vec![]).with_message("Hello {name}");
        let row = RecipientRow::new("A")
            .with_override("ignored")
            .with_field("name", "Sam");
        assert_eq!(job.message_for(&row), "Hello Sam");
    }

    #[test]
    fn test_row_override_used_when_shared_empty() {
        let job = DispatchJob::new("s1", vec![]);
        let row = RecipientRow::new("A")
            .with_override("Hi {name}")
            .with_field("name", "Kim");
        assert_eq!(job.message_for(&row), "Hi Kim");
    }

    #[test]
    fn test_no_text_at_all() {
        let job = DispatchJob::new("s1", vec![]);
        assert_eq!(job.message_for(&RecipientRow::new("A")), "");
    }

    #[test]
    fn test_defaults() {
        let job = DispatchJob::new("s1", vec![RecipientRow::new("A")]);
        assert_eq!(job.inter_message_delay, Duration::from_millis(2000));
        assert_eq!(job.send_timeout, Duration::from_secs(30));
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_attachment_kind() {
        let img = Attachment::new("a.png", "image/png", vec![1, 2, 3]);
        assert_eq!(img.kind(), "image");
        let info = AttachmentInfo::from(&img);
        assert_eq!(info.kind, "image");
        assert_eq!(info.file_name, "a.png");
    }

    #[test]
    fn test_attachment_guessed_type() {
        assert_eq!(Attachment::guessed("flyer.jpg", vec![]).mime_type, "image/jpeg");
        assert_eq!(
            Attachment::guessed("blob", vec![]).mime_type,
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_attachment_from_missing_path() {
        let err = Attachment::from_path("/definitely/not/here.pdf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("here.pdf"));
    }
}
