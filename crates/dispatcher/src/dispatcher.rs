//! Bulk dispatcher: sends one job's messages strictly one at a time.
//!
//! For every row, in order:
//! 1. Mark it `Sending` and publish a preview of what is about to go out
//! 2. Render the effective text (shared message or row text, then placeholders)
//! 3. Hand it to the injected [`Transport`], bounded by the job's send timeout
//! 4. Record `Sent` or `Failed` and publish it
//! 5. Wait the job's inter-message delay before the next row
//!
//! A failing row never stops the job. Cancellation is checked before each row;
//! a send already in flight is allowed to finish and is recorded first.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use wabulk_common::error::AppError;
use wabulk_common::types::{RecipientRow, RowStatus};

use crate::job::{AttachmentInfo, DispatchJob};

/// Performs one outbound send.
///
/// `Ok(true)` means delivered. `Ok(false)` and `Err(_)` both mark the row as
/// failed; the error is only logged.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        row: &RecipientRow,
        job: &DispatchJob,
        text: &str,
    ) -> anyhow::Result<bool>;
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(
        &self,
        row: &RecipientRow,
        job: &DispatchJob,
        text: &str,
    ) -> anyhow::Result<bool> {
        (**self).send(row, job, text).await
    }
}

/// Status of every row of a job, indexed by row position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DispatchStatus(Vec<RowStatus>);

impl DispatchStatus {
    /// All rows `Pending`.
    pub fn pending(len: usize) -> Self {
        Self(vec![RowStatus::Pending; len])
    }

    pub fn get(&self, index: usize) -> Option<RowStatus> {
        self.0.get(index).copied()
    }

    pub fn as_slice(&self) -> &[RowStatus] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn counts(&self) -> StatusCounts {
        StatusCounts::tally(&self.0)
    }

    /// Index of the row currently `Sending`, if any.
    pub fn current(&self) -> Option<usize> {
        self.0.iter().position(|s| *s == RowStatus::Sending)
    }

    /// Move a row to a new status.
    ///
    /// Terminal rows are never changed again.
    pub(crate) fn set(&mut self, index: usize, status: RowStatus) {
        if let Some(slot) = self.0.get_mut(index) {
            debug_assert!(!slot.is_terminal(), "row {index} already terminal");
            if !slot.is_terminal() {
                *slot = status;
            }
        }
    }
}

/// Per-status totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub sending: usize,
    pub sent: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a RowStatus>) -> Self {
        statuses
            .into_iter()
            .fold(Self::default(), |mut counts, status| {
                match status {
                    RowStatus::Pending => counts.pending += 1,
                    RowStatus::Sending => counts.sending += 1,
                    RowStatus::Sent => counts.sent += 1,
                    RowStatus::Failed => counts.failed += 1,
                }
                counts
            })
    }
}

/// What is being sent to the current recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePreview {
    pub address: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentInfo>,
}

/// Progress notification emitted during a run.
#[derive(Debug, Clone, Copy)]
pub enum DispatchEvent<'a> {
    /// A row changed status (`Sending`, then `Sent` or `Failed`).
    Row {
        index: usize,
        status: RowStatus,
        preview: &'a MessagePreview,
    },
    /// The run is over, either completed or cancelled.
    Finished {
        status: &'a DispatchStatus,
        cancelled: bool,
    },
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub status: DispatchStatus,
    /// `true` when the run stopped before attempting every row
    pub cancelled: bool,
}

/// Sequential bulk sender.
///
/// Holds no state between runs; each run owns its status map.
pub struct BulkDispatcher;

impl BulkDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Run `job` to completion (or until `cancel` fires).
    ///
    /// Returns `AppError::InvalidJob` without touching the transport when the
    /// job has no rows or no session. Individual send failures are recorded in
    /// the returned status, never returned as errors.
    pub async fn run<T, F>(
        &self,
        job: &DispatchJob,
        transport: &T,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, AppError>
    where
        T: Transport + ?Sized,
        F: FnMut(DispatchEvent<'_>) + Send,
    {
        job.validate()?;

        let total = job.rows.len();
        let attachment = job.attachment.as_ref().map(AttachmentInfo::from);
        let mut status = DispatchStatus::pending(total);
        let mut cancelled = false;

        tracing::info!(
            session_id = %job.session_id,
            rows = total,
            delay_ms = job.inter_message_delay.as_millis() as u64,
            has_attachment = attachment.is_some(),
            "Bulk dispatch started"
        );

        for (index, row) in job.rows.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(
                    session_id = %job.session_id,
                    next_row = index,
                    "Bulk dispatch cancelled"
                );
                cancelled = true;
                break;
            }

            let preview = MessagePreview {
                address: row.address.clone(),
                text: job.message_for(row),
                attachment: attachment.clone(),
            };

            status.set(index, RowStatus::Sending);
            on_progress(DispatchEvent::Row {
                index,
                status: RowStatus::Sending,
                preview: &preview,
            });

            let outcome = Self::send_one(job, transport, index, row, &preview.text).await;

            status.set(index, outcome);
            on_progress(DispatchEvent::Row {
                index,
                status: outcome,
                preview: &preview,
            });

            if index + 1 < total {
                tokio::select! {
                    _ = tokio::time::sleep(job.inter_message_delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        let counts = status.counts();
        tracing::info!(
            session_id = %job.session_id,
            sent = counts.sent,
            failed = counts.failed,
            pending = counts.pending,
            cancelled,
            "Bulk dispatch finished"
        );

        on_progress(DispatchEvent::Finished {
            status: &status,
            cancelled,
        });

        Ok(DispatchReport { status, cancelled })
    }

    /// Attempt one row and map every outcome to a terminal status.
    async fn send_one<T>(
        job: &DispatchJob,
        transport: &T,
        index: usize,
        row: &RecipientRow,
        text: &str,
    ) -> RowStatus
    where
        T: Transport + ?Sized,
    {
        match tokio::time::timeout(job.send_timeout, transport.send(row, job, text)).await {
            Ok(Ok(true)) => {
                tracing::debug!(index, address = %row.address, "Message sent");
                RowStatus::Sent
            }
            Ok(Ok(false)) => {
                tracing::warn!(index, address = %row.address, "Message rejected by backend");
                RowStatus::Failed
            }
            Ok(Err(e)) => {
                tracing::warn!(index, address = %row.address, error = %e, "Message send failed");
                RowStatus::Failed
            }
            Err(_) => {
                tracing::warn!(
                    index,
                    address = %row.address,
                    timeout_ms = job.send_timeout.as_millis() as u64,
                    "Message send timed out"
                );
                RowStatus::Failed
            }
        }
    }
}

impl Default for BulkDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// Transport that answers from a script and records every call.
    struct ScriptedTransport {
        outcomes: Vec<anyhow::Result<bool>>,
        calls: Mutex<Vec<(String, String)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<anyhow::Result<bool>>) -> Self {
            Self {
                outcomes,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            row: &RecipientRow,
            _job: &DispatchJob,
            text: &str,
        ) -> anyhow::Result<bool> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((row.address.clone(), text.to_string()));
                calls.len() - 1
            };
            tokio::time::sleep(Duration::from_millis(5)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match self.outcomes.get(index) {
                Some(Ok(ok)) => Ok(*ok),
                Some(Err(e)) => Err(anyhow::anyhow!("{e}")),
                None => Ok(true),
            }
        }
    }

    fn job(addresses: &[&str]) -> DispatchJob {
        DispatchJob::new(
            "session-1",
            addresses.iter().map(|a| RecipientRow::new(*a)).collect(),
        )
        .with_message("hi")
        .with_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_all_rows_sent_in_order() {
        let transport = ScriptedTransport::new(vec![]);
        let report = BulkDispatcher::new()
            .run(&job(&["A", "B"]), &transport, |_| {}, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.status.as_slice(), [RowStatus::Sent, RowStatus::Sent]);
        assert!(!report.cancelled);
        assert_eq!(
            transport.calls(),
            vec![("A".into(), "hi".into()), ("B".into(), "hi".into())]
        );
    }

    #[tokio::test]
    async fn test_failed_row_does_not_stop_job() {
        let transport = ScriptedTransport::new(vec![Ok(false), Ok(true)]);
        let report = BulkDispatcher::new()
            .run(&job(&["A", "B"]), &transport, |_| {}, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report.status.as_slice(),
            [RowStatus::Failed, RowStatus::Sent]
        );
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_marks_failed() {
        let transport =
            ScriptedTransport::new(vec![Ok(true), Err(anyhow::anyhow!("connection reset"))]);
        let report = BulkDispatcher::new()
            .run(
                &job(&["A", "B", "C"]),
                &transport,
                |_| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            report.status.as_slice(),
            [RowStatus::Sent, RowStatus::Failed, RowStatus::Sent]
        );
    }

    #[tokio::test]
    async fn test_empty_job_rejected_without_sending() {
        let transport = ScriptedTransport::new(vec![]);
        let empty = DispatchJob::new("s", vec![]);
        let result = BulkDispatcher::new()
            .run(&empty, &transport, |_| {}, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AppError::InvalidJob(_))));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_session_rejected() {
        let transport = ScriptedTransport::new(vec![]);
        let no_session = DispatchJob::new("", vec![RecipientRow::new("A")]);
        let result = BulkDispatcher::new()
            .run(&no_session, &transport, |_| {}, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AppError::InvalidJob(_))));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_never_more_than_one_send_in_flight() {
        let transport = ScriptedTransport::new(vec![]);
        BulkDispatcher::new()
            .run(
                &job(&["A", "B", "C", "D", "E"]),
                &transport,
                |_| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(transport.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_progress_sequence_and_invariant() {
        let transport = ScriptedTransport::new(vec![Ok(true), Ok(false)]);
        let mut events = Vec::new();
        let mut finished = None;

        BulkDispatcher::new()
            .run(
                &job(&["A", "B"]),
                &transport,
                |event| match event {
                    DispatchEvent::Row {
                        index,
                        status,
                        preview,
                    } => events.push((index, status, preview.address.clone())),
                    DispatchEvent::Finished { status, cancelled } => {
                        finished = Some((status.clone(), cancelled))
                    }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            events,
            vec![
                (0, RowStatus::Sending, "A".to_string()),
                (0, RowStatus::Sent, "A".to_string()),
                (1, RowStatus::Sending, "B".to_string()),
                (1, RowStatus::Failed, "B".to_string()),
            ]
        );
        let (status, cancelled) = finished.unwrap();
        assert_eq!(status.as_slice(), [RowStatus::Sent, RowStatus::Failed]);
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn test_cancel_after_first_row_leaves_rest_pending() {
        let transport = ScriptedTransport::new(vec![]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let report = BulkDispatcher::new()
            .run(
                &job(&["A", "B", "C"]),
                &transport,
                move |event| {
                    if let DispatchEvent::Row {
                        index: 0,
                        status: RowStatus::Sent,
                        ..
                    } = event
                    {
                        trigger.cancel();
                    }
                },
                &cancel,
            )
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(
            report.status.as_slice(),
            [RowStatus::Sent, RowStatus::Pending, RowStatus::Pending]
        );
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start_sends_nothing() {
        let transport = ScriptedTransport::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = BulkDispatcher::new()
            .run(&job(&["A"]), &transport, |_| {}, &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.status.as_slice(), [RowStatus::Pending]);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_delay() {
        let transport = ScriptedTransport::new(vec![]);
        let cancel = CancellationToken::new();
        let long_delay = job(&["A", "B"]).with_delay(Duration::from_secs(3600));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let report = BulkDispatcher::new()
            .run(&long_delay, &transport, |_| {}, &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(started.elapsed() < Duration::from_secs(3600));
        assert_eq!(
            report.status.as_slice(),
            [RowStatus::Sent, RowStatus::Pending]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applied_between_rows_only() {
        let transport = ScriptedTransport::new(vec![]);
        let delayed = job(&["A", "B", "C"]).with_delay(Duration::from_secs(2));

        let started = tokio::time::Instant::now();
        BulkDispatcher::new()
            .run(&delayed, &transport, |_| {}, &CancellationToken::new())
            .await
            .unwrap();

        // Two gaps of 2s plus three 5ms sends; no trailing delay.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(4));
        assert!(elapsed < Duration::from_secs(6));
    }

    struct HangingTransport;

    #[async_trait::async_trait]
    impl Transport for HangingTransport {
        async fn send(
            &self,
            _row: &RecipientRow,
            _job: &DispatchJob,
            _text: &str,
        ) -> anyhow::Result<bool> {
            std::future::pending::<()>().await;
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_send_times_out_as_failed() {
        let hanging = job(&["A", "B"]).with_send_timeout(Duration::from_secs(30));
        let report = BulkDispatcher::new()
            .run(&hanging, &HangingTransport, |_| {}, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report.status.as_slice(),
            [RowStatus::Failed, RowStatus::Failed]
        );
    }

    #[tokio::test]
    async fn test_repeated_runs_are_independent() {
        let dispatcher = BulkDispatcher::new();
        let first = dispatcher
            .run(
                &job(&["A", "B", "C"]),
                &ScriptedTransport::new(vec![Ok(true), Ok(false), Ok(true)]),
                |_| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let second = dispatcher
            .run(
                &job(&["A", "B", "C"]),
                &ScriptedTransport::new(vec![Ok(true), Ok(false), Ok(true)]),
                |_| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_preview_renders_placeholders_and_attachment() {
        let transport = ScriptedTransport::new(vec![]);
        let rows = vec![RecipientRow::new("A").with_field("name", "Sam")];
        let job = DispatchJob::new("s", rows)
            .with_message("Hello {name}")
            .with_attachment(Some(crate::job::Attachment::new(
                "promo.jpg",
                "image/jpeg",
                vec![0xff, 0xd8],
            )));

        let mut previews = Vec::new();
        BulkDispatcher::new()
            .run(
                &job,
                &transport,
                |event| {
                    if let DispatchEvent::Row { preview, .. } = event {
                        previews.push(preview.clone());
                    }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(previews[0].text, "Hello Sam");
        assert_eq!(
            previews[0].attachment.as_ref().map(|a| a.kind.as_str()),
            Some("image")
        );
        assert_eq!(transport.calls()[0].1, "Hello Sam");
    }

    #[test]
    fn test_status_counts_and_current() {
        let mut status = DispatchStatus::pending(3);
        status.set(0, RowStatus::Sent);
        status.set(1, RowStatus::Sending);
        assert_eq!(status.current(), Some(1));
        assert_eq!(
            status.counts(),
            StatusCounts {
                pending: 1,
                sending: 1,
                sent: 1,
                failed: 0
            }
        );
    }
}
