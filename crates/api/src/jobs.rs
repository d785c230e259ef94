//! In-memory registry of bulk jobs started through the API.
//!
//! Each job runs on its own task. Progress events are folded into a
//! [`JobSnapshot`] published on a `watch` channel, so readers never wait on
//! the dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use wabulk_common::error::AppError;
use wabulk_common::types::RowStatus;
use wabulk_dispatcher::{
    BulkDispatcher, DispatchEvent, DispatchJob, MessagePreview, StatusCounts, Transport,
};

/// Finished jobs older than this are dropped when a new job is registered.
const FINISHED_RETENTION_MINUTES: i64 = 60;

/// Point-in-time view of a bulk job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub session_id: String,
    pub total: usize,
    pub addresses: Vec<String>,
    pub statuses: Vec<RowStatus>,
    /// Preview of the row being sent, if any
    pub current: Option<MessagePreview>,
    pub counts: StatusCounts,
    pub finished: bool,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    fn new(job_id: Uuid, job: &DispatchJob) -> Self {
        let statuses = vec![RowStatus::Pending; job.len()];
        Self {
            job_id,
            session_id: job.session_id.clone(),
            total: job.len(),
            addresses: job.rows.iter().map(|r| r.address.clone()).collect(),
            counts: StatusCounts::tally(&statuses),
            statuses,
            current: None,
            finished: false,
            cancelled: false,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn apply(&mut self, event: DispatchEvent<'_>) {
        match event {
            DispatchEvent::Row {
                index,
                status,
                preview,
            } => {
                if let Some(slot) = self.statuses.get_mut(index) {
                    *slot = status;
                }
                if status == RowStatus::Sending {
                    self.current = Some(preview.clone());
                }
            }
            DispatchEvent::Finished { status, cancelled } => {
                self.statuses = status.as_slice().to_vec();
                self.cancelled = cancelled;
                self.finish();
            }
        }
        self.counts = StatusCounts::tally(&self.statuses);
    }

    fn finish(&mut self) {
        self.finished = true;
        self.current = None;
        self.finished_at = Some(Utc::now());
    }

    /// End the job abnormally; a row caught mid-send counts as failed.
    fn abort(&mut self, error: String) {
        for status in self.statuses.iter_mut() {
            if *status == RowStatus::Sending {
                *status = RowStatus::Failed;
            }
        }
        self.counts = StatusCounts::tally(&self.statuses);
        self.error = Some(error);
        self.finish();
    }
}

struct JobEntry {
    session_id: String,
    snapshot: watch::Receiver<JobSnapshot>,
    cancel: CancellationToken,
}

/// Running and recently finished jobs, keyed by job id.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RwLock<HashMap<Uuid, JobEntry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `job`, register it and start dispatching in the background.
    ///
    /// At most one unfinished job per session is allowed.
    pub async fn start(
        &self,
        job: DispatchJob,
        transport: Arc<dyn Transport>,
    ) -> Result<JobSnapshot, AppError> {
        job.validate()?;

        let job_id = Uuid::new_v4();
        let snapshot = JobSnapshot::new(job_id, &job);
        let (tx, rx) = watch::channel(snapshot.clone());
        let cancel = CancellationToken::new();

        {
            let mut jobs = self.inner.write().await;
            let busy = jobs
                .values()
                .any(|e| e.session_id == job.session_id && !e.snapshot.borrow().finished);
            if busy {
                return Err(AppError::Conflict(format!(
                    "session {} already has a bulk job running",
                    job.session_id
                )));
            }

            prune_finished(&mut jobs);
            jobs.insert(
                job_id,
                JobEntry {
                    session_id: job.session_id.clone(),
                    snapshot: rx,
                    cancel: cancel.clone(),
                },
            );
        }

        tracing::info!(
            job_id = %job_id,
            session_id = %job.session_id,
            total = job.len(),
            "Bulk job started"
        );
        tokio::spawn(run_job(job_id, job, transport, tx, cancel));

        Ok(snapshot)
    }

    pub async fn snapshot(&self, job_id: Uuid) -> Option<JobSnapshot> {
        let jobs = self.inner.read().await;
        jobs.get(&job_id).map(|e| e.snapshot.borrow().clone())
    }

    /// All known jobs, oldest first.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let jobs = self.inner.read().await;
        let mut snapshots: Vec<JobSnapshot> =
            jobs.values().map(|e| e.snapshot.borrow().clone()).collect();
        snapshots.sort_by_key(|s| s.started_at);
        snapshots
    }

    /// Number of jobs that have not finished yet.
    pub async fn running(&self) -> usize {
        let jobs = self.inner.read().await;
        jobs.values()
            .filter(|e| !e.snapshot.borrow().finished)
            .count()
    }

    /// Signal cancellation. Returns `false` for an unknown job.
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        let jobs = self.inner.read().await;
        match jobs.get(&job_id) {
            Some(entry) => {
                entry.cancel.cancel();
                tracing::info!(job_id = %job_id, "Bulk job cancellation requested");
                true
            }
            None => false,
        }
    }
}

async fn run_job(
    job_id: Uuid,
    job: DispatchJob,
    transport: Arc<dyn Transport>,
    tx: watch::Sender<JobSnapshot>,
    cancel: CancellationToken,
) {
    let tx = Arc::new(tx);

    // Dispatch on its own task so a panicking transport still ends the job.
    let progress = tx.clone();
    let dispatch = tokio::spawn(async move {
        BulkDispatcher::new()
            .run(
                &job,
                transport.as_ref(),
                |event| progress.send_modify(|snapshot| snapshot.apply(event)),
                &cancel,
            )
            .await
    });

    match dispatch.await {
        Ok(Ok(report)) => {
            let counts = report.status.counts();
            tracing::info!(
                job_id = %job_id,
                sent = counts.sent,
                failed = counts.failed,
                cancelled = report.cancelled,
                "Bulk job finished"
            );
        }
        Ok(Err(e)) => {
            tracing::error!(job_id = %job_id, error = %e, "Bulk job aborted");
            tx.send_modify(|snapshot| snapshot.abort(e.to_string()));
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Bulk job task failed");
            tx.send_modify(|snapshot| snapshot.abort(format!("dispatch task failed: {}", e)));
        }
    }
}

fn prune_finished(jobs: &mut HashMap<Uuid, JobEntry>) {
    let cutoff = Utc::now() - TimeDelta::minutes(FINISHED_RETENTION_MINUTES);
    jobs.retain(|_, entry| {
        let snapshot = entry.snapshot.borrow();
        !(snapshot.finished && snapshot.finished_at.is_some_and(|at| at < cutoff))
    });
}
