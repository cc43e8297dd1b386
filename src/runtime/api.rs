//! API-facing service and its request/response models.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::core::{
    Document, Scheduler, SchedulerError, ShutdownReport, Spawn, StatusLookup, StatusReporter,
    Task, TaskExecutor, TaskId, TaskStatus, TaskStore,
};
use crate::util::clock::now_rfc3339;

/// Message returned for a freshly queued task.
pub const SUBMITTED_MESSAGE: &str = "Task is queued and will start automatically when possible.";
/// Status reported for ids without a status cell.
pub const NOT_FOUND_STATUS: &str = "None";
/// Message reported for ids without a status cell.
pub const NOT_FOUND_MESSAGE: &str = "Task not found.";

/// Submission acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubmitted {
    /// Identifier to poll with.
    pub task_id: TaskId,
    /// Human-readable acknowledgement.
    pub message: String,
}

/// Task status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    /// Task identifier.
    pub task_id: TaskId,
    /// Status name, or `"None"` when unknown.
    pub status: String,
    /// Present when the task is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskStatusResponse {
    /// Parsed status, `None` for unknown tasks.
    pub fn parsed(&self) -> Option<TaskStatus> {
        self.status.parse().ok()
    }
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Reserved slots, when the queue backend answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<u32>,
    /// Pending depth, when the queue backend answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<usize>,
}

/// Submission, status lookup and lifecycle control over one scheduler.
pub struct ScrapeService<E, S> {
    scheduler: Arc<Scheduler<E, S>>,
    reporter: StatusReporter,
    log_dir: PathBuf,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<E, S> ScrapeService<E, S>
where
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    /// Wrap a scheduler; scraper logs are placed under `log_dir`.
    pub fn new(scheduler: Scheduler<E, S>, log_dir: impl Into<PathBuf>) -> Self {
        let reporter = StatusReporter::new(Arc::clone(scheduler.recorder().board()));
        Self {
            scheduler: Arc::new(scheduler),
            reporter,
            log_dir: log_dir.into(),
            loop_handle: Mutex::new(None),
        }
    }

    /// Underlying scheduler.
    pub fn scheduler(&self) -> &Arc<Scheduler<E, S>> {
        &self.scheduler
    }

    /// Task-collection view used for submissions.
    pub fn tasks(&self) -> &TaskStore {
        self.scheduler.recorder().tasks()
    }

    /// Register a new task and queue it.
    ///
    /// Admission failures are returned to the caller; a task rejected by the
    /// queue is recorded as `UnknownError` so it never lingers as `Pending`.
    pub async fn submit(&self, parameters: Document) -> Result<TaskSubmitted, SchedulerError> {
        if self.scheduler.is_stopped() {
            return Err(SchedulerError::Backend("scheduler is shutting down".into()));
        }

        let task = Task::pending(TaskId::generate(), parameters, &self.log_dir);
        let task_id = task.task_id.clone();
        self.tasks().create(&task).await?;
        self.scheduler
            .recorder()
            .board()
            .set_status(&task_id, TaskStatus::Pending)
            .await?;

        if let Err(e) = self.scheduler.queue().enqueue(&task_id).await {
            tracing::warn!(task_id = %task_id, "submission rejected: {e}");
            let mut fields = Document::new();
            fields.insert("error".into(), Value::String(format!("rejected: {e}")));
            fields.insert("finished_at".into(), Value::String(now_rfc3339()));
            self.scheduler
                .recorder()
                .record(&task_id, TaskStatus::UnknownError, fields)
                .await;
            return Err(e);
        }

        tracing::info!(task_id = %task_id, "task enqueued");
        self.scheduler.waker().notify_one();
        Ok(TaskSubmitted {
            task_id,
            message: SUBMITTED_MESSAGE.into(),
        })
    }

    /// Latest status of `task_id`.
    pub async fn status(&self, task_id: &TaskId) -> Result<TaskStatusResponse, SchedulerError> {
        Ok(match self.reporter.get_status(task_id).await? {
            StatusLookup::Found(status) => TaskStatusResponse {
                task_id: task_id.clone(),
                status: status.as_str().into(),
                message: None,
            },
            StatusLookup::NotFound => TaskStatusResponse {
                task_id: task_id.clone(),
                status: NOT_FOUND_STATUS.into(),
                message: Some(NOT_FOUND_MESSAGE.into()),
            },
        })
    }

    /// Spawn the scheduling loop on the current Tokio runtime. Calling it
    /// again while the loop runs is a no-op.
    pub fn start(&self) {
        let mut handle = self.loop_handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let scheduler = Arc::clone(&self.scheduler);
        *handle = Some(tokio::spawn(async move { scheduler.run().await }));
    }

    /// Stop the loop and wind down in-flight tasks.
    pub async fn shutdown(&self) -> ShutdownReport {
        let report = self.scheduler.shutdown().await;
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("scheduler loop ended abnormally: {e}");
            }
        }
        report
    }

    /// Liveness plus queue gauges.
    pub async fn health(&self) -> Health {
        let queue = self.scheduler.queue();
        match (queue.running_count().await, queue.pending_len().await) {
            (Ok(running), Ok(pending)) => Health {
                ok: true,
                running: Some(running),
                pending: Some(pending),
            },
            (running, pending) => {
                tracing::warn!("queue backend unavailable for health check");
                Health {
                    ok: false,
                    running: running.ok(),
                    pending: pending.ok(),
                }
            }
        }
    }
}
