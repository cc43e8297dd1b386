//! Status transitions for a single task.
//!
//! [`StatusRecorder`] is the only code path that writes statuses after
//! submission. It writes the task store and the fast status cell together; a
//! failure on one side is logged and never prevents the other write.

use std::sync::Arc;

use serde_json::Value;

use crate::core::{
    Document, ExecutionError, ExecutionReport, SchedulerError, StatusBoard, TaskId, TaskStatus,
    TaskStore,
};
use crate::util::clock::now_rfc3339;

/// Writes task statuses to both the status cell and the task store.
#[derive(Clone)]
pub struct StatusRecorder {
    board: Arc<dyn StatusBoard>,
    tasks: TaskStore,
}

impl StatusRecorder {
    /// Create a recorder from its two sinks.
    pub fn new(board: Arc<dyn StatusBoard>, tasks: TaskStore) -> Self {
        Self { board, tasks }
    }

    /// Task store this recorder writes to.
    pub const fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    /// Status board this recorder writes to.
    pub fn board(&self) -> &Arc<dyn StatusBoard> {
        &self.board
    }

    /// Record `status` for `task_id`, merging `extra` into the task document.
    ///
    /// The store is written first, so a client that observes a status in the
    /// cell finds at least that much in the task document.
    pub async fn record(&self, task_id: &TaskId, status: TaskStatus, mut extra: Document) {
        extra.insert("status".into(), Value::String(status.as_str().to_owned()));
        extra.insert("updated_at".into(), Value::String(now_rfc3339()));
        if let Err(e) = self.tasks.update(task_id, extra).await {
            tracing::error!(task_id = %task_id, %status, "failed to update task store: {e}");
        }

        if let Err(e) = self.board.set_status(task_id, status).await {
            tracing::error!(task_id = %task_id, %status, "failed to write status cell: {e}");
        }
    }
}

/// Tracks the current status of one dispatched task and guards its
/// transitions.
pub struct TaskLifecycle {
    task_id: TaskId,
    current: TaskStatus,
    recorder: Arc<StatusRecorder>,
}

impl TaskLifecycle {
    /// Start tracking a task that has just left the pending queue.
    pub const fn new(task_id: TaskId, recorder: Arc<StatusRecorder>) -> Self {
        Self {
            task_id,
            current: TaskStatus::Pending,
            recorder,
        }
    }

    /// Task being tracked.
    pub const fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Last recorded status.
    pub const fn current(&self) -> TaskStatus {
        self.current
    }

    /// Recorder shared with the scheduler.
    pub fn recorder(&self) -> &StatusRecorder {
        &self.recorder
    }

    /// Move to a non-terminal status.
    pub async fn advance(&mut self, next: TaskStatus) -> Result<(), SchedulerError> {
        if next.is_terminal() || !self.current.can_transition_to(next) {
            return Err(SchedulerError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        self.recorder.record(&self.task_id, next, Document::new()).await;
        tracing::info!(task_id = %self.task_id, from = %self.current, to = %next, "task advanced");
        self.current = next;
        Ok(())
    }

    /// Record the terminal status for `outcome` and return it.
    ///
    /// Falls back to `UnknownError` when the natural terminal status is not
    /// reachable from the current one, so every task ends terminal.
    pub async fn finish(&mut self, outcome: &Result<ExecutionReport, ExecutionError>) -> TaskStatus {
        let mut fields = Document::new();
        fields.insert("finished_at".into(), Value::String(now_rfc3339()));

        let mut status = match outcome {
            Ok(report) => {
                fields.insert("records_inserted".into(), Value::from(report.records_inserted));
                fields.insert("records_skipped".into(), Value::from(report.records_skipped));
                TaskStatus::Finished
            }
            Err(e) => {
                fields.insert("error".into(), Value::String(e.to_string()));
                e.terminal_status()
            }
        };

        if self.current.is_terminal() {
            tracing::warn!(task_id = %self.task_id, status = %self.current, "task already terminal");
            return self.current;
        }
        if !self.current.can_transition_to(status) {
            tracing::warn!(
                task_id = %self.task_id,
                from = %self.current,
                to = %status,
                "terminal status unreachable, recording UnknownError"
            );
            status = TaskStatus::UnknownError;
        }

        self.recorder.record(&self.task_id, status, fields).await;
        self.current = status;
        status
    }
}
