//! Task execution trait and the subprocess-backed scraper executor.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{
    ExecutionError, IngestPipeline, ScraperCommand, TaskLifecycle, TaskStatus,
};

/// Outcome of a task that ingested its output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Records persisted.
    pub records_inserted: u64,
    /// Malformed chunks skipped.
    pub records_skipped: u64,
    /// Store writes performed.
    pub batches: u64,
}

/// Abstraction for running one dispatched task.
///
/// The executor drives the non-terminal transitions through `lifecycle` and
/// returns the outcome. Writing the terminal status and releasing the slot are
/// the scheduler's job, so an executor may return early with `?` on any path.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use resume_ingest::core::{ExecutionError, ExecutionReport, TaskExecutor, TaskLifecycle, TaskStatus};
///
/// #[derive(Clone)]
/// struct NoopExecutor;
///
/// #[async_trait]
/// impl TaskExecutor for NoopExecutor {
///     async fn execute(&self, lifecycle: &mut TaskLifecycle) -> Result<ExecutionReport, ExecutionError> {
///         lifecycle.advance(TaskStatus::Scraping).await?;
///         lifecycle.advance(TaskStatus::Committing).await?;
///         Ok(ExecutionReport::default())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor: Send + Sync + Clone + 'static {
    /// Run the task tracked by `lifecycle` up to, but not including, its
    /// terminal status.
    async fn execute(&self, lifecycle: &mut TaskLifecycle) -> Result<ExecutionReport, ExecutionError>;
}

/// Runs the external scraper and commits its output.
#[derive(Clone)]
pub struct ScraperExecutor {
    command: Arc<ScraperCommand>,
    pipeline: IngestPipeline,
    retain_logs: bool,
}

impl ScraperExecutor {
    /// Create an executor from a scraper command and an ingestion pipeline.
    pub fn new(command: ScraperCommand, pipeline: IngestPipeline) -> Self {
        Self {
            command: Arc::new(command),
            pipeline,
            retain_logs: true,
        }
    }

    /// Remove the log after a fully successful ingestion when `false`.
    #[must_use]
    pub const fn with_retain_logs(mut self, retain_logs: bool) -> Self {
        self.retain_logs = retain_logs;
        self
    }
}

#[async_trait]
impl TaskExecutor for ScraperExecutor {
    async fn execute(&self, lifecycle: &mut TaskLifecycle) -> Result<ExecutionReport, ExecutionError> {
        lifecycle.advance(TaskStatus::Scraping).await?;
        let task_id = lifecycle.task_id().clone();

        // Parameters are read from the store right before launch so edits made
        // after submission are honoured.
        let task = lifecycle
            .recorder()
            .tasks()
            .get(&task_id)
            .await?
            .ok_or_else(|| ExecutionError::Store(format!("task {task_id} missing from task store")))?;
        let parameters = serde_json::to_string(&task.scraper_parameters())
            .map_err(|e| ExecutionError::Unknown(format!("cannot serialize parameters: {e}")))?;
        let log_path = task.log_location;

        tracing::info!(
            task_id = %task_id,
            program = %self.command.program().display(),
            log = %log_path.display(),
            "launching scraper"
        );
        let output = self.command.run(&parameters, &log_path).await?;
        if !output.success {
            tracing::warn!(task_id = %task_id, code = ?output.code, "scraper failed");
            return Err(ExecutionError::Process {
                code: output.code,
                stderr: output.stderr,
            });
        }
        if !output.stderr.is_empty() {
            tracing::debug!(task_id = %task_id, stderr = %output.stderr, "scraper stderr");
        }

        lifecycle.advance(TaskStatus::Committing).await?;
        let report = self.pipeline.ingest_file(&log_path, &task_id).await?;
        if !report.is_clean() {
            return Err(ExecutionError::Store(format!(
                "{} of {} batches failed to persist ({} records lost, {} inserted): {}",
                report.failed_batches,
                report.batches,
                report.failed_records,
                report.inserted,
                report.first_failure.as_deref().unwrap_or("unknown error"),
            )));
        }

        if !self.retain_logs {
            if let Err(e) = tokio::fs::remove_file(&log_path).await {
                tracing::warn!(task_id = %task_id, "failed to remove scraper log: {e}");
            }
        }

        Ok(ExecutionReport {
            records_inserted: report.inserted,
            records_skipped: report.skipped,
            batches: report.batches,
        })
    }
}
