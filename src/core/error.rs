//! Error types for scheduler, store, ingestion and execution.

use std::time::Duration;

use thiserror::Error;

use super::TaskStatus;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Pending queue is at its configured depth.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// Queue or status backend failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// Task store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// A status write would violate the task state machine.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },
    /// Configuration rejected during validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors produced by document store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key would be duplicated.
    #[error("duplicate key in `{collection}`: {field} = {value}")]
    DuplicateKey {
        /// Collection name.
        collection: String,
        /// Unique field.
        field: String,
        /// Offending value.
        value: String,
    },
    /// No document matched.
    #[error("not found: {0}")]
    NotFound(String),
    /// Store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Filesystem failure in a file-backed store.
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    /// Document could not be (de)serialized.
    #[error("store serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Unrecoverable ingestion failures. Per-record parse failures are counted,
/// never raised.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The captured log could not be opened or read.
    #[error("failed to read scraper output: {0}")]
    Io(#[from] std::io::Error),
}

/// Ways a single task execution can fail. Each maps to one terminal status.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Scraper exited with a non-zero code or was killed by a signal.
    #[error("scraper exited with {}: {stderr}", describe_exit(.code))]
    Process {
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Tail of the captured stderr.
        stderr: String,
    },
    /// Scraper exceeded its time budget and was killed.
    #[error("scraper timed out after {0:?}")]
    TimedOut(Duration),
    /// Captured output could not be ingested.
    #[error(transparent)]
    Format(#[from] IngestError),
    /// Store reads or writes failed.
    #[error("store failure: {0}")]
    Store(String),
    /// Scraper could not be started or its log could not be created.
    #[error("failed to launch scraper: {0}")]
    Spawn(String),
    /// Execution was cancelled during shutdown.
    #[error("cancelled during shutdown")]
    Cancelled,
    /// Executor panicked.
    #[error("executor panicked: {0}")]
    Panicked(String),
    /// Anything else.
    #[error("{0}")]
    Unknown(String),
}

#[allow(clippy::ref_option)]
fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_owned(), |c| format!("code {c}"))
}

impl ExecutionError {
    /// Terminal status recorded for this failure.
    pub const fn terminal_status(&self) -> TaskStatus {
        match self {
            Self::Process { .. } | Self::TimedOut(_) => TaskStatus::ProcessError,
            Self::Format(_) => TaskStatus::FormatError,
            Self::Store(_)
            | Self::Spawn(_)
            | Self::Cancelled
            | Self::Panicked(_)
            | Self::Unknown(_) => TaskStatus::UnknownError,
        }
    }
}

impl From<StoreError> for ExecutionError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<SchedulerError> for ExecutionError {
    fn from(err: SchedulerError) -> Self {
        Self::Unknown(err.to_string())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
