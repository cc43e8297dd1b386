//! Core scheduling abstractions, the task state machine and the ingestion
//! pipeline.

pub mod error;
pub mod executor;
pub mod ingest;
pub mod lifecycle;
pub mod process;
pub mod queue;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod task;

pub use error::{AppResult, ExecutionError, IngestError, SchedulerError, StoreError};
pub use executor::{ExecutionReport, ScraperExecutor, TaskExecutor};
pub use ingest::{Framing, IngestPipeline, IngestReport, IngestSettings, RecordAccumulator};
pub use lifecycle::{StatusRecorder, TaskLifecycle};
pub use process::{ProcessOutput, ScraperCommand};
pub use queue::{StatusBoard, TaskQueue};
pub use scheduler::{Admission, Scheduler, SchedulerLimits, ShutdownReport, Spawn};
pub use status::{StatusLookup, StatusReporter};
pub use store::{DocumentStore, TaskStore};
pub use task::{Document, Task, TaskId, TaskStatus, UnknownStatus, STORE_ID_FIELD};
