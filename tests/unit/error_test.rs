//! Tests for error types

use std::time::Duration;

use resume_ingest::core::{
    ExecutionError, IngestError, SchedulerError, StoreError, TaskStatus,
};

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull("max queue depth reached".to_string());
    assert_eq!(format!("{err}"), "queue full: max queue depth reached");
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{err}"), "backend error: connection failed");
}

#[test]
fn test_invalid_transition_error() {
    let err = SchedulerError::InvalidTransition {
        from: TaskStatus::Finished,
        to: TaskStatus::Scraping,
    };
    assert_eq!(format!("{err}"), "invalid transition from Finished to Scraping");
}

#[test]
fn test_store_error_wraps_into_scheduler_error() {
    let err: SchedulerError = StoreError::NotFound("task x".into()).into();
    assert!(matches!(err, SchedulerError::Store(StoreError::NotFound(_))));
}

#[test]
fn test_terminal_status_mapping() {
    let process = ExecutionError::Process {
        code: Some(1),
        stderr: "boom".into(),
    };
    assert_eq!(process.terminal_status(), TaskStatus::ProcessError);
    assert_eq!(
        ExecutionError::TimedOut(Duration::from_secs(5)).terminal_status(),
        TaskStatus::ProcessError
    );

    let format = ExecutionError::from(IngestError::Io(std::io::Error::other("bad read")));
    assert_eq!(format.terminal_status(), TaskStatus::FormatError);

    for err in [
        ExecutionError::Store("down".into()),
        ExecutionError::Spawn("missing".into()),
        ExecutionError::Cancelled,
        ExecutionError::Panicked("oops".into()),
        ExecutionError::Unknown("?".into()),
    ] {
        assert_eq!(err.terminal_status(), TaskStatus::UnknownError);
    }
}

#[test]
fn test_process_error_mentions_stderr() {
    let err = ExecutionError::Process {
        code: Some(2),
        stderr: "no such site".into(),
    };
    let text = err.to_string();
    assert!(text.contains('2'));
    assert!(text.contains("no such site"));
}
