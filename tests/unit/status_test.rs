//! Tests for status lookups and the lifecycle recorder

use std::path::Path;
use std::sync::Arc;

use resume_ingest::core::{
    Document, ExecutionError, ExecutionReport, SchedulerError, StatusBoard, StatusLookup,
    StatusRecorder, StatusReporter, Task, TaskId, TaskLifecycle, TaskStatus, TaskStore,
};
use resume_ingest::infra::{InMemoryStatusBoard, InMemoryStore};
use serde_json::json;

async fn recorder_with_task(id: &str) -> (Arc<StatusRecorder>, Arc<InMemoryStatusBoard>) {
    let board = Arc::new(InMemoryStatusBoard::default());
    let tasks = TaskStore::new(Arc::new(InMemoryStore::new()), "task");
    tasks
        .create(&Task::pending(TaskId::from(id), Document::new(), Path::new("logs")))
        .await
        .unwrap();
    (Arc::new(StatusRecorder::new(board.clone(), tasks)), board)
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let reporter = StatusReporter::new(Arc::new(InMemoryStatusBoard::default()));
    let lookup = reporter.get_status(&TaskId::from("does-not-exist")).await.unwrap();
    assert_eq!(lookup, StatusLookup::NotFound);
    assert_eq!(lookup.status(), None);
}

#[tokio::test]
async fn test_reporter_reads_latest_cell() {
    let board = Arc::new(InMemoryStatusBoard::default());
    let id = TaskId::from("t");
    board.set_status(&id, TaskStatus::Pending).await.unwrap();
    board.set_status(&id, TaskStatus::Scraping).await.unwrap();

    let reporter = StatusReporter::new(board);
    assert_eq!(
        reporter.get_status(&id).await.unwrap(),
        StatusLookup::Found(TaskStatus::Scraping)
    );
}

#[tokio::test]
async fn test_lifecycle_happy_path_writes_both_sinks() {
    let (recorder, board) = recorder_with_task("t").await;
    let id = TaskId::from("t");
    let mut lifecycle = TaskLifecycle::new(id.clone(), recorder.clone());

    lifecycle.advance(TaskStatus::Scraping).await.unwrap();
    lifecycle.advance(TaskStatus::Committing).await.unwrap();
    let report = ExecutionReport {
        records_inserted: 4,
        records_skipped: 1,
        batches: 1,
    };
    let status = lifecycle.finish(&Ok(report)).await;

    assert_eq!(status, TaskStatus::Finished);
    assert_eq!(board.get_status(&id).await.unwrap(), Some(TaskStatus::Finished));
    let task = recorder.tasks().get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Finished);
    assert_eq!(task.records_inserted, Some(4));
    assert_eq!(task.records_skipped, Some(1));
    assert!(task.finished_at.is_some());
}

#[tokio::test]
async fn test_lifecycle_rejects_skipping_states() {
    let (recorder, _) = recorder_with_task("t").await;
    let mut lifecycle = TaskLifecycle::new(TaskId::from("t"), recorder);

    let result = lifecycle.advance(TaskStatus::Committing).await;
    assert!(matches!(result, Err(SchedulerError::InvalidTransition { .. })));
    assert!(lifecycle.advance(TaskStatus::Finished).await.is_err());
    assert_eq!(lifecycle.current(), TaskStatus::Pending);
}

#[tokio::test]
async fn test_unreachable_failure_falls_back_to_unknown_error() {
    let (recorder, _) = recorder_with_task("t").await;
    let mut lifecycle = TaskLifecycle::new(TaskId::from("t"), recorder.clone());
    lifecycle.advance(TaskStatus::Scraping).await.unwrap();

    // a format failure cannot happen before committing
    let outcome = Err(ExecutionError::from(
        resume_ingest::core::IngestError::Io(std::io::Error::other("eof")),
    ));
    assert_eq!(lifecycle.finish(&outcome).await, TaskStatus::UnknownError);

    let task = recorder.tasks().get(&TaskId::from("t")).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::UnknownError);
    assert_eq!(task.error.as_deref(), Some("failed to read scraper output: eof"));
}

#[tokio::test]
async fn test_finish_twice_keeps_first_terminal() {
    let (recorder, _) = recorder_with_task("t").await;
    let mut lifecycle = TaskLifecycle::new(TaskId::from("t"), recorder);
    lifecycle.advance(TaskStatus::Scraping).await.unwrap();

    let failed = Err(ExecutionError::Process {
        code: Some(1),
        stderr: String::new(),
    });
    assert_eq!(lifecycle.finish(&failed).await, TaskStatus::ProcessError);
    assert_eq!(
        lifecycle.finish(&Ok(ExecutionReport::default())).await,
        TaskStatus::ProcessError
    );
}

#[tokio::test]
async fn test_recorder_survives_missing_task_document() {
    let board = Arc::new(InMemoryStatusBoard::default());
    let tasks = TaskStore::new(Arc::new(InMemoryStore::new()), "task");
    let recorder = StatusRecorder::new(board.clone(), tasks);
    let id = TaskId::from("ghost");

    let mut extra = Document::new();
    extra.insert("note".into(), json!("x"));
    recorder.record(&id, TaskStatus::UnknownError, extra).await;
    assert_eq!(board.get_status(&id).await.unwrap(), Some(TaskStatus::UnknownError));
}
