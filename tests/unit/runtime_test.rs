//! Tests for the tokio spawner and the service facade

use std::sync::Arc;

use resume_ingest::builders::build_service_with;
use resume_ingest::config::ServiceConfig;
use resume_ingest::core::{
    Document, DocumentStore, ScraperExecutor, SchedulerError, Spawn, TaskId, TaskQueue, TaskStatus,
};
use resume_ingest::infra::{InMemoryQueue, InMemoryStatusBoard, InMemoryStore};
use resume_ingest::runtime::tokio_spawner::TokioSpawner;
use resume_ingest::runtime::{api, ScrapeService};
use serde_json::json;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_try_current_outside_runtime() {
    assert!(TokioSpawner::try_current().is_none());
}

fn service(
    max_depth: usize,
) -> (
    ScrapeService<ScraperExecutor, TokioSpawner>,
    Arc<InMemoryStore>,
    Arc<InMemoryQueue>,
) {
    let cfg = ServiceConfig::default();
    let store = Arc::new(InMemoryStore::new().with_unique_key("task", "task_id"));
    let queue = Arc::new(InMemoryQueue::new(cfg.max_running_tasks, max_depth));
    let service = build_service_with(
        &cfg,
        queue.clone(),
        Arc::new(InMemoryStatusBoard::default()),
        store.clone(),
    )
    .unwrap();
    (service, store, queue)
}

fn params() -> Document {
    json!({"keyword": "rust", "pages": 2}).as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_submit_registers_pending_task() {
    let (service, store, queue) = service(10);

    let submitted = service.submit(params()).await.unwrap();
    assert_eq!(submitted.message, api::SUBMITTED_MESSAGE);

    let status = service.status(&submitted.task_id).await.unwrap();
    assert_eq!(status.status, "Pending");
    assert_eq!(status.parsed(), Some(TaskStatus::Pending));
    assert!(status.message.is_none());

    assert_eq!(store.len("task"), 1);
    let task = service.tasks().get(&submitted.task_id).await.unwrap().unwrap();
    assert_eq!(task.parameters, params());
    assert_eq!(task.status, TaskStatus::Pending);

    assert_eq!(queue.pending_len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_status_of_unknown_task() {
    let (service, _, _) = service(10);
    let status = service.status(&TaskId::from("does-not-exist")).await.unwrap();
    assert_eq!(status.status, "None");
    assert_eq!(status.message.as_deref(), Some("Task not found."));
    assert_eq!(status.parsed(), None);
}

#[tokio::test]
async fn test_rejected_submission_is_reported() {
    let (service, store, _) = service(1);
    service.submit(params()).await.unwrap();

    let result = service.submit(params()).await;
    assert!(matches!(result, Err(SchedulerError::QueueFull(_))));

    let mut filter = Document::new();
    filter.insert("status".into(), json!("UnknownError"));
    let rejected = store.find("task", &filter).await.unwrap();
    assert_eq!(rejected.len(), 1);
}

#[tokio::test]
async fn test_health_reports_queue_gauges() {
    let (service, _, _) = service(10);
    service.submit(params()).await.unwrap();

    let health = service.health().await;
    assert!(health.ok);
    assert_eq!(health.running, Some(0));
    assert_eq!(health.pending, Some(1));
}

#[tokio::test]
async fn test_submit_after_shutdown_is_refused() {
    let (service, _, _) = service(10);
    let report = service.shutdown().await;
    assert!(report.drained);
    assert!(service.submit(params()).await.is_err());
}
