//! Tests for builder modules

use resume_ingest::builders::{build_service, build_store, TASK_UNIQUE_KEY};
use resume_ingest::config::{ServiceConfig, StoreBackendConfig};
use resume_ingest::core::{Document, DocumentStore, StoreError, TaskQueue};
use serde_json::json;

#[tokio::test]
async fn test_build_service_in_memory() {
    let cfg = ServiceConfig::default();
    let service = build_service(&cfg).await.unwrap();
    assert_eq!(service.scheduler().queue().max_running(), 3);
    assert_eq!(service.tasks().collection(), "task");
}

#[tokio::test]
async fn test_build_service_rejects_invalid_config() {
    let cfg = ServiceConfig {
        max_running_tasks: 0,
        ..ServiceConfig::default()
    };
    assert!(build_service(&cfg).await.is_err());
}

#[tokio::test]
async fn test_file_store_enforces_task_uniqueness() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ServiceConfig {
        store: StoreBackendConfig::File,
        store_path: dir.path().join("data"),
        ..ServiceConfig::default()
    };
    let store = build_store(&cfg).unwrap();

    let mut task = Document::new();
    task.insert(TASK_UNIQUE_KEY.into(), json!("t-1"));
    store.insert("task", task.clone()).await.unwrap();
    assert!(matches!(
        store.insert("task", task).await,
        Err(StoreError::DuplicateKey { .. })
    ));
    assert!(dir.path().join("data").join("task.jsonl").exists());
}
