//! Tests for document store adapters and the task-collection view

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use resume_ingest::core::{
    Document, DocumentStore, StoreError, Task, TaskId, TaskStatus, TaskStore, STORE_ID_FIELD,
};
use resume_ingest::infra::{InMemoryStore, JsonlStore};
use serde_json::{json, Value};

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_insert_assigns_identity() {
    let store = InMemoryStore::new();
    let id = store.insert("resume", doc(json!({"name": "Ada"}))).await.unwrap();
    assert!(!id.is_empty());

    let found = store.find_one("resume", &doc(json!({"name": "Ada"}))).await.unwrap().unwrap();
    assert_eq!(found.get(STORE_ID_FIELD), Some(&Value::String(id)));
}

#[tokio::test]
async fn test_insert_batch_is_all_or_nothing() {
    let store = InMemoryStore::new().with_unique_key("task", "task_id");
    store.insert("task", doc(json!({"task_id": "b"}))).await.unwrap();

    let result = store
        .insert_batch(
            "task",
            vec![doc(json!({"task_id": "a"})), doc(json!({"task_id": "b"}))],
        )
        .await;
    assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
    assert_eq!(store.len("task"), 1);
}

#[tokio::test]
async fn test_update_returns_matched_count() {
    let store = InMemoryStore::new();
    store
        .insert_batch(
            "resume",
            vec![
                doc(json!({"city": "Oslo"})),
                doc(json!({"city": "Oslo"})),
                doc(json!({"city": "Rome"})),
            ],
        )
        .await
        .unwrap();

    let matched = store
        .update("resume", &doc(json!({"city": "Oslo"})), doc(json!({"seen": true})))
        .await
        .unwrap();
    assert_eq!(matched, 2);
    let seen = store.find("resume", &doc(json!({"seen": true}))).await.unwrap();
    assert_eq!(seen.len(), 2);
}

#[tokio::test]
async fn test_task_store_round_trip() {
    let store = Arc::new(InMemoryStore::new().with_unique_key("task", "task_id"));
    let tasks = TaskStore::new(store, "task");

    let task = Task::pending(
        TaskId::from("t-1"),
        doc(json!({"keyword": "rust"})),
        Path::new("logs"),
    );
    tasks.create(&task).await.unwrap();
    assert!(matches!(
        tasks.create(&task).await,
        Err(StoreError::DuplicateKey { .. })
    ));

    let mut fields = Document::new();
    fields.insert("status".into(), json!("Scraping"));
    tasks.update(&task.task_id, fields).await.unwrap();

    let loaded = tasks.get(&task.task_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Scraping);
    assert_eq!(loaded.parameters.get("keyword"), Some(&json!("rust")));
    assert_eq!(loaded.log_location, Path::new("logs").join("t-1.log"));
}

#[tokio::test]
async fn test_task_store_update_unknown_task() {
    let tasks = TaskStore::new(Arc::new(InMemoryStore::new()), "task");
    let result = tasks.update(&TaskId::from("missing"), Document::new()).await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
    assert!(tasks.get(&TaskId::from("missing")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_jsonl_store_persists_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let task = Task::pending(TaskId::from("t-2"), Document::new(), dir.path());
    {
        let store = Arc::new(JsonlStore::open(dir.path()).unwrap());
        TaskStore::new(store, "task").create(&task).await.unwrap();
    }

    assert!(dir.path().join("task.jsonl").exists());
    let store = Arc::new(JsonlStore::open(dir.path()).unwrap());
    let loaded = TaskStore::new(store, "task").get(&task.task_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_bulk_ingest_cost_stays_flat() {
    let store = InMemoryStore::new().with_unique_key("task", "task_id");
    let started = Instant::now();
    for batch in 0..4_000 {
        let records = (0..10)
            .map(|i| doc(json!({"batch": batch, "n": i})))
            .collect();
        store.insert_batch("resume", records).await.unwrap();
    }
    assert_eq!(store.len("resume"), 40_000);
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test]
async fn test_unique_key_tracks_updates() {
    let store = InMemoryStore::new().with_unique_key("task", "task_id");
    store.insert("task", doc(json!({"task_id": "a"}))).await.unwrap();
    store
        .update("task", &doc(json!({"task_id": "a"})), doc(json!({"task_id": "renamed"})))
        .await
        .unwrap();

    store.insert("task", doc(json!({"task_id": "a"}))).await.unwrap();
    let clash = store.insert("task", doc(json!({"task_id": "renamed"}))).await;
    assert!(matches!(clash, Err(StoreError::DuplicateKey { .. })));
}
