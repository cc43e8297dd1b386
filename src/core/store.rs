//! Document store seam and the task-collection view on top of it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{Document, StoreError, Task, TaskId};

/// Abstraction for the persistent document store.
///
/// Filters are equality matches on top-level fields; an empty filter matches
/// every document. Updates have `$set` semantics: listed fields are
/// overwritten, others are left alone.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one document and return the identity assigned by the store.
    async fn insert(&self, collection: &str, document: Document) -> Result<String, StoreError>;

    /// Insert many documents at once. Either all are accepted or none are.
    async fn insert_batch(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<String>, StoreError>;

    /// All documents matching `filter`, in insertion order.
    async fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError>;

    /// Merge `fields` into every document matching `filter`; returns the
    /// number of matched documents.
    async fn update(
        &self,
        collection: &str,
        filter: &Document,
        fields: Document,
    ) -> Result<u64, StoreError>;

    /// First document matching `filter`.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.find(collection, filter).await?.into_iter().next())
    }
}

/// Task-collection view over a [`DocumentStore`].
#[derive(Clone)]
pub struct TaskStore {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl TaskStore {
    /// Create a view on `collection` of `store`.
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Collection holding task documents.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn by_id(task_id: &TaskId) -> Document {
        let mut filter = Document::new();
        filter.insert("task_id".into(), Value::String(task_id.to_string()));
        filter
    }

    /// Persist a newly submitted task.
    pub async fn create(&self, task: &Task) -> Result<(), StoreError> {
        let document: Document = serde_json::from_value(serde_json::to_value(task)?)?;
        self.store.insert(&self.collection, document).await?;
        Ok(())
    }

    /// Load a task by id.
    pub async fn get(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.store
            .find_one(&self.collection, &Self::by_id(task_id))
            .await?
            .map(|doc| serde_json::from_value(Value::Object(doc)).map_err(StoreError::from))
            .transpose()
    }

    /// Merge `fields` into the task document.
    pub async fn update(&self, task_id: &TaskId, fields: Document) -> Result<(), StoreError> {
        let matched = self
            .store
            .update(&self.collection, &Self::by_id(task_id), fields)
            .await?;
        if matched == 0 {
            return Err(StoreError::NotFound(format!("task {task_id}")));
        }
        Ok(())
    }
}
