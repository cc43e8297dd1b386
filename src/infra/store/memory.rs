//! In-memory document store.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::Collections;
use crate::core::{Document, DocumentStore, StoreError};

/// Document store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Collections>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `field` unique within `collection`.
    #[must_use]
    pub fn with_unique_key(self, collection: &str, field: &str) -> Self {
        self.inner.write().add_unique_key(collection, field);
        self
    }

    /// Number of documents in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.inner.read().all(collection).len()
    }

    /// Whether `collection` holds no documents.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert(&self, collection: &str, document: Document) -> Result<String, StoreError> {
        let mut ids = self.insert_batch(collection, vec![document]).await?;
        ids.pop()
            .ok_or_else(|| StoreError::Unavailable("insert returned no identity".into()))
    }

    async fn insert_batch(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<String>, StoreError> {
        let mut inner = self.inner.write();
        let prepared = inner.prepare(collection, documents)?;
        Ok(inner.commit(collection, prepared))
    }

    async fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError> {
        Ok(self.inner.read().find(collection, filter))
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Document,
        fields: Document,
    ) -> Result<u64, StoreError> {
        self.inner.write().update(collection, filter, &fields)
    }
}
