//! Document store backends.
//!
//! Both backends keep their documents in a [`Collections`] set, which owns
//! identity assignment, unique-key enforcement and filter matching. The file
//! backend adds JSONL persistence on top.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use uuid::Uuid;

use crate::core::{Document, StoreError, STORE_ID_FIELD};

pub mod file;
pub mod memory;

pub use file::JsonlStore;
pub use memory::InMemoryStore;

/// Equality match of every filter field against `document`.
pub fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

/// Documents of one collection plus an index of every unique field.
#[derive(Debug, Default)]
struct Collection {
    documents: Vec<Document>,
    /// Unique field -> serialized values currently held.
    indexes: HashMap<String, HashSet<String>>,
}

impl Collection {
    fn ensure_index(&mut self, field: &str) {
        if self.indexes.contains_key(field) {
            return;
        }
        let values = self
            .documents
            .iter()
            .filter_map(|doc| doc.get(field).map(Value::to_string))
            .collect();
        self.indexes.insert(field.to_owned(), values);
    }

    fn index(&mut self, doc: &Document) {
        for (field, values) in &mut self.indexes {
            if let Some(value) = doc.get(field) {
                values.insert(value.to_string());
            }
        }
    }

    fn unindex(&mut self, doc: &Document) {
        for (field, values) in &mut self.indexes {
            if let Some(value) = doc.get(field) {
                values.remove(&value.to_string());
            }
        }
    }

    fn holds(&self, field: &str, value: &Value) -> bool {
        self.indexes
            .get(field)
            .is_some_and(|values| values.contains(&value.to_string()))
    }
}

/// An update that passed unique-key checks but has not been applied.
#[derive(Debug)]
pub struct StagedUpdate {
    collection: String,
    positions: Vec<usize>,
    fields: Document,
}

impl StagedUpdate {
    /// Number of documents the update will change.
    pub fn matched(&self) -> u64 {
        self.positions.len() as u64
    }
}

/// Named collections of documents with per-collection unique keys.
#[derive(Debug, Default)]
pub struct Collections {
    collections: HashMap<String, Collection>,
    unique_keys: HashMap<String, Vec<String>>,
}

impl Collections {
    /// Declare `field` unique within `collection`.
    pub fn add_unique_key(&mut self, collection: &str, field: &str) {
        let keys = self.unique_keys.entry(collection.to_owned()).or_default();
        if !keys.iter().any(|k| k == field) {
            keys.push(field.to_owned());
        }
        if let Some(existing) = self.collections.get_mut(collection) {
            existing.ensure_index(field);
        }
    }

    /// Unique fields of `collection`, `_id` included.
    fn unique_fields(&self, collection: &str) -> Vec<&str> {
        let mut fields = vec![STORE_ID_FIELD];
        if let Some(keys) = self.unique_keys.get(collection) {
            fields.extend(keys.iter().map(String::as_str));
        }
        fields
    }

    fn collection_mut(&mut self, name: &str) -> &mut Collection {
        let keys = self.unique_keys.get(name);
        self.collections.entry(name.to_owned()).or_insert_with(|| {
            let mut created = Collection::default();
            created.ensure_index(STORE_ID_FIELD);
            for key in keys.into_iter().flatten() {
                created.ensure_index(key);
            }
            created
        })
    }

    /// Assign identities and check unique keys for a batch without storing it.
    ///
    /// Conflicts are checked against stored documents and within the batch.
    pub fn prepare(
        &self,
        collection: &str,
        mut batch: Vec<Document>,
    ) -> Result<Vec<Document>, StoreError> {
        for doc in &mut batch {
            if !doc.contains_key(STORE_ID_FIELD) {
                doc.insert(
                    STORE_ID_FIELD.into(),
                    Value::String(Uuid::new_v4().to_string()),
                );
            }
        }

        let existing = self.collections.get(collection);
        for field in self.unique_fields(collection) {
            let mut seen = HashSet::new();
            for doc in &batch {
                let Some(value) = doc.get(field) else {
                    continue;
                };
                let stored = existing.is_some_and(|c| c.holds(field, value));
                if stored || !seen.insert(value.to_string()) {
                    return Err(duplicate(collection, field, value));
                }
            }
        }
        Ok(batch)
    }

    /// Append prepared documents and return their identities.
    pub fn commit(&mut self, collection: &str, batch: Vec<Document>) -> Vec<String> {
        let ids = batch.iter().map(document_id).collect();
        let target = self.collection_mut(collection);
        for doc in batch {
            target.index(&doc);
            target.documents.push(doc);
        }
        ids
    }

    /// Documents of `collection` matching `filter`.
    pub fn find(&self, collection: &str, filter: &Document) -> Vec<Document> {
        self.all(collection)
            .iter()
            .filter(|doc| matches(doc, filter))
            .cloned()
            .collect()
    }

    /// Check an update against unique keys without modifying anything.
    ///
    /// Rejects updates that would give a unique field a value another document
    /// already holds, or the same value to several matches.
    pub fn stage_update(
        &self,
        collection: &str,
        filter: &Document,
        fields: Document,
    ) -> Result<StagedUpdate, StoreError> {
        let documents = self.all(collection);
        let positions: Vec<usize> = documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| matches(doc, filter))
            .map(|(i, _)| i)
            .collect();

        if let Some(existing) = self.collections.get(collection) {
            for field in self.unique_fields(collection) {
                let Some(value) = fields.get(field) else {
                    continue;
                };
                if positions.is_empty() {
                    continue;
                }
                let clash = positions.len() > 1
                    || (existing.holds(field, value)
                        && documents.iter().enumerate().any(|(i, doc)| {
                            positions.binary_search(&i).is_err() && doc.get(field) == Some(value)
                        }));
                if clash {
                    return Err(duplicate(collection, field, value));
                }
            }
        }

        Ok(StagedUpdate {
            collection: collection.to_owned(),
            positions,
            fields,
        })
    }

    /// Documents of the staged collection as they read once `staged` applies.
    pub fn staged_documents(&self, staged: &StagedUpdate) -> Vec<Document> {
        let mut documents = self.all(&staged.collection).to_vec();
        for &i in &staged.positions {
            if let Some(doc) = documents.get_mut(i) {
                merge(doc, &staged.fields);
            }
        }
        documents
    }

    /// Apply a staged update and return the match count.
    pub fn apply_update(&mut self, staged: StagedUpdate) -> u64 {
        let Some(target) = self.collections.get_mut(&staged.collection) else {
            return 0;
        };
        for &i in &staged.positions {
            let Some(mut doc) = target.documents.get_mut(i).map(std::mem::take) else {
                continue;
            };
            target.unindex(&doc);
            merge(&mut doc, &staged.fields);
            target.index(&doc);
            target.documents[i] = doc;
        }
        staged.matched()
    }

    /// Merge `fields` into every match and return the match count. Nothing is
    /// modified when a unique key would clash.
    pub fn update(
        &mut self,
        collection: &str,
        filter: &Document,
        fields: &Document,
    ) -> Result<u64, StoreError> {
        let staged = self.stage_update(collection, filter, fields.clone())?;
        Ok(self.apply_update(staged))
    }

    /// All documents of `collection`.
    pub fn all(&self, collection: &str) -> &[Document] {
        self.collections
            .get(collection)
            .map_or(&[], |c| c.documents.as_slice())
    }
}

fn merge(doc: &mut Document, fields: &Document) {
    for (key, value) in fields {
        doc.insert(key.clone(), value.clone());
    }
}

fn duplicate(collection: &str, field: &str, value: &Value) -> StoreError {
    StoreError::DuplicateKey {
        collection: collection.to_owned(),
        field: field.to_owned(),
        value: value.to_string(),
    }
}

fn document_id(doc: &Document) -> String {
    match doc.get(STORE_ID_FIELD) {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
