//! File-backed document store using JSON lines for durability.
//!
//! Each collection is one `<collection>.jsonl` file under the store directory.
//! Inserts append; updates rewrite the collection file. Memory only changes
//! once the disk write succeeded.

use std::fs::{create_dir_all, read_dir, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::Collections;
use crate::core::{Document, DocumentStore, StoreError};

/// Document store persisted as JSONL files.
pub struct JsonlStore {
    path: PathBuf,
    inner: Mutex<Collections>,
}

impl JsonlStore {
    /// Open the store at `path`, creating the directory and loading any
    /// existing collections.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        create_dir_all(&path)?;
        let mut collections = Collections::default();
        for entry in read_dir(&path)? {
            let file_path = entry?.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(name) = file_path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let documents = Self::load_collection(&file_path)?;
            tracing::debug!(collection = name, documents = documents.len(), "loaded collection");
            collections.commit(name, documents);
        }
        Ok(Self {
            path,
            inner: Mutex::new(collections),
        })
    }

    /// Declare `field` unique within `collection`.
    #[must_use]
    pub fn with_unique_key(self, collection: &str, field: &str) -> Self {
        self.inner.lock().add_unique_key(collection, field);
        self
    }

    /// Directory holding the collection files.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_path(&self, collection: &str) -> PathBuf {
        self.path.join(format!("{collection}.jsonl"))
    }

    /// Read every document of one collection file.
    ///
    /// A final line that does not parse is a write torn by a crash; it is cut
    /// off so later appends start on a clean line. Corruption anywhere else
    /// is an error.
    fn load_collection(file_path: &Path) -> Result<Vec<Document>, StoreError> {
        let bytes = std::fs::read(file_path)?;
        let mut documents = Vec::new();
        let mut offset = 0;
        for line in bytes.split_inclusive(|b| *b == b'\n') {
            let end = offset + line.len();
            if !line.iter().all(u8::is_ascii_whitespace) {
                match serde_json::from_slice(line) {
                    Ok(doc) => documents.push(doc),
                    Err(e) if end == bytes.len() => {
                        tracing::warn!(
                            path = %file_path.display(),
                            offset,
                            "dropping torn final line: {e}"
                        );
                        OpenOptions::new()
                            .write(true)
                            .open(file_path)?
                            .set_len(offset as u64)?;
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            offset = end;
        }
        Ok(documents)
    }

    fn append_to_disk(&self, collection: &str, documents: &[Document]) -> Result<(), StoreError> {
        let mut buf = String::new();
        for doc in documents {
            buf.push_str(&serde_json::to_string(doc)?);
            buf.push('\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path(collection))?;
        let committed = file.metadata()?.len();
        if let Err(e) = file.write_all(buf.as_bytes()) {
            // cut a partial batch back off so the file matches memory
            if let Err(undo) = file.set_len(committed) {
                tracing::error!(collection, "failed to roll back partial append: {undo}");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn rewrite_disk(&self, collection: &str, documents: &[Document]) -> Result<(), StoreError> {
        let target = self.file_path(collection);
        let staging = self.path.join(format!("{collection}.jsonl.tmp"));
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&staging)?;
            for doc in documents {
                writeln!(file, "{}", serde_json::to_string(doc)?)?;
            }
            file.sync_all()?;
        }
        std::fs::rename(staging, target)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonlStore {
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
        let mut inner = self.inner.lock();
        let prepared = inner.prepare(collection, documents)?;
        self.append_to_disk(collection, &prepared)?;
        Ok(inner.commit(collection, prepared))
    }

    async fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError> {
        Ok(self.inner.lock().find(collection, filter))
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Document,
        fields: Document,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let staged = inner.stage_update(collection, filter, fields)?;
        if staged.matched() == 0 {
            return Ok(0);
        }
        self.rewrite_disk(collection, &inner.staged_documents(&staged))?;
        Ok(inner.apply_update(staged))
    }
}
