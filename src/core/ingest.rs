//! Turns captured scraper output into persisted records.
//!
//! Two framings are supported. `LineDelimited` expects one JSON object per
//! line and writes in batches of `batch_size`, with a final flush for the
//! remainder. `Accumulate` concatenates lines until they form one JSON value
//! and writes each record as soon as it parses.
//!
//! Malformed chunks are counted and dropped; they never abort ingestion.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::core::{Document, DocumentStore, IngestError, TaskId};
use crate::util::clock::now_rfc3339;

/// Field stamped on every record with its ingestion time.
pub const INGESTED_AT_FIELD: &str = "ingested_at";
/// Field stamped on every record with the task that produced it.
pub const SOURCE_TASK_FIELD: &str = "source_task_id";

/// How record boundaries are found in the captured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// One JSON object per line, flushed in batches.
    #[default]
    LineDelimited,
    /// JSON objects possibly spanning several lines.
    Accumulate,
}

/// Tuning for the pipeline.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Record boundary detection.
    pub framing: Framing,
    /// Records per `insert_batch` call in line-delimited mode.
    pub batch_size: usize,
    /// Largest accumulation buffer kept before it is discarded as malformed.
    pub max_buffer_bytes: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            framing: Framing::LineDelimited,
            batch_size: 10,
            max_buffer_bytes: 1024 * 1024,
        }
    }
}

/// Counters describing one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Records accepted by the store.
    pub inserted: u64,
    /// Malformed chunks dropped.
    pub skipped: u64,
    /// Store writes attempted.
    pub batches: u64,
    /// Store writes that failed.
    pub failed_batches: u64,
    /// Records lost to failed store writes.
    pub failed_records: u64,
    /// Message of the first failed write.
    pub first_failure: Option<String>,
}

impl IngestReport {
    /// Whether every attempted write succeeded.
    pub const fn is_clean(&self) -> bool {
        self.failed_batches == 0
    }
}

/// Parses captured output and writes records to a collection.
#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<dyn DocumentStore>,
    collection: String,
    settings: IngestSettings,
}

impl IngestPipeline {
    /// Create a pipeline writing into `collection`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            settings,
        }
    }

    /// Active settings.
    pub const fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Ingest the log file at `path`.
    pub async fn ingest_file(&self, path: &Path, task_id: &TaskId) -> Result<IngestReport, IngestError> {
        let file = tokio::fs::File::open(path).await?;
        self.ingest_reader(BufReader::new(file), task_id).await
    }

    /// Ingest everything readable from `reader`.
    pub async fn ingest_reader<R>(&self, reader: R, task_id: &TaskId) -> Result<IngestReport, IngestError>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let report = match self.settings.framing {
            Framing::LineDelimited => self.ingest_lines(reader, task_id).await?,
            Framing::Accumulate => self.ingest_accumulated(reader, task_id).await?,
        };
        tracing::info!(
            task_id = %task_id,
            inserted = report.inserted,
            skipped = report.skipped,
            batches = report.batches,
            failed_batches = report.failed_batches,
            "ingestion finished"
        );
        Ok(report)
    }

    async fn ingest_lines<R>(&self, mut reader: R, task_id: &TaskId) -> Result<IngestReport, IngestError>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let batch_size = self.settings.batch_size.max(1);
        let mut report = IngestReport::default();
        let mut batch = Vec::with_capacity(batch_size);
        let mut line = Vec::new();
        let mut line_no = 0_u64;

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    // keep what already parsed before giving up on the stream
                    if !batch.is_empty() {
                        self.flush(batch, task_id, &mut report).await;
                    }
                    return Err(e.into());
                }
            }
            line_no += 1;
            if is_blank(&line) {
                continue;
            }
            match serde_json::from_slice::<Value>(&line) {
                Ok(Value::Object(record)) => {
                    batch.push(record);
                    if batch.len() >= batch_size {
                        self.flush(std::mem::take(&mut batch), task_id, &mut report).await;
                    }
                }
                Ok(_) | Err(_) => {
                    report.skipped += 1;
                    tracing::warn!(task_id = %task_id, line = line_no, "skipping malformed record");
                }
            }
        }

        if !batch.is_empty() {
            self.flush(batch, task_id, &mut report).await;
        }
        Ok(report)
    }

    async fn ingest_accumulated<R>(&self, mut reader: R, task_id: &TaskId) -> Result<IngestReport, IngestError>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let mut report = IngestReport::default();
        let mut acc = RecordAccumulator::new(self.settings.max_buffer_bytes);
        let mut line = Vec::new();

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            let Ok(text) = std::str::from_utf8(&line) else {
                acc.reject_line();
                continue;
            };
            if let Some(record) = acc.push_line(text.trim_end_matches(['\r', '\n'])) {
                self.flush(vec![record], task_id, &mut report).await;
            }
        }

        report.skipped = acc.finish();
        Ok(report)
    }

    async fn flush(&self, mut records: Vec<Document>, task_id: &TaskId, report: &mut IngestReport) {
        let ingested_at = now_rfc3339();
        for record in &mut records {
            record.insert(INGESTED_AT_FIELD.into(), Value::String(ingested_at.clone()));
            record.insert(SOURCE_TASK_FIELD.into(), Value::String(task_id.to_string()));
        }

        let count = records.len() as u64;
        report.batches += 1;
        let result = if self.settings.framing == Framing::Accumulate {
            self.store
                .insert(&self.collection, records.remove(0))
                .await
                .map(|_| ())
        } else {
            self.store
                .insert_batch(&self.collection, records)
                .await
                .map(|_| ())
        };

        match result {
            Ok(()) => {
                report.inserted += count;
                tracing::debug!(task_id = %task_id, count, collection = %self.collection, "persisted batch");
            }
            Err(e) => {
                report.failed_batches += 1;
                report.failed_records += count;
                tracing::error!(task_id = %task_id, count, "failed to persist batch: {e}");
                if report.first_failure.is_none() {
                    report.first_failure = Some(e.to_string());
                }
            }
        }
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

enum Chunk {
    Object(Document),
    NotObject,
    Incomplete,
    Invalid,
}

fn classify(text: &str) -> Chunk {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(record)) => Chunk::Object(record),
        Ok(_) => Chunk::NotObject,
        Err(e) if e.is_eof() => Chunk::Incomplete,
        Err(_) => Chunk::Invalid,
    }
}

/// Buffer that collects lines until they form one JSON object.
///
/// A buffer that fails with a syntax error can never be completed by more
/// input, so it is dropped and accumulation restarts at the current line.
pub struct RecordAccumulator {
    buffer: String,
    max_bytes: usize,
    skipped: u64,
}

impl RecordAccumulator {
    /// Create an accumulator that gives up on buffers larger than `max_bytes`.
    pub const fn new(max_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            max_bytes,
            skipped: 0,
        }
    }

    /// Feed one line; returns a record once the buffer parses.
    pub fn push_line(&mut self, line: &str) -> Option<Document> {
        if self.buffer.is_empty() && line.trim().is_empty() {
            return None;
        }
        let had_prefix = !self.buffer.is_empty();
        self.buffer.push_str(line);
        self.buffer.push('\n');

        match classify(&self.buffer) {
            Chunk::Object(record) => {
                self.buffer.clear();
                Some(record)
            }
            Chunk::NotObject => {
                self.discard();
                None
            }
            Chunk::Incomplete => {
                if self.buffer.len() > self.max_bytes {
                    self.discard();
                }
                None
            }
            Chunk::Invalid if had_prefix => {
                self.discard();
                self.push_line(line)
            }
            Chunk::Invalid => {
                self.discard();
                None
            }
        }
    }

    /// Drop a line that is not valid UTF-8 along with any record it
    /// interrupts. Counts as one skipped chunk.
    pub fn reject_line(&mut self) {
        tracing::warn!(bytes = self.buffer.len(), "dropping line with invalid UTF-8");
        self.buffer.clear();
        self.skipped += 1;
    }

    /// Chunks dropped so far.
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }

    /// End of input; a leftover partial record counts as skipped. Returns the
    /// total skipped count.
    pub fn finish(mut self) -> u64 {
        if !self.buffer.trim().is_empty() {
            self.discard();
        }
        self.skipped
    }

    fn discard(&mut self) {
        tracing::warn!(bytes = self.buffer.len(), "dropping malformed record buffer");
        self.buffer.clear();
        self.skipped += 1;
    }
}
