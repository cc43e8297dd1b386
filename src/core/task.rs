//! Task identity, status vocabulary and the persisted task document.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque key/value document exchanged with the store and the scraper.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Field the store uses for its own record identity.
pub const STORE_ID_FIELD: &str = "_id";

/// Opaque, immutable identifier minted at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Mint a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic log location for this task under `log_dir`.
    pub fn log_path(&self, log_dir: &Path) -> PathBuf {
        log_dir.join(format!("{}.log", self.0))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Status of a task in the scrape-and-commit lifecycle.
///
/// ```text
/// Pending -> Scraping -> Committing -> Finished
///               |            |-------> FormatError
///               |-> ProcessError
/// any non-terminal ---------------> UnknownError
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Submitted and waiting in the pending queue.
    Pending,
    /// Slot reserved, scraper subprocess running.
    #[serde(alias = "Running")]
    Scraping,
    /// Scraper exited cleanly, output being persisted.
    Committing,
    /// All parseable records were persisted.
    Finished,
    /// Scraper exited non-zero, was killed, or timed out.
    ProcessError,
    /// Captured output could not be read.
    FormatError,
    /// Any other failure while scraping or committing.
    UnknownError,
}

impl TaskStatus {
    /// Canonical string written to status cells and the task store.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Scraping => "Scraping",
            Self::Committing => "Committing",
            Self::Finished => "Finished",
            Self::ProcessError => "ProcessError",
            Self::FormatError => "FormatError",
            Self::UnknownError => "UnknownError",
        }
    }

    /// Whether no further transition can leave this status.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished | Self::ProcessError | Self::FormatError | Self::UnknownError
        )
    }

    /// Whether `next` may directly follow `self`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Scraping)
                | (Self::Scraping, Self::Committing)
                | (Self::Scraping, Self::ProcessError)
                | (Self::Committing, Self::Finished)
                | (Self::Committing, Self::FormatError)
                | (
                    Self::Pending | Self::Scraping | Self::Committing,
                    Self::UnknownError
                )
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a status string is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized task status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Scraping" | "Running" => Ok(Self::Scraping),
            "Committing" => Ok(Self::Committing),
            "Finished" => Ok(Self::Finished),
            "ProcessError" => Ok(Self::ProcessError),
            "FormatError" => Ok(Self::FormatError),
            "UnknownError" => Ok(Self::UnknownError),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// Persisted task record as stored in the task collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier.
    pub task_id: TaskId,
    /// Submitter-supplied parameters, passed through to the scraper untouched.
    pub parameters: Document,
    /// Latest status.
    pub status: TaskStatus,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Where the scraper's stdout is captured.
    pub log_location: PathBuf,
    /// Last status write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Time the task reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure description for error statuses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Records persisted by the ingestion pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_inserted: Option<u64>,
    /// Malformed chunks skipped by the ingestion pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_skipped: Option<u64>,
}

impl Task {
    /// Build a freshly submitted task in `Pending`.
    pub fn pending(task_id: TaskId, parameters: Document, log_dir: &Path) -> Self {
        let log_location = task_id.log_path(log_dir);
        Self {
            task_id,
            parameters,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            log_location,
            updated_at: None,
            finished_at: None,
            error: None,
            records_inserted: None,
            records_skipped: None,
        }
    }

    /// Parameters with store-internal identity fields removed, ready to hand
    /// to the scraper.
    pub fn scraper_parameters(&self) -> Document {
        let mut params = self.parameters.clone();
        params.remove(STORE_ID_FIELD);
        params
    }
}
