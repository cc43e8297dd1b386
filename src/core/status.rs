//! Cheap status lookups for polling clients.
//!
//! Lookups only read the status cell. They never fall back to the task store,
//! so an expired or never-written cell reads as not found.

use std::sync::Arc;

use crate::core::{SchedulerError, StatusBoard, TaskId, TaskStatus};

/// Result of a status lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLookup {
    /// Cell present.
    Found(TaskStatus),
    /// No cell for this id.
    NotFound,
}

impl StatusLookup {
    /// Status if found.
    pub const fn status(self) -> Option<TaskStatus> {
        match self {
            Self::Found(status) => Some(status),
            Self::NotFound => None,
        }
    }
}

/// Maps task ids to their latest coarse status.
#[derive(Clone)]
pub struct StatusReporter {
    board: Arc<dyn StatusBoard>,
}

impl StatusReporter {
    /// Create a reporter reading from `board`.
    pub fn new(board: Arc<dyn StatusBoard>) -> Self {
        Self { board }
    }

    /// Look up `task_id`. Backend failures are errors, never `NotFound`.
    pub async fn get_status(&self, task_id: &TaskId) -> Result<StatusLookup, SchedulerError> {
        Ok(self
            .board
            .get_status(task_id)
            .await?
            .map_or(StatusLookup::NotFound, StatusLookup::Found))
    }
}
