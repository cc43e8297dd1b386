//! Shared admission state: the pending queue, the running-slot counter and
//! per-task status cells.
//!
//! Every operation here must be atomic at the backend. Implementations never
//! emulate a reservation with a separate read and write, so several schedulers
//! sharing one backend can never push the running count past the ceiling.

use async_trait::async_trait;

use crate::core::{SchedulerError, TaskId, TaskStatus};

/// Abstraction for the pending queue and admission counter.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append a task to the tail of the pending list, failing with
    /// `QueueFull` at the depth limit. The check and the append are one
    /// atomic step.
    async fn enqueue(&self, task_id: &TaskId) -> Result<(), SchedulerError>;

    /// Put a task back at the head of the pending list, ahead of everything
    /// queued after it. Used for tasks dequeued but never dispatched, so the
    /// depth limit does not apply.
    async fn requeue_front(&self, task_id: &TaskId) -> Result<(), SchedulerError>;

    /// Atomically remove and return the head of the pending list.
    async fn dequeue_pending(&self) -> Result<Option<TaskId>, SchedulerError>;

    /// Atomically test `running < max_running` and increment if so.
    async fn try_reserve_slot(&self) -> Result<bool, SchedulerError>;

    /// Give back one reserved slot and return the remaining running count.
    /// Never drops below zero.
    async fn release_slot(&self) -> Result<u32, SchedulerError>;

    /// Current number of reserved slots.
    async fn running_count(&self) -> Result<u32, SchedulerError>;

    /// Current pending depth.
    async fn pending_len(&self) -> Result<usize, SchedulerError>;

    /// Configured concurrency ceiling.
    fn max_running(&self) -> u32;
}

/// Abstraction for the short-lived per-task status cells polled by clients.
#[async_trait]
pub trait StatusBoard: Send + Sync {
    /// Overwrite the cell for `task_id`.
    async fn set_status(&self, task_id: &TaskId, status: TaskStatus) -> Result<(), SchedulerError>;

    /// Read the cell for `task_id`, `None` when absent or expired.
    async fn get_status(&self, task_id: &TaskId) -> Result<Option<TaskStatus>, SchedulerError>;
}
