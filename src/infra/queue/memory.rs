//! In-memory queue, admission counter and status cells for single-process
//! deployments and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{SchedulerError, StatusBoard, TaskId, TaskQueue, TaskStatus};

/// FIFO pending list plus a lock-free running-slot counter.
pub struct InMemoryQueue {
    max_running: u32,
    max_depth: usize,
    /// Lock-free capacity tracking: number of reserved slots.
    running: AtomicU32,
    pending: Mutex<VecDeque<TaskId>>,
}

impl InMemoryQueue {
    /// Create a queue admitting at most `max_running` tasks at once and
    /// holding at most `max_depth` pending ones.
    pub fn new(max_running: u32, max_depth: usize) -> Self {
        Self {
            max_running,
            max_depth,
            running: AtomicU32::new(0),
            pending: Mutex::new(VecDeque::with_capacity(max_depth.min(1024))),
        }
    }

    /// Maximum pending depth.
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Reserve a slot using a CAS loop.
    fn reserve(&self) -> bool {
        let mut current = self.running.load(Ordering::Acquire);
        loop {
            if current >= self.max_running {
                return false;
            }
            match self.running.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Release a slot, saturating at zero.
    fn release(&self) -> u32 {
        let mut current = self.running.load(Ordering::Acquire);
        loop {
            if current == 0 {
                tracing::warn!("release_slot called with no reserved slots");
                return 0;
            }
            match self.running.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current - 1,
                Err(actual) => current = actual,
            }
        }
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn enqueue(&self, task_id: &TaskId) -> Result<(), SchedulerError> {
        let mut pending = self.pending.lock();
        if pending.len() >= self.max_depth {
            return Err(SchedulerError::QueueFull("max queue depth reached".into()));
        }
        pending.push_back(task_id.clone());
        Ok(())
    }

    async fn requeue_front(&self, task_id: &TaskId) -> Result<(), SchedulerError> {
        self.pending.lock().push_front(task_id.clone());
        Ok(())
    }

    async fn dequeue_pending(&self) -> Result<Option<TaskId>, SchedulerError> {
        Ok(self.pending.lock().pop_front())
    }

    async fn try_reserve_slot(&self) -> Result<bool, SchedulerError> {
        Ok(self.reserve())
    }

    async fn release_slot(&self) -> Result<u32, SchedulerError> {
        Ok(self.release())
    }

    async fn running_count(&self) -> Result<u32, SchedulerError> {
        Ok(self.running.load(Ordering::Acquire))
    }

    async fn pending_len(&self) -> Result<usize, SchedulerError> {
        Ok(self.pending.lock().len())
    }

    fn max_running(&self) -> u32 {
        self.max_running
    }
}

/// Writes between sweeps of expired status cells.
pub const PRUNE_EVERY_WRITES: u64 = 256;

struct StatusCell {
    status: TaskStatus,
    expires_at: Option<Instant>,
}

fn retain_live(cells: &mut HashMap<TaskId, StatusCell>) -> usize {
    let now = Instant::now();
    let before = cells.len();
    cells.retain(|_, cell| cell.expires_at.is_none_or(|at| at > now));
    before - cells.len()
}

/// Status cells held in a map, with optional expiry.
///
/// Expired cells read as absent at once and are swept out of the map every
/// [`PRUNE_EVERY_WRITES`] writes.
pub struct InMemoryStatusBoard {
    ttl: Option<Duration>,
    cells: Mutex<HashMap<TaskId, StatusCell>>,
    writes: AtomicU64,
}

impl InMemoryStatusBoard {
    /// Create a board whose cells expire after `ttl` (never when `None`).
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            cells: Mutex::new(HashMap::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Drop expired cells and return how many were removed.
    pub fn prune_expired(&self) -> usize {
        retain_live(&mut self.cells.lock())
    }

    /// Cells held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.cells.lock().len()
    }

    /// Whether no cells are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStatusBoard {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl StatusBoard for InMemoryStatusBoard {
    async fn set_status(&self, task_id: &TaskId, status: TaskStatus) -> Result<(), SchedulerError> {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        let sweep = self.ttl.is_some()
            && self.writes.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY_WRITES == PRUNE_EVERY_WRITES - 1;

        let mut cells = self.cells.lock();
        cells.insert(task_id.clone(), StatusCell { status, expires_at });
        if sweep {
            let pruned = retain_live(&mut cells);
            if pruned > 0 {
                tracing::debug!(pruned, "swept expired status cells");
            }
        }
        Ok(())
    }

    async fn get_status(&self, task_id: &TaskId) -> Result<Option<TaskStatus>, SchedulerError> {
        let now = Instant::now();
        Ok(self
            .cells
            .lock()
            .get(task_id)
            .filter(|cell| cell.expires_at.is_none_or(|at| at > now))
            .map(|cell| cell.status))
    }
}
