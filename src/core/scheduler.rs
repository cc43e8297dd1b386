//! Scheduling loop that keeps running slots full.
//!
//! Admission is a reservation followed by a dequeue. A reservation taken
//! against an empty queue is given back in the same cycle, so the running
//! count only ever covers tasks that were actually dispatched.
//!
//! Every dispatched task runs inside a wrapper that, whatever the executor
//! does (returns, fails, panics, or is cancelled), writes a terminal status
//! and releases exactly one slot. The wrapper itself is never aborted, which
//! is what makes shutdown safe for the running count. A release the backend
//! rejects is retried with capped backoff, since a lost release shrinks the
//! ceiling for every scheduler sharing the counter.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::core::{
    ExecutionError, SchedulerError, StatusRecorder, TaskExecutor, TaskId, TaskLifecycle, TaskQueue,
};

/// First wait before retrying a failed slot release.
const RELEASE_BACKOFF_START: Duration = Duration::from_millis(50);
/// Longest wait between slot release retries.
const RELEASE_BACKOFF_MAX: Duration = Duration::from_secs(5);
/// Release attempts still made once shutdown has begun.
const RELEASE_ATTEMPTS_AFTER_STOP: u32 = 5;

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Timing values for the scheduling loop.
#[derive(Debug, Clone)]
pub struct SchedulerLimits {
    /// Wait between admission cycles when nothing was dispatched.
    pub poll_interval: Duration,
    /// How long shutdown lets in-flight tasks finish before cancelling them.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerLimits {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Result of one admission cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A task left the queue and was handed to the executor.
    Dispatched(TaskId),
    /// Every slot is taken.
    NoSlot,
    /// A slot was free but nothing was pending.
    QueueEmpty,
    /// The scheduler is shutting down and admits nothing.
    Stopped,
}

/// Summary of a completed shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All in-flight tasks finished within the grace period.
    pub drained: bool,
    /// Tasks cancelled after the grace period.
    pub cancelled: usize,
}

/// Scrape scheduler with bounded concurrency.
pub struct Scheduler<E, S> {
    limits: SchedulerLimits,
    queue: Arc<dyn TaskQueue>,
    recorder: Arc<StatusRecorder>,
    executor: E,
    spawner: S,
    /// Signalled when a slot is released or a task is submitted in-process.
    wake: Arc<Notify>,
    in_flight: TaskTracker,
    stop: CancellationToken,
    cancel_executions: CancellationToken,
}

impl<E, S> Scheduler<E, S>
where
    E: TaskExecutor,
    S: Spawn,
{
    /// Create a scheduler from components.
    pub fn new(
        limits: SchedulerLimits,
        queue: Arc<dyn TaskQueue>,
        recorder: Arc<StatusRecorder>,
        executor: E,
        spawner: S,
    ) -> Self {
        Self {
            limits,
            queue,
            recorder,
            executor,
            spawner,
            wake: Arc::new(Notify::new()),
            in_flight: TaskTracker::new(),
            stop: CancellationToken::new(),
            cancel_executions: CancellationToken::new(),
        }
    }

    /// Handle used to cut the poll wait short.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Queue this scheduler admits from.
    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// Recorder used for every status write.
    pub fn recorder(&self) -> &Arc<StatusRecorder> {
        &self.recorder
    }

    /// Tasks dispatched by this scheduler that have not finished cleanup.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether shutdown has begun.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Run one admission cycle.
    pub async fn tick(&self) -> Result<Admission, SchedulerError> {
        if self.stop.is_cancelled() {
            return Ok(Admission::Stopped);
        }
        if !self.queue.try_reserve_slot().await? {
            return Ok(Admission::NoSlot);
        }

        let next = match self.queue.dequeue_pending().await {
            Ok(next) => next,
            Err(e) => {
                self.release_reservation().await;
                return Err(e);
            }
        };
        let Some(task_id) = next else {
            self.release_reservation().await;
            return Ok(Admission::QueueEmpty);
        };

        if self.stop.is_cancelled() {
            // shutdown started while we were dequeuing; hand the task back
            self.hand_back(task_id).await;
            self.release_reservation().await;
            return Ok(Admission::Stopped);
        }

        tracing::info!(task_id = %task_id, "scheduled pending task");
        self.dispatch(task_id.clone());
        Ok(Admission::Dispatched(task_id))
    }

    /// Poll until shutdown, admitting one task per cycle.
    ///
    /// After a dispatch the next cycle starts immediately so free slots fill
    /// up without waiting a full poll interval per task.
    pub async fn run(&self) {
        tracing::info!(
            max_running = self.queue.max_running(),
            poll_ms = u64::try_from(self.limits.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "scrape scheduler started"
        );

        while !self.stop.is_cancelled() {
            match self.tick().await {
                Ok(Admission::Dispatched(_)) => {
                    tokio::task::yield_now().await;
                    continue;
                }
                Ok(Admission::Stopped) => break,
                Ok(Admission::NoSlot | Admission::QueueEmpty) => {}
                Err(e) => tracing::error!("scheduler cycle failed, retrying next cycle: {e}"),
            }

            tokio::select! {
                () = self.stop.cancelled() => break,
                () = tokio::time::sleep(self.limits.poll_interval) => {}
                () = self.wake.notified() => {}
            }
        }

        tracing::info!("scrape scheduler stopped");
    }

    /// Stop admitting new tasks. In-flight tasks keep running; see
    /// [`Scheduler::shutdown`] to wait for them.
    pub fn stop_admitting(&self) {
        self.stop.cancel();
    }

    /// Stop admitting, give in-flight tasks the grace period, then cancel the
    /// rest and wait for their cleanup.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.stop_admitting();
        self.in_flight.close();
        tracing::info!(in_flight = self.in_flight.len(), "scheduler shutting down");

        if tokio::time::timeout(self.limits.shutdown_grace, self.in_flight.wait())
            .await
            .is_ok()
        {
            return ShutdownReport {
                drained: true,
                cancelled: 0,
            };
        }

        let cancelled = self.in_flight.len();
        tracing::warn!(cancelled, "grace period elapsed, cancelling in-flight tasks");
        self.cancel_executions.cancel();
        self.in_flight.wait().await;
        ShutdownReport {
            drained: false,
            cancelled,
        }
    }

    async fn release_reservation(&self) {
        if let Some(running) = release_with_retry(self.queue.as_ref(), &self.stop, None).await {
            tracing::debug!(running, "released unused reservation");
        }
    }

    /// Return a dequeued but undispatched task to the head of the queue. A
    /// task that cannot be returned is recorded as failed rather than left
    /// `Pending` with nothing to pick it up.
    async fn hand_back(&self, task_id: TaskId) {
        let Err(e) = self.queue.requeue_front(&task_id).await else {
            tracing::info!(task_id = %task_id, "returned task to the queue during shutdown");
            return;
        };
        tracing::error!(task_id = %task_id, "failed to requeue task during shutdown: {e}");
        let mut lifecycle = TaskLifecycle::new(task_id, Arc::clone(&self.recorder));
        let outcome = Err(ExecutionError::Unknown(format!(
            "task could not be requeued during shutdown: {e}"
        )));
        lifecycle.finish(&outcome).await;
    }

    fn dispatch(&self, task_id: TaskId) {
        let executor = self.executor.clone();
        let queue = Arc::clone(&self.queue);
        let recorder = Arc::clone(&self.recorder);
        let wake = Arc::clone(&self.wake);
        let stop = self.stop.clone();
        let cancel = self.cancel_executions.child_token();

        let execution = async move {
            let mut lifecycle = TaskLifecycle::new(task_id.clone(), recorder);

            let outcome = tokio::select! {
                result = AssertUnwindSafe(executor.execute(&mut lifecycle)).catch_unwind() => {
                    result.unwrap_or_else(|panic| Err(ExecutionError::Panicked(panic_message(&*panic))))
                }
                () = cancel.cancelled() => Err(ExecutionError::Cancelled),
            };

            let status = lifecycle.finish(&outcome).await;

            if let Some(running) = release_with_retry(queue.as_ref(), &stop, Some(&task_id)).await {
                tracing::debug!(task_id = %task_id, running, "released slot");
            }
            wake.notify_one();

            match &outcome {
                Ok(report) => tracing::info!(
                    task_id = %task_id,
                    %status,
                    inserted = report.records_inserted,
                    skipped = report.records_skipped,
                    "task completed"
                ),
                Err(e) => tracing::warn!(task_id = %task_id, %status, "task failed: {e}"),
            }
        };

        self.spawner.spawn(self.in_flight.track_future(execution));
    }
}

/// Release one slot, retrying with capped exponential backoff until the
/// backend accepts it. After shutdown begins only a few more attempts are
/// made; `None` means the release was given up.
async fn release_with_retry(
    queue: &dyn TaskQueue,
    stop: &CancellationToken,
    task_id: Option<&TaskId>,
) -> Option<u32> {
    let mut delay = RELEASE_BACKOFF_START;
    let mut attempts_after_stop = 0;
    loop {
        let e = match queue.release_slot().await {
            Ok(running) => return Some(running),
            Err(e) => e,
        };
        if stop.is_cancelled() {
            attempts_after_stop += 1;
            if attempts_after_stop >= RELEASE_ATTEMPTS_AFTER_STOP {
                tracing::error!(task_id = ?task_id, "giving up on slot release during shutdown: {e}");
                return None;
            }
        }
        tracing::warn!(
            task_id = ?task_id,
            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "slot release failed, retrying: {e}"
        );
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(RELEASE_BACKOFF_MAX);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}
