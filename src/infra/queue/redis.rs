//! Redis-backed queue and status cells shared by every scheduler process.
//!
//! Keys live under one prefix: `<prefix>:pending` is a list consumed from the
//! left, `<prefix>:running` is the admission counter and
//! `<prefix>:status:<task_id>` holds one status cell with a TTL.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::core::{AppResult, SchedulerError, StatusBoard, TaskId, TaskQueue, TaskStatus};

mod scripts {
    use redis::Script;

    /// Append to the pending list only while it is below the depth limit.
    pub fn enqueue() -> Script {
        Script::new(
            r"
            if redis.call('LLEN', KEYS[1]) < tonumber(ARGV[2]) then
                redis.call('RPUSH', KEYS[1], ARGV[1])
                return 1
            end
            return 0
            ",
        )
    }

    /// Increment the counter only while it is below the ceiling.
    pub fn reserve_slot() -> Script {
        Script::new(
            r"
            local running = tonumber(redis.call('GET', KEYS[1]) or '0')
            if running < tonumber(ARGV[1]) then
                redis.call('INCR', KEYS[1])
                return 1
            end
            return 0
            ",
        )
    }

    /// Decrement the counter unless it is already zero; -1 signals an
    /// unmatched release.
    pub fn release_slot() -> Script {
        Script::new(
            r"
            local running = tonumber(redis.call('GET', KEYS[1]) or '0')
            if running > 0 then
                return redis.call('DECR', KEYS[1])
            end
            return -1
            ",
        )
    }
}

fn backend(e: &redis::RedisError) -> SchedulerError {
    SchedulerError::Backend(format!("redis: {e}"))
}

/// Open a managed connection to `url`.
pub async fn connect(url: &str) -> AppResult<ConnectionManager> {
    let client = redis::Client::open(url).context("Failed to create Redis client")?;
    let manager = ConnectionManager::new(client)
        .await
        .context("Failed to create Redis connection manager")?;
    Ok(manager)
}

/// Pending list and admission counter in Redis.
pub struct RedisQueue {
    conn: ConnectionManager,
    pending_key: String,
    running_key: String,
    max_running: u32,
    max_depth: usize,
    push: Script,
    reserve: Script,
    release: Script,
}

impl RedisQueue {
    /// Create a queue on `conn` using keys under `prefix`.
    pub fn new(conn: ConnectionManager, prefix: &str, max_running: u32, max_depth: usize) -> Self {
        Self {
            conn,
            pending_key: format!("{prefix}:pending"),
            running_key: format!("{prefix}:running"),
            max_running,
            max_depth,
            push: scripts::enqueue(),
            reserve: scripts::reserve_slot(),
            release: scripts::release_slot(),
        }
    }

    /// Key of the pending list.
    pub fn pending_key(&self) -> &str {
        &self.pending_key
    }

    /// Key of the running counter.
    pub fn running_key(&self) -> &str {
        &self.running_key
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn enqueue(&self, task_id: &TaskId) -> Result<(), SchedulerError> {
        let mut conn = self.conn.clone();
        let pushed = self
            .push
            .key(&self.pending_key)
            .arg(task_id.as_str())
            .arg(self.max_depth)
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| backend(&e))?;
        if pushed == 0 {
            return Err(SchedulerError::QueueFull("max queue depth reached".into()));
        }
        Ok(())
    }

    async fn requeue_front(&self, task_id: &TaskId) -> Result<(), SchedulerError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(&self.pending_key, task_id.as_str())
            .await
            .map_err(|e| backend(&e))
    }

    async fn dequeue_pending(&self) -> Result<Option<TaskId>, SchedulerError> {
        let mut conn = self.conn.clone();
        let head: Option<String> = conn
            .lpop(&self.pending_key, None)
            .await
            .map_err(|e| backend(&e))?;
        Ok(head.map(TaskId::from))
    }

    async fn try_reserve_slot(&self) -> Result<bool, SchedulerError> {
        let mut conn = self.conn.clone();
        let reserved = self
            .reserve
            .key(&self.running_key)
            .arg(self.max_running)
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| backend(&e))?;
        Ok(reserved == 1)
    }

    async fn release_slot(&self) -> Result<u32, SchedulerError> {
        let mut conn = self.conn.clone();
        let remaining = self
            .release
            .key(&self.running_key)
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| backend(&e))?;
        if remaining < 0 {
            tracing::warn!(key = %self.running_key, "release_slot called with no reserved slots");
            return Ok(0);
        }
        Ok(u32::try_from(remaining).unwrap_or(u32::MAX))
    }

    async fn running_count(&self) -> Result<u32, SchedulerError> {
        let mut conn = self.conn.clone();
        let running: Option<i64> = conn.get(&self.running_key).await.map_err(|e| backend(&e))?;
        Ok(running.map_or(0, |n| u32::try_from(n.max(0)).unwrap_or(u32::MAX)))
    }

    async fn pending_len(&self) -> Result<usize, SchedulerError> {
        let mut conn = self.conn.clone();
        conn.llen(&self.pending_key).await.map_err(|e| backend(&e))
    }

    fn max_running(&self) -> u32 {
        self.max_running
    }
}

/// Status cells stored as Redis strings with a TTL.
pub struct RedisStatusBoard {
    conn: ConnectionManager,
    prefix: String,
    ttl: Duration,
}

impl RedisStatusBoard {
    /// Create a board on `conn`; cells expire after `ttl`.
    pub fn new(conn: ConnectionManager, prefix: &str, ttl: Duration) -> Self {
        Self {
            conn,
            prefix: prefix.to_owned(),
            ttl,
        }
    }

    fn cell_key(&self, task_id: &TaskId) -> String {
        format!("{}:status:{task_id}", self.prefix)
    }
}

#[async_trait]
impl StatusBoard for RedisStatusBoard {
    async fn set_status(&self, task_id: &TaskId, status: TaskStatus) -> Result<(), SchedulerError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.cell_key(task_id), status.as_str(), self.ttl.as_secs().max(1))
            .await
            .map_err(|e| backend(&e))
    }

    async fn get_status(&self, task_id: &TaskId) -> Result<Option<TaskStatus>, SchedulerError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(self.cell_key(task_id))
            .await
            .map_err(|e| backend(&e))?;
        raw.map(|s| {
            s.parse::<TaskStatus>()
                .map_err(|e| SchedulerError::Backend(format!("corrupt status cell for {task_id}: {e}")))
        })
        .transpose()
    }
}
