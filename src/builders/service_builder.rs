//! Builders to assemble a scrape service from configuration.

use std::sync::Arc;

use anyhow::{anyhow, Context};

use crate::config::{QueueBackendConfig, ServiceConfig, StoreBackendConfig};
use crate::core::{
    AppResult, DocumentStore, IngestPipeline, Scheduler, ScraperCommand, ScraperExecutor,
    StatusBoard, StatusRecorder, TaskQueue, TaskStore,
};
use crate::infra::{InMemoryQueue, InMemoryStatusBoard, InMemoryStore, JsonlStore};
use crate::runtime::{ScrapeService, TokioSpawner};

/// Field that must be unique in the task collection.
pub const TASK_UNIQUE_KEY: &str = "task_id";

/// Service type produced by the builders.
pub type DefaultService = ScrapeService<ScraperExecutor, TokioSpawner>;

/// Build the queue and status board selected by `cfg`.
pub async fn build_queue(cfg: &ServiceConfig) -> AppResult<(Arc<dyn TaskQueue>, Arc<dyn StatusBoard>)> {
    match cfg.queue {
        QueueBackendConfig::InMemory => Ok((
            Arc::new(InMemoryQueue::new(cfg.max_running_tasks, cfg.max_queue_depth)),
            Arc::new(InMemoryStatusBoard::new(Some(cfg.status_ttl()))),
        )),
        #[cfg(feature = "redis-backend")]
        QueueBackendConfig::Redis => {
            use crate::infra::queue::redis::connect;
            use crate::infra::{RedisQueue, RedisStatusBoard};

            let conn = connect(&cfg.redis_url).await?;
            tracing::info!(prefix = %cfg.key_prefix, "connected to redis queue backend");
            Ok((
                Arc::new(RedisQueue::new(
                    conn.clone(),
                    &cfg.key_prefix,
                    cfg.max_running_tasks,
                    cfg.max_queue_depth,
                )),
                Arc::new(RedisStatusBoard::new(conn, &cfg.key_prefix, cfg.status_ttl())),
            ))
        }
        #[cfg(not(feature = "redis-backend"))]
        QueueBackendConfig::Redis => Err(anyhow!(
            "queue backend `redis` requires the `redis-backend` feature"
        )),
    }
}

/// Build the document store selected by `cfg`.
pub fn build_store(cfg: &ServiceConfig) -> AppResult<Arc<dyn DocumentStore>> {
    Ok(match cfg.store {
        StoreBackendConfig::InMemory => {
            Arc::new(InMemoryStore::new().with_unique_key(&cfg.task_collection, TASK_UNIQUE_KEY))
        }
        StoreBackendConfig::File => Arc::new(
            JsonlStore::open(&cfg.store_path)
                .with_context(|| format!("Failed to open store at {}", cfg.store_path.display()))?
                .with_unique_key(&cfg.task_collection, TASK_UNIQUE_KEY),
        ),
    })
}

/// Build a service from configuration, connecting to the configured backends.
///
/// Must be called inside a Tokio runtime.
pub async fn build_service(cfg: &ServiceConfig) -> AppResult<DefaultService> {
    cfg.validate()
        .map_err(|e| anyhow!("config invalid: {e}"))?;
    let (queue, board) = build_queue(cfg).await?;
    let store = build_store(cfg)?;
    build_service_with(cfg, queue, board, store)
}

/// Build a service from configuration around caller-provided backends.
pub fn build_service_with(
    cfg: &ServiceConfig,
    queue: Arc<dyn TaskQueue>,
    board: Arc<dyn StatusBoard>,
    store: Arc<dyn DocumentStore>,
) -> AppResult<DefaultService> {
    cfg.validate()
        .map_err(|e| anyhow!("config invalid: {e}"))?;
    let spawner = TokioSpawner::try_current()
        .context("building a service requires a running Tokio runtime")?;

    let tasks = TaskStore::new(Arc::clone(&store), cfg.task_collection.clone());
    let recorder = Arc::new(StatusRecorder::new(board, tasks));
    let command = ScraperCommand::new(&cfg.scraper_program, cfg.scraper_args.clone())
        .with_timeout(cfg.scraper_timeout());
    let pipeline = IngestPipeline::new(store, cfg.record_collection.clone(), cfg.ingest_settings());
    let executor = ScraperExecutor::new(command, pipeline).with_retain_logs(cfg.retain_logs);

    let scheduler = Scheduler::new(cfg.scheduler_limits(), queue, recorder, executor, spawner);
    tracing::info!(
        max_running = cfg.max_running_tasks,
        batch_size = cfg.batch_size,
        queue = ?cfg.queue,
        store = ?cfg.store,
        "scrape service assembled"
    );
    Ok(ScrapeService::new(scheduler, cfg.log_dir.clone()))
}
