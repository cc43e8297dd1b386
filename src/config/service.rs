//! Service configuration: concurrency limits, scraper invocation, ingestion
//! framing and backend selection.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Framing, IngestSettings, SchedulerLimits};

/// Queue and status-cell backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackendConfig {
    /// In-process queue for single-instance deployments and tests.
    #[default]
    InMemory,
    /// Redis lists and counters shared across processes.
    Redis,
}

/// Document store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory store.
    #[default]
    InMemory,
    /// JSON-lines files under `store_path`.
    File,
}

impl FromStr for QueueBackendConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_memory" | "memory" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown queue backend `{other}`")),
        }
    }
}

impl FromStr for StoreBackendConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_memory" | "memory" => Ok(Self::InMemory),
            "file" => Ok(Self::File),
            other => Err(format!("unknown store backend `{other}`")),
        }
    }
}

/// Root service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Concurrency ceiling.
    pub max_running_tasks: u32,
    /// Pending tasks accepted before submissions are rejected.
    pub max_queue_depth: usize,
    /// Records per store write.
    pub batch_size: usize,
    /// Wait between idle scheduling cycles, in milliseconds.
    pub poll_interval_ms: u64,
    /// Grace period for in-flight tasks on shutdown, in seconds.
    pub shutdown_grace_secs: u64,
    /// Scraper executable.
    pub scraper_program: String,
    /// Arguments placed before the parameters argument.
    pub scraper_args: Vec<String>,
    /// Kill the scraper after this many seconds.
    pub scraper_timeout_secs: Option<u64>,
    /// Directory for per-task scraper logs.
    pub log_dir: PathBuf,
    /// Keep logs after a successful ingestion.
    pub retain_logs: bool,
    /// How scraper output is split into records.
    pub framing: Framing,
    /// Cap on a single accumulated record.
    pub max_buffer_bytes: usize,
    /// Queue backend.
    pub queue: QueueBackendConfig,
    /// Redis connection string.
    pub redis_url: String,
    /// Prefix for Redis keys.
    pub key_prefix: String,
    /// Status cell lifetime, in seconds.
    pub status_ttl_secs: u64,
    /// Store backend.
    pub store: StoreBackendConfig,
    /// Directory of the file store.
    pub store_path: PathBuf,
    /// Collection holding task documents.
    pub task_collection: String,
    /// Collection receiving scraped records.
    pub record_collection: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_running_tasks: 3,
            max_queue_depth: 10_000,
            batch_size: 10,
            poll_interval_ms: 10_000,
            shutdown_grace_secs: 30,
            scraper_program: "python".into(),
            scraper_args: vec!["run_scraper.py".into()],
            scraper_timeout_secs: None,
            log_dir: PathBuf::from("./logs/scraper"),
            retain_logs: true,
            framing: Framing::LineDelimited,
            max_buffer_bytes: 1024 * 1024,
            queue: QueueBackendConfig::InMemory,
            redis_url: "redis://127.0.0.1:6379/0".into(),
            key_prefix: "scraper".into(),
            status_ttl_secs: 86_400,
            store: StoreBackendConfig::InMemory,
            store_path: PathBuf::from("./data"),
            task_collection: "task".into(),
            record_collection: "resume".into(),
        }
    }
}

impl ServiceConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_running_tasks == 0 {
            return Err("max_running_tasks must be greater than 0".into());
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.scraper_program.trim().is_empty() {
            return Err("scraper_program must not be empty".into());
        }
        if self.scraper_timeout_secs == Some(0) {
            return Err("scraper_timeout_secs must be greater than 0 when set".into());
        }
        if self.max_buffer_bytes == 0 {
            return Err("max_buffer_bytes must be greater than 0".into());
        }
        if self.status_ttl_secs == 0 {
            return Err("status_ttl_secs must be greater than 0".into());
        }
        if self.task_collection.is_empty() || self.record_collection.is_empty() {
            return Err("collection names must not be empty".into());
        }
        if self.task_collection == self.record_collection {
            return Err("task_collection and record_collection must differ".into());
        }
        if self.queue == QueueBackendConfig::Redis && self.key_prefix.is_empty() {
            return Err("key_prefix must not be empty for the redis backend".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment, after reading an
    /// optional `.env` file.
    pub fn from_env() -> Result<Self, String> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(format!("failed to load .env: {e}"));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from `lookup`, falling back to defaults for
    /// unset variables, and validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        parse_into(&get, "MAX_RUNNING_TASKS", &mut cfg.max_running_tasks)?;
        parse_into(&get, "MAX_QUEUE_DEPTH", &mut cfg.max_queue_depth)?;
        parse_into(&get, "BATCH_SIZE", &mut cfg.batch_size)?;
        parse_into(&get, "POLL_INTERVAL_MS", &mut cfg.poll_interval_ms)?;
        parse_into(&get, "SHUTDOWN_GRACE_SECS", &mut cfg.shutdown_grace_secs)?;
        if let Some(program) = get("SCRAPER_PROGRAM") {
            cfg.scraper_program = program;
        }
        if let Some(args) = lookup("SCRAPER_ARGS") {
            cfg.scraper_args = args.split_whitespace().map(str::to_owned).collect();
        }
        if let Some(raw) = get("SCRAPER_TIMEOUT_SECS") {
            cfg.scraper_timeout_secs = Some(parse_value("SCRAPER_TIMEOUT_SECS", &raw)?);
        }
        if let Some(dir) = get("SCRAPER_LOG_DIR") {
            cfg.log_dir = PathBuf::from(dir);
        }
        parse_into(&get, "RETAIN_LOGS", &mut cfg.retain_logs)?;
        if let Some(raw) = get("INGEST_FRAMING") {
            cfg.framing = match raw.as_str() {
                "line_delimited" | "lines" => Framing::LineDelimited,
                "accumulate" => Framing::Accumulate,
                other => return Err(format!("INGEST_FRAMING: unknown framing `{other}`")),
            };
        }
        parse_into(&get, "MAX_BUFFER_BYTES", &mut cfg.max_buffer_bytes)?;
        parse_into(&get, "QUEUE_BACKEND", &mut cfg.queue)?;
        if let Some(url) = get("REDIS_URL") {
            cfg.redis_url = url;
        }
        if let Some(prefix) = get("QUEUE_KEY_PREFIX") {
            cfg.key_prefix = prefix;
        }
        parse_into(&get, "STATUS_TTL_SECS", &mut cfg.status_ttl_secs)?;
        parse_into(&get, "STORE_BACKEND", &mut cfg.store)?;
        if let Some(path) = get("STORE_PATH") {
            cfg.store_path = PathBuf::from(path);
        }
        if let Some(name) = get("TASK_COLLECTION") {
            cfg.task_collection = name;
        }
        if let Some(name) = get("RECORD_COLLECTION") {
            cfg.record_collection = name;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Scheduler timing derived from this configuration.
    pub const fn scheduler_limits(&self) -> SchedulerLimits {
        SchedulerLimits {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }

    /// Ingestion settings derived from this configuration.
    pub const fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            framing: self.framing,
            batch_size: self.batch_size,
            max_buffer_bytes: self.max_buffer_bytes,
        }
    }

    /// Scraper timeout, if any.
    pub fn scraper_timeout(&self) -> Option<Duration> {
        self.scraper_timeout_secs.map(Duration::from_secs)
    }

    /// Status cell lifetime.
    pub const fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| format!("{key}: invalid value `{raw}`: {e}"))
}

fn parse_into<T, G>(get: &G, key: &str, slot: &mut T) -> Result<(), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *slot = parse_value(key, &raw)?;
    }
    Ok(())
}
