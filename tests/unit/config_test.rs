//! Tests for configuration validation and loading

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use resume_ingest::config::{QueueBackendConfig, ServiceConfig, StoreBackendConfig};
use resume_ingest::core::Framing;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults_are_valid() {
    let cfg = ServiceConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.max_running_tasks, 3);
    assert_eq!(cfg.batch_size, 10);
    assert_eq!(cfg.poll_interval_ms, 10_000);
    assert_eq!(cfg.scraper_program, "python");
    assert_eq!(cfg.scraper_args, vec!["run_scraper.py".to_string()]);
    assert_eq!(cfg.log_dir, PathBuf::from("./logs/scraper"));
    assert_eq!(cfg.task_collection, "task");
    assert_eq!(cfg.record_collection, "resume");
}

#[test]
fn test_zero_max_running_rejected() {
    let cfg = ServiceConfig {
        max_running_tasks: 0,
        ..ServiceConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_zero_batch_size_rejected() {
    let cfg = ServiceConfig {
        batch_size: 0,
        ..ServiceConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_same_collections_rejected() {
    let cfg = ServiceConfig {
        record_collection: "task".into(),
        ..ServiceConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_from_json_str_fills_defaults() {
    let cfg = ServiceConfig::from_json_str(
        r#"{"max_running_tasks": 5, "queue": "redis", "framing": "accumulate"}"#,
    )
    .unwrap();
    assert_eq!(cfg.max_running_tasks, 5);
    assert_eq!(cfg.queue, QueueBackendConfig::Redis);
    assert_eq!(cfg.framing, Framing::Accumulate);
    assert_eq!(cfg.batch_size, 10);
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(ServiceConfig::from_json_str(r#"{"batch_size": 0}"#).is_err());
    assert!(ServiceConfig::from_json_str("not json").is_err());
}

#[test]
fn test_from_lookup_reads_variables() {
    let cfg = ServiceConfig::from_lookup(lookup(&[
        ("MAX_RUNNING_TASKS", "7"),
        ("BATCH_SIZE", "25"),
        ("SCRAPER_PROGRAM", "/usr/bin/python3"),
        ("SCRAPER_ARGS", "-u scrape.py --fast"),
        ("SCRAPER_TIMEOUT_SECS", "90"),
        ("RETAIN_LOGS", "false"),
        ("INGEST_FRAMING", "accumulate"),
        ("STORE_BACKEND", "file"),
        ("STORE_PATH", "/tmp/store"),
    ]))
    .unwrap();

    assert_eq!(cfg.max_running_tasks, 7);
    assert_eq!(cfg.batch_size, 25);
    assert_eq!(cfg.scraper_program, "/usr/bin/python3");
    assert_eq!(cfg.scraper_args, vec!["-u", "scrape.py", "--fast"]);
    assert_eq!(cfg.scraper_timeout(), Some(Duration::from_secs(90)));
    assert!(!cfg.retain_logs);
    assert_eq!(cfg.framing, Framing::Accumulate);
    assert_eq!(cfg.store, StoreBackendConfig::File);
    assert_eq!(cfg.store_path, PathBuf::from("/tmp/store"));
}

#[test]
fn test_from_lookup_empty_uses_defaults() {
    let cfg = ServiceConfig::from_lookup(lookup(&[])).unwrap();
    assert_eq!(cfg, ServiceConfig::default());
}

#[test]
fn test_from_lookup_bad_number_names_variable() {
    let err = ServiceConfig::from_lookup(lookup(&[("MAX_RUNNING_TASKS", "three")])).unwrap_err();
    assert!(err.contains("MAX_RUNNING_TASKS"));
}

#[test]
fn test_from_lookup_unknown_backend() {
    assert!(ServiceConfig::from_lookup(lookup(&[("QUEUE_BACKEND", "kafka")])).is_err());
}

#[test]
fn test_derived_settings() {
    let cfg = ServiceConfig {
        poll_interval_ms: 250,
        shutdown_grace_secs: 4,
        batch_size: 3,
        ..ServiceConfig::default()
    };
    let limits = cfg.scheduler_limits();
    assert_eq!(limits.poll_interval, Duration::from_millis(250));
    assert_eq!(limits.shutdown_grace, Duration::from_secs(4));
    assert_eq!(cfg.ingest_settings().batch_size, 3);
}
