//! Configuration models for the scheduler, scraper and backends.

pub mod service;

pub use service::{QueueBackendConfig, ServiceConfig, StoreBackendConfig};
