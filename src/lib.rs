//! # Resume Ingest
//!
//! A bounded-concurrency scrape scheduler and ingestion pipeline.
//!
//! Clients submit scrape jobs with opaque parameters and poll their status.
//! A scheduling loop admits pending jobs while fewer than a configured number
//! are running, launches an external scraper per job, and streams its output
//! into a document store in batches.
//!
//! ## Core Problem Solved
//!
//! Scrapers are slow, flaky subprocesses. Running too many at once overloads
//! the host and the scraped site, while losing track of a job leaves clients
//! polling forever. This crate keeps a hard ceiling on concurrent scrapers,
//! even across several scheduler processes sharing one Redis backend, and
//! guarantees that every admitted job ends in a terminal status and gives its
//! slot back.
//!
//! ## Key Features
//!
//! - **Atomic Admission**: slots are reserved with a compare-and-swap (in
//!   memory) or a Lua script (Redis), never a read followed by a write
//! - **Explicit State Machine**: `Pending → Scraping → Committing → Finished`,
//!   with `ProcessError`, `FormatError` and `UnknownError` as failure exits
//! - **Tolerant Ingestion**: malformed records are skipped and counted,
//!   good ones are flushed in batches
//! - **Graceful Shutdown**: in-flight scrapers get a grace period, then are
//!   cancelled with their slots released
//!
//! ## Usage
//!
//! ```rust,ignore
//! use resume_ingest::builders::build_service;
//! use resume_ingest::config::ServiceConfig;
//! use serde_json::json;
//!
//! let cfg = ServiceConfig::from_env()?;
//! let service = build_service(&cfg).await?;
//! service.start();
//!
//! let params = json!({"keyword": "rust", "pages": 2});
//! let submitted = service.submit(params.as_object().cloned().unwrap_or_default()).await?;
//! let status = service.status(&submitted.task_id).await?;
//! println!("{} is {}", status.task_id, status.status);
//!
//! service.shutdown().await;
//! ```
//!
//! For complete examples, see `tests/scheduler_test.rs` and
//! `tests/executor_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions, task state machine and ingestion.
pub mod core;
/// Configuration models for limits, scraper invocation and backends.
pub mod config;
/// Builders to construct services from configuration.
pub mod builders;
/// Infrastructure adapters for queues, status cells and document stores.
pub mod infra;
/// Runtime adapter and service surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
