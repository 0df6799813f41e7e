//! # report-export
//!
//! Concurrent bulk exporter for paginated, rate-limited reporting APIs.
//!
//! For a large set of query-parameter combinations, report-export fetches
//! one tabular report per combination over authenticated HTTP, persists
//! every non-empty result as a CSV shard file, and finally reduces all
//! shards into a single consolidated artifact.
//!
//! ## Design Philosophy
//!
//! - **Bounded everywhere** - fixed-size batches, a capped worker pool,
//!   and a bounded retry budget with backoff
//! - **Degrade, don't raise** - a report that ultimately fails yields no
//!   data and a logged warning, never an exception; the artifact reflects
//!   only what succeeded
//! - **Deterministic output** - shard concatenation order is a stable
//!   filename sort by default, so reruns produce identical artifacts
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//!
//! ## Quick Start
//!
//! ```no_run
//! use report_export::{ExportJob, JobConfig, ReportClient, RetryConfig, WorkItem};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ReportClient::new(
//!         "https://reports.example.com/api/csv_report",
//!         std::env::var("REPORT_API_KEY")?,
//!         RetryConfig::default(),
//!     )?;
//!
//!     let bulk_params: Vec<WorkItem> = ["2024-01-01", "2024-01-02"]
//!         .iter()
//!         .map(|date| WorkItem::new().with("date", *date))
//!         .collect();
//!
//!     let job = ExportJob::new(
//!         JobConfig::default(),
//!         client,
//!         bulk_params,
//!         Arc::new(|params| format!("{}.csv", params.get("date").unwrap_or("report"))),
//!     )?;
//!
//!     let report = job.run().await?;
//!     println!("{} rows -> {}", report.rows, report.artifact.display());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Report fetching client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Batch work execution with a bounded worker pool
pub mod executor;
/// Filesystem helpers for shard management
pub mod fs;
/// Export job orchestration
pub mod job;
/// Tabular data boundary
pub mod table;
/// Bounded-retry HTTP transport
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use client::ReportClient;
pub use config::{FailurePolicy, JobConfig, ReduceOrder, RetryConfig};
pub use error::{Error, Result};
pub use executor::{BatchWorkExecutor, ExecutionSummary};
pub use job::{ExportJob, JobPhase, ShardNamer};
pub use table::Table;
pub use transport::RetryingTransport;
pub use types::{Event, FetchResult, JobReport, WorkItem};
