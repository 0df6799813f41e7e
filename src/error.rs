//! Error types for report-export
//!
//! One crate-level error enum covers the whole pipeline: transport,
//! fetch classification, tabular parsing, shard filesystem work, and
//! executor lifecycle misuse. Remote-side report failures are NOT errors
//! (the fetcher degrades them to empty results); the variants here are the
//! conditions that genuinely abort a batch or a job.

use thiserror::Error;

/// Result type alias for report-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for report-export
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch_size")
        key: Option<String>,
    },

    /// Network error (connection failure, request build failure, body read failure)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error (shard writes, output directory management)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parse or serialization error (malformed report body, unreadable shard)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Table construction error (e.g., row arity mismatch)
    #[error("table error: {0}")]
    Table(String),

    /// Two work items in one run mapped to the same shard filename
    #[error("shard name collision: {filename} is already claimed by another work item")]
    ShardCollision {
        /// The shard filename that was generated twice
        filename: String,
    },

    /// The executor was used after shutdown, or shut down twice
    #[error("executor has been shut down")]
    ExecutorShutDown,

    /// A job phase was driven out of order
    #[error("invalid job phase: cannot {operation} in phase {phase}")]
    InvalidPhase {
        /// The lifecycle operation that was attempted
        operation: String,
        /// The phase the job was actually in
        phase: String,
    },

    /// Reduce step failed (e.g., nothing to join)
    #[error("reduce error: {0}")]
    Reduce(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}
