//! Configuration types for report-export

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Retry configuration for transient transport failures
///
/// Constructed per transport instance and passed by value; there is no
/// shared mutable default. `status_retries` is the set of HTTP status codes
/// treated as transient; everything else passes through to the caller on
/// the first attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// HTTP status codes to force a retry on (default: 500, 502, 503, 504)
    #[serde(default = "default_status_retries")]
    pub status_retries: Vec<u16>,

    /// Maximum number of retries after the initial attempt (default: 5)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; later retries grow by
    /// `backoff_multiplier` (default: 1 second)
    #[serde(default = "default_retry_delay", with = "duration_secs")]
    pub retry_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_secs")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            status_retries: default_status_retries(),
            max_retries: 5,
            retry_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Returns true if `status` is in the transient set for this instance
    pub fn is_transient_status(&self, status: u16) -> bool {
        self.status_retries.contains(&status)
    }
}

/// Failure-isolation policy applied when a batch work function fails
///
/// Chosen at executor construction time; the behavior is explicit, never
/// implied. See [`crate::executor::BatchWorkExecutor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort remaining batches on the first failure and propagate it (default)
    #[default]
    FailFast,
    /// Record failures, keep processing remaining batches, report counts
    BestEffort,
}

/// Ordering applied to shard files before reduce-time concatenation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceOrder {
    /// Stable lexicographic sort by shard path (default): deterministic
    /// final row order regardless of batch completion order
    #[default]
    Filename,
    /// Filesystem enumeration order, NOT deterministic across runs
    Discovery,
}

/// Configuration for an export job
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Work items per batch handed to one pool worker (default: 100)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrency bound of the worker pool (default: 4)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Directory receiving shard files during export and the final
    /// artifact after reduce; cleared at job start
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Filename of the final artifact inside `output_dir` (default: "report.csv")
    #[serde(default = "default_output_file")]
    pub output_file: String,

    /// Suppress info-level diagnostics (progress, row counts); warnings
    /// and errors always emit
    #[serde(default)]
    pub mute_log: bool,

    /// Failure-isolation policy for batch execution
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Shard concatenation order during reduce
    #[serde(default)]
    pub reduce_order: ReduceOrder,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            output_dir: default_output_dir(),
            output_file: default_output_file(),
            mute_log: false,
            failure_policy: FailurePolicy::default(),
            reduce_order: ReduceOrder::default(),
        }
    }
}

impl JobConfig {
    /// Validate the configuration, returning a [`Error::Config`] naming
    /// the offending key on failure
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config {
                message: "batch_size must be at least 1".to_string(),
                key: Some("batch_size".to_string()),
            });
        }
        if self.max_workers == 0 {
            return Err(Error::Config {
                message: "max_workers must be at least 1".to_string(),
                key: Some("max_workers".to_string()),
            });
        }
        if self.output_file.is_empty() {
            return Err(Error::Config {
                message: "output_file must not be empty".to_string(),
                key: Some("output_file".to_string()),
            });
        }
        Ok(())
    }
}

fn default_status_retries() -> Vec<u16> {
    vec![500, 502, 503, 504]
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    100
}

fn default_max_workers() -> usize {
    4
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./reports")
}

fn default_output_file() -> String {
    "report.csv".to_string()
}

/// Serialize durations as (possibly fractional) seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(
                "delay must be a non-negative number of seconds",
            ));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
