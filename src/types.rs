//! Core types and events

use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One parameter set identifying a single report request.
///
/// An ordered mapping of query-parameter name to value. Immutable once
/// submitted to a job; ordering is deterministic (sorted by key), so the
/// same item always renders to the same query string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(BTreeMap<String, String>);

impl WorkItem {
    /// Create an empty work item
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    ///
    /// # Examples
    ///
    /// ```
    /// use report_export::WorkItem;
    ///
    /// let item = WorkItem::new()
    ///     .with("date", "2024-01-01")
    ///     .with("country", "US");
    /// assert_eq!(item.get("date"), Some("2024-01-01"));
    /// ```
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a parameter
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a parameter value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the item carries no parameters
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over parameters in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parameters as query pairs suitable for `reqwest`'s query serializer
    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        self.iter().collect()
    }
}

impl FromIterator<(String, String)> for WorkItem {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of fetching one report.
///
/// Remote failures collapse into [`FetchResult::Empty`] plus a logged
/// warning; the return value alone cannot distinguish "no data" from
/// "request failed".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchResult {
    /// A report with at least one data row
    Table(Table),
    /// No data: a 204, a zero-row 200, or a degraded remote failure
    Empty,
}

impl FetchResult {
    /// True if there is no data to persist
    pub fn is_empty(&self) -> bool {
        matches!(self, FetchResult::Empty)
    }

    /// Number of data rows (0 for empty results)
    pub fn rows(&self) -> usize {
        match self {
            FetchResult::Table(table) => table.row_count(),
            FetchResult::Empty => 0,
        }
    }
}

/// Progress events emitted by an export job.
///
/// Delivered over a `tokio::sync::broadcast` channel; all sends are
/// fire-and-forget, so subscribing is optional and a slow consumer only
/// loses its own backlog.
#[derive(Clone, Debug)]
pub enum Event {
    /// A non-empty fetch was persisted as a shard file
    ShardWritten {
        /// Shard filename inside the output directory
        filename: String,
        /// Data rows written
        rows: usize,
    },
    /// A batch finished; counters are cumulative across the job
    BatchCompleted {
        /// Work items processed so far
        items_processed: usize,
        /// Total work items in the job
        total_items: usize,
    },
    /// The reduce step replaced all shards with the final artifact
    ReduceCompleted {
        /// Number of shard files concatenated
        shards: usize,
        /// Data rows in the final artifact
        rows: usize,
    },
}

/// Summary returned by a completed export job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobReport {
    /// Number of shard files merged during reduce
    pub shards_reduced: usize,
    /// Data rows in the final artifact
    pub rows: usize,
    /// Path of the final artifact
    pub artifact: PathBuf,
}
