//! Batch work execution: partitioning, bounded parallelism, progress
//! tracking, and explicit shutdown.
//!
//! [`BatchWorkExecutor`] splits an ordered item sequence into fixed-size
//! batches and drives a work function over them with at most `max_workers`
//! batches in flight. Batch construction preserves input order; batch
//! completion order is unspecified. The failure-isolation policy is chosen
//! at construction time and is explicit, never implicit.

use crate::config::FailurePolicy;
use crate::error::{Error, Result};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Aggregated outcome of one `execute` call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Batches whose work function returned Ok
    pub completed_batches: usize,
    /// Batches whose work function returned Err
    pub failed_batches: usize,
    /// Batches skipped after a fail-fast abort
    pub skipped_batches: usize,
    /// Items in completed batches
    pub items_processed: usize,
    /// Display form of the first batch error, if any
    pub first_error: Option<String>,
}

/// Internal per-batch outcome, aggregated after the stream drains
enum BatchOutcome {
    Completed { size: usize },
    Failed { error: Error },
    Skipped,
}

/// Bounded worker pool over fixed-size batches.
///
/// Lifecycle: construct, call [`execute`](Self::execute) any number of
/// times, then [`shutdown`](Self::shutdown) exactly once. `execute` only
/// returns after every dispatched batch has drained, so shutdown never
/// discards in-flight work.
#[derive(Debug)]
pub struct BatchWorkExecutor {
    batch_size: usize,
    max_workers: usize,
    failure_policy: FailurePolicy,
    mute_log: bool,
    shut_down: AtomicBool,
}

impl BatchWorkExecutor {
    /// Create an executor.
    ///
    /// `batch_size` is the unit of both concurrency and failure isolation;
    /// `max_workers` bounds how many batches run at once.
    pub fn new(
        batch_size: usize,
        max_workers: usize,
        failure_policy: FailurePolicy,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Config {
                message: "batch_size must be at least 1".to_string(),
                key: Some("batch_size".to_string()),
            });
        }
        if max_workers == 0 {
            return Err(Error::Config {
                message: "max_workers must be at least 1".to_string(),
                key: Some("max_workers".to_string()),
            });
        }
        Ok(Self {
            batch_size,
            max_workers,
            failure_policy,
            mute_log: false,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Suppress per-batch progress logs; warnings still emit
    #[must_use]
    pub fn with_mute_log(mut self, mute: bool) -> Self {
        self.mute_log = mute;
        self
    }

    /// The failure-isolation policy chosen at construction
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// True once [`shutdown`](Self::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Run `work` over `items` in batches of `batch_size`, at most
    /// `max_workers` batches concurrently.
    ///
    /// Each batch is handed to `work` exactly once and in full. Progress
    /// (items processed out of `total_items`) is logged after every
    /// completed batch.
    ///
    /// Under [`FailurePolicy::FailFast`], the first batch error cancels
    /// all not-yet-started batches and is returned as `Err`. Under
    /// [`FailurePolicy::BestEffort`], errors are logged and counted and
    /// the returned [`ExecutionSummary`] carries the tallies.
    pub async fn execute<T, W, Fut>(
        &self,
        items: Vec<T>,
        work: W,
        total_items: usize,
    ) -> Result<ExecutionSummary>
    where
        T: Send,
        W: Fn(Vec<T>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<()>> + Send,
    {
        if self.is_shut_down() {
            return Err(Error::ExecutorShutDown);
        }

        let cancel = CancellationToken::new();
        let processed = AtomicUsize::new(0);
        let batches = partition(items, self.batch_size);

        let work = &work;
        let processed = &processed;

        let outcomes: Vec<BatchOutcome> = stream::iter(batches.into_iter().enumerate())
            .map(|(index, batch)| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return BatchOutcome::Skipped;
                    }
                    let size = batch.len();
                    match work(batch).await {
                        Ok(()) => {
                            let done = processed.fetch_add(size, Ordering::SeqCst) + size;
                            if !self.mute_log {
                                tracing::info!(
                                    batch = index,
                                    processed = done,
                                    total = total_items,
                                    "Batch completed"
                                );
                            }
                            BatchOutcome::Completed { size }
                        }
                        Err(error) => {
                            tracing::warn!(batch = index, error = %error, "Batch failed");
                            if self.failure_policy == FailurePolicy::FailFast {
                                cancel.cancel();
                            }
                            BatchOutcome::Failed { error }
                        }
                    }
                }
            })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;

        let mut summary = ExecutionSummary::default();
        let mut first_error: Option<Error> = None;
        for outcome in outcomes {
            match outcome {
                BatchOutcome::Completed { size } => {
                    summary.completed_batches += 1;
                    summary.items_processed += size;
                }
                BatchOutcome::Failed { error } => {
                    summary.failed_batches += 1;
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                BatchOutcome::Skipped => summary.skipped_batches += 1,
            }
        }
        summary.first_error = first_error.as_ref().map(ToString::to_string);

        match (self.failure_policy, first_error) {
            (FailurePolicy::FailFast, Some(error)) => Err(error),
            _ => Ok(summary),
        }
    }

    /// Shut the executor down.
    ///
    /// Must be called exactly once, after all desired `execute` calls have
    /// returned; a second call, or an `execute` after it, is
    /// [`Error::ExecutorShutDown`].
    pub fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Err(Error::ExecutorShutDown);
        }
        if !self.mute_log {
            tracing::info!("Batch work executor shut down");
        }
        Ok(())
    }
}

/// Split `items` into consecutive batches of at most `batch_size`.
///
/// The batches partition the input exactly: order-preserving, disjoint,
/// nothing dropped; only the final batch may be short.
fn partition<T>(items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    let mut batches = Vec::with_capacity(items.len().div_ceil(batch_size));
    let mut remaining = items;
    while !remaining.is_empty() {
        let split = remaining.len().min(batch_size);
        let rest = remaining.split_off(split);
        batches.push(remaining);
        remaining = rest;
    }
    batches
}
