//! Export job orchestration: the start / export / reduce lifecycle.
//!
//! [`ExportJob`] drives the [`BatchWorkExecutor`] over a set of work
//! items: every non-empty fetch becomes one shard file in the output
//! directory, and the closing reduce step replaces all shards with a
//! single consolidated artifact.

use crate::client::ReportClient;
use crate::config::{JobConfig, ReduceOrder};
use crate::error::{Error, Result};
use crate::executor::BatchWorkExecutor;
use crate::fs;
use crate::table::Table;
use crate::types::{Event, FetchResult, JobReport, WorkItem};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, broadcast};

/// Buffered events per subscriber; slow consumers lose their own backlog only
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Shard naming strategy: maps a work item to its shard filename.
///
/// The function must be deterministic and injective over the work items of
/// one job run; two concurrently-running items mapped to the same name
/// would race on one file. The job enforces this at write time: a reused
/// name fails the offending batch with [`Error::ShardCollision`] instead
/// of silently overwriting.
pub type ShardNamer = Arc<dyn Fn(&WorkItem) -> String + Send + Sync>;

/// Lifecycle phases of an export job, in order.
///
/// [`ExportJob::run`] drives them strictly forward; no phase can run twice
/// or out of order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobPhase {
    /// Constructed, nothing touched yet
    Created,
    /// Output directory reset, ready to export
    Started,
    /// Batches in flight
    Exporting,
    /// Executor drained, shards being merged
    Reducing,
    /// Final artifact written
    Done,
}

/// Bulk report export job.
///
/// # Examples
///
/// ```no_run
/// use report_export::{ExportJob, JobConfig, ReportClient, RetryConfig, WorkItem};
/// use std::sync::Arc;
///
/// # async fn example() -> report_export::Result<()> {
/// let client = ReportClient::new(
///     "https://reports.example.com/api/csv_report",
///     "secret-key",
///     RetryConfig::default(),
/// )?;
///
/// let dates = ["2024-01-01", "2024-01-02"];
/// let bulk_params: Vec<WorkItem> = dates
///     .iter()
///     .map(|d| WorkItem::new().with("date", *d))
///     .collect();
///
/// let job = ExportJob::new(
///     JobConfig::default(),
///     client,
///     bulk_params,
///     Arc::new(|params| format!("{}.csv", params.get("date").unwrap_or("unknown"))),
/// )?;
///
/// let report = job.run().await?;
/// println!("{} rows in {}", report.rows, report.artifact.display());
/// # Ok(())
/// # }
/// ```
pub struct ExportJob {
    config: JobConfig,
    executor: BatchWorkExecutor,
    client: Arc<ReportClient>,
    bulk_params: Vec<WorkItem>,
    gen_filename: ShardNamer,
    phase: JobPhase,
    event_tx: broadcast::Sender<Event>,
}

/// Everything one batch needs, cloned per work-function invocation
struct BatchContext {
    client: Arc<ReportClient>,
    gen_filename: ShardNamer,
    claimed_names: Arc<Mutex<HashSet<String>>>,
    output_dir: PathBuf,
    event_tx: broadcast::Sender<Event>,
    items_processed: Arc<AtomicUsize>,
    total_items: usize,
}

impl ExportJob {
    /// Create a job over `bulk_params`.
    ///
    /// Validates the configuration; nothing touches the filesystem until
    /// [`run`](Self::run).
    pub fn new(
        config: JobConfig,
        client: ReportClient,
        bulk_params: Vec<WorkItem>,
        gen_filename: ShardNamer,
    ) -> Result<Self> {
        config.validate()?;
        let client = client.mute_log(config.mute_log);
        let executor =
            BatchWorkExecutor::new(config.batch_size, config.max_workers, config.failure_policy)?
                .with_mute_log(config.mute_log);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            executor,
            client: Arc::new(client),
            bulk_params,
            gen_filename,
            phase: JobPhase::Created,
            event_tx,
        })
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Run the job to completion: start, export, reduce.
    ///
    /// On success the output directory contains exactly one file, the
    /// final artifact. On error the job aborts where it stands and the
    /// directory is left as-is (possibly partially populated, not
    /// reduced).
    pub async fn run(mut self) -> Result<JobReport> {
        self.start()?;
        self.export().await?;
        self.end().await
    }

    /// Pre-flight: reset the output directory so no stale shards from a
    /// previous run can leak into this one's artifact.
    fn start(&mut self) -> Result<()> {
        self.expect_phase(JobPhase::Created, "start")?;
        fs::clear_dir(&self.config.output_dir)?;
        self.phase = JobPhase::Started;
        Ok(())
    }

    /// Fetch every work item through the executor, writing one shard per
    /// non-empty result.
    async fn export(&mut self) -> Result<()> {
        self.expect_phase(JobPhase::Started, "export")?;
        self.phase = JobPhase::Exporting;

        let total_items = self.bulk_params.len();
        let bulk_params = std::mem::take(&mut self.bulk_params);

        let client = Arc::clone(&self.client);
        let gen_filename = Arc::clone(&self.gen_filename);
        let claimed_names: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let output_dir = self.config.output_dir.clone();
        let event_tx = self.event_tx.clone();
        let items_processed = Arc::new(AtomicUsize::new(0));

        let summary = self
            .executor
            .execute(
                bulk_params,
                move |batch| {
                    let ctx = BatchContext {
                        client: Arc::clone(&client),
                        gen_filename: Arc::clone(&gen_filename),
                        claimed_names: Arc::clone(&claimed_names),
                        output_dir: output_dir.clone(),
                        event_tx: event_tx.clone(),
                        items_processed: Arc::clone(&items_processed),
                        total_items,
                    };
                    export_batch(ctx, batch)
                },
                total_items,
            )
            .await?;

        if summary.failed_batches > 0 {
            tracing::warn!(
                failed_batches = summary.failed_batches,
                first_error = summary.first_error.as_deref().unwrap_or(""),
                "Some batches failed during export; their items are absent from the artifact"
            );
        }
        Ok(())
    }

    /// Shut the executor down, then reduce all shards into the artifact.
    async fn end(&mut self) -> Result<JobReport> {
        self.expect_phase(JobPhase::Exporting, "end")?;
        self.executor.shutdown()?;
        self.phase = JobPhase::Reducing;
        let report = self.reduce()?;
        self.phase = JobPhase::Done;
        Ok(report)
    }

    /// Concatenate every file under the output directory, clear it, and
    /// write the merged table back as the single final artifact.
    fn reduce(&self) -> Result<JobReport> {
        let mut shards = fs::collect_files(&self.config.output_dir)?;
        if self.config.reduce_order == ReduceOrder::Filename {
            shards.sort();
        }

        let mut tables = Vec::with_capacity(shards.len());
        for shard in &shards {
            tables.push(Table::from_csv_path(shard)?);
        }
        let merged = Table::concat(tables);

        fs::clear_dir(&self.config.output_dir)?;
        let artifact = self.config.output_dir.join(&self.config.output_file);
        merged.write_csv_path(&artifact)?;

        if !self.config.mute_log {
            tracing::info!(
                shards = shards.len(),
                rows = merged.row_count(),
                artifact = %artifact.display(),
                "Reduce completed"
            );
        }
        self.event_tx
            .send(Event::ReduceCompleted {
                shards: shards.len(),
                rows: merged.row_count(),
            })
            .ok();

        Ok(JobReport {
            shards_reduced: shards.len(),
            rows: merged.row_count(),
            artifact,
        })
    }

    fn expect_phase(&self, expected: JobPhase, operation: &str) -> Result<()> {
        if self.phase != expected {
            return Err(Error::InvalidPhase {
                operation: operation.to_string(),
                phase: format!("{:?}", self.phase),
            });
        }
        Ok(())
    }
}

/// Process one batch: fetch each item, persist non-empty results as shards.
///
/// Empty results produce no file and no error. A fetch hard-failure
/// (malformed 200 body), a claimed-name collision, or a filesystem error
/// fails the whole batch, which the executor handles per its policy.
async fn export_batch(ctx: BatchContext, batch: Vec<WorkItem>) -> Result<()> {
    let size = batch.len();

    for params in &batch {
        let FetchResult::Table(table) = ctx.client.fetch(params).await? else {
            continue;
        };

        let filename = (ctx.gen_filename)(params);
        {
            let mut claimed = ctx.claimed_names.lock().await;
            if !claimed.insert(filename.clone()) {
                return Err(Error::ShardCollision { filename });
            }
        }

        let path = ctx.output_dir.join(&filename);
        table.write_csv_path(&path)?;
        ctx.event_tx
            .send(Event::ShardWritten {
                filename,
                rows: table.row_count(),
            })
            .ok();
    }

    let done = ctx.items_processed.fetch_add(size, Ordering::SeqCst) + size;
    ctx.event_tx
        .send(Event::BatchCompleted {
            items_processed: done,
            total_items: ctx.total_items,
        })
        .ok();
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FailurePolicy, RetryConfig};
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 1,
            retry_delay: Duration::from_millis(5),
            jitter: false,
            ..RetryConfig::default()
        }
    }

    fn test_client(server: &MockServer) -> ReportClient {
        ReportClient::new(format!("{}/csv_report", server.uri()), "test-key", fast_retry())
            .unwrap()
    }

    fn date_namer() -> ShardNamer {
        Arc::new(|params: &WorkItem| format!("{}.csv", params.get("date").unwrap_or("unknown")))
    }

    fn job_config(output_dir: &std::path::Path) -> JobConfig {
        JobConfig {
            batch_size: 1,
            max_workers: 2,
            output_dir: output_dir.to_path_buf(),
            output_file: "final.csv".to_string(),
            mute_log: true,
            ..JobConfig::default()
        }
    }

    async fn mount_report(server: &MockServer, date: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path("/csv_report"))
            .and(query_param("date", date))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(server)
            .await;
    }

    fn params_for(dates: &[&str]) -> Vec<WorkItem> {
        dates
            .iter()
            .map(|d| WorkItem::new().with("date", *d))
            .collect()
    }

    #[tokio::test]
    async fn run_produces_single_artifact_with_all_rows() {
        let server = MockServer::start().await;
        mount_report(&server, "2024-01-01", "date,installs\n2024-01-01,1\n2024-01-01,2\n").await;
        mount_report(&server, "2024-01-02", "date,installs\n2024-01-02,3\n").await;

        let tmp = TempDir::new().unwrap();
        let job = ExportJob::new(
            job_config(tmp.path()),
            test_client(&server),
            params_for(&["2024-01-01", "2024-01-02"]),
            date_namer(),
        )
        .unwrap();

        let report = job.run().await.unwrap();

        assert_eq!(report.shards_reduced, 2);
        assert_eq!(report.rows, 3);

        // Exactly one file survives: the artifact
        let leftover: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(leftover.len(), 1);
        assert_eq!(report.artifact, tmp.path().join("final.csv"));

        let table = Table::from_csv_path(&report.artifact).unwrap();
        assert_eq!(table.row_count(), 3);
    }

    #[tokio::test]
    async fn empty_results_produce_no_shards_and_no_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/csv_report"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let job = ExportJob::new(
            job_config(tmp.path()),
            test_client(&server),
            params_for(&["2024-01-01", "2024-01-02"]),
            date_namer(),
        )
        .unwrap();

        let report = job.run().await.unwrap();

        assert_eq!(report.shards_reduced, 0);
        assert_eq!(report.rows, 0);
        assert!(report.artifact.exists(), "artifact written even when empty");
    }

    #[tokio::test]
    async fn failed_items_are_simply_absent_from_the_artifact() {
        let server = MockServer::start().await;
        mount_report(&server, "2024-01-01", "date,installs\n2024-01-01,1\n").await;
        Mock::given(method("GET"))
            .and(path("/csv_report"))
            .and(query_param("date", "2024-01-02"))
            .respond_with(ResponseTemplate::new(500).set_body_string(r#"{"error":"boom"}"#))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let job = ExportJob::new(
            job_config(tmp.path()),
            test_client(&server),
            params_for(&["2024-01-01", "2024-01-02"]),
            date_namer(),
        )
        .unwrap();

        let report = job.run().await.unwrap();

        // The 500 degraded to empty: no error, no rows for that date
        assert_eq!(report.shards_reduced, 1);
        assert_eq!(report.rows, 1);
    }

    #[tokio::test]
    async fn stale_shards_are_cleared_at_start() {
        let server = MockServer::start().await;
        mount_report(&server, "2024-01-01", "date,installs\n2024-01-01,1\n").await;

        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("stale.csv"), "date,installs\nold,999\n").unwrap();

        let job = ExportJob::new(
            job_config(tmp.path()),
            test_client(&server),
            params_for(&["2024-01-01"]),
            date_namer(),
        )
        .unwrap();

        let report = job.run().await.unwrap();

        assert_eq!(report.shards_reduced, 1, "stale shard must not be reduced");
        assert_eq!(report.rows, 1);
    }

    #[tokio::test]
    async fn shard_name_collision_is_rejected_not_overwritten() {
        let server = MockServer::start().await;
        mount_report(&server, "2024-01-01", "date,installs\n2024-01-01,1\n").await;
        mount_report(&server, "2024-01-02", "date,installs\n2024-01-02,2\n").await;

        let tmp = TempDir::new().unwrap();
        let constant_namer: ShardNamer = Arc::new(|_| "same.csv".to_string());
        let job = ExportJob::new(
            job_config(tmp.path()),
            test_client(&server),
            params_for(&["2024-01-01", "2024-01-02"]),
            constant_namer,
        )
        .unwrap();

        let result = job.run().await;
        assert!(
            matches!(result, Err(Error::ShardCollision { .. })),
            "a reused shard name must be detected and rejected"
        );
    }

    #[tokio::test]
    async fn best_effort_collision_keeps_exactly_one_shard() {
        let server = MockServer::start().await;
        mount_report(&server, "2024-01-01", "date,installs\n2024-01-01,1\n").await;
        mount_report(&server, "2024-01-02", "date,installs\n2024-01-02,2\n").await;

        let tmp = TempDir::new().unwrap();
        let mut config = job_config(tmp.path());
        config.failure_policy = FailurePolicy::BestEffort;
        let constant_namer: ShardNamer = Arc::new(|_| "same.csv".to_string());
        let job = ExportJob::new(
            config,
            test_client(&server),
            params_for(&["2024-01-01", "2024-01-02"]),
            constant_namer,
        )
        .unwrap();

        let report = job.run().await.unwrap();

        assert_eq!(report.shards_reduced, 1, "only the first claimant's shard");
        assert_eq!(report.rows, 1);
    }

    #[tokio::test]
    async fn artifact_row_order_is_sorted_by_shard_filename() {
        let server = MockServer::start().await;
        mount_report(&server, "2024-01-02", "date\nsecond\n").await;
        mount_report(&server, "2024-01-01", "date\nfirst\n").await;

        let tmp = TempDir::new().unwrap();
        // Submit out of filename order; reduce must still sort
        let job = ExportJob::new(
            job_config(tmp.path()),
            test_client(&server),
            params_for(&["2024-01-02", "2024-01-01"]),
            date_namer(),
        )
        .unwrap();

        let report = job.run().await.unwrap();
        let table = Table::from_csv_path(&report.artifact).unwrap();
        let values: Vec<&str> = table.rows().iter().map(|r| r[0].as_str()).collect();
        assert_eq!(values, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn events_report_shards_batches_and_reduce() {
        let server = MockServer::start().await;
        mount_report(&server, "2024-01-01", "date\na\n").await;
        mount_report(&server, "2024-01-02", "date\nb\n").await;

        let tmp = TempDir::new().unwrap();
        let job = ExportJob::new(
            job_config(tmp.path()),
            test_client(&server),
            params_for(&["2024-01-01", "2024-01-02"]),
            date_namer(),
        )
        .unwrap();
        let mut events = job.subscribe();

        job.run().await.unwrap();

        let mut shards_written = 0;
        let mut batches_completed = 0;
        let mut reduce_completed = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                Event::ShardWritten { .. } => shards_written += 1,
                Event::BatchCompleted { total_items, .. } => {
                    assert_eq!(total_items, 2);
                    batches_completed += 1;
                }
                Event::ReduceCompleted { shards, rows } => {
                    assert_eq!(shards, 2);
                    assert_eq!(rows, 2);
                    reduce_completed += 1;
                }
            }
        }
        assert_eq!(shards_written, 2);
        assert_eq!(batches_completed, 2);
        assert_eq!(reduce_completed, 1);
    }

    #[tokio::test]
    async fn phases_advance_in_order() {
        let server = MockServer::start().await;
        mount_report(&server, "2024-01-01", "date\na\n").await;

        let tmp = TempDir::new().unwrap();
        let mut job = ExportJob::new(
            job_config(tmp.path()),
            test_client(&server),
            params_for(&["2024-01-01"]),
            date_namer(),
        )
        .unwrap();

        assert_eq!(job.phase(), JobPhase::Created);
        job.start().unwrap();
        assert_eq!(job.phase(), JobPhase::Started);
        job.export().await.unwrap();
        assert_eq!(job.phase(), JobPhase::Exporting);
        job.end().await.unwrap();
        assert_eq!(job.phase(), JobPhase::Done);
    }

    #[tokio::test]
    async fn phases_cannot_run_out_of_order() {
        let server = MockServer::start().await;
        let tmp = TempDir::new().unwrap();
        let mut job = ExportJob::new(
            job_config(tmp.path()),
            test_client(&server),
            Vec::new(),
            date_namer(),
        )
        .unwrap();

        // export before start
        let err = job.export().await.unwrap_err();
        assert!(matches!(err, Error::InvalidPhase { .. }));

        // end before export
        job.start().unwrap();
        let err = job.end().await.unwrap_err();
        assert!(matches!(err, Error::InvalidPhase { .. }));

        // start twice
        let err = job.start().unwrap_err();
        assert!(matches!(err, Error::InvalidPhase { .. }));
    }
}
