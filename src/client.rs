//! Report fetching client
//!
//! [`ReportClient`] issues one authenticated GET per work item and
//! classifies the response: 200 parses into a table, 204 is "no content",
//! and anything else (including retry-exhausted server errors) degrades
//! to an empty result with a logged warning. The silent-degrade contract
//! is deliberate: a failed request produces no data and no error, and the
//! logs are the only way to tell it apart from a genuinely empty report.

use crate::config::RetryConfig;
use crate::error::Result;
use crate::table::Table;
use crate::transport::RetryingTransport;
use crate::types::{FetchResult, WorkItem};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use url::Url;

/// Client for one report endpoint.
///
/// A flat composition: the endpoint, the bearer token, and a
/// [`RetryingTransport`]. Cloneable and safe to share across workers (the
/// transport's connection pool is the only shared state).
#[derive(Clone, Debug)]
pub struct ReportClient {
    endpoint: Url,
    api_key: String,
    transport: RetryingTransport,
    mute_log: bool,
}

impl ReportClient {
    /// Create a client for `endpoint`, authenticating with `api_key`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use report_export::{ReportClient, RetryConfig};
    ///
    /// # fn main() -> report_export::Result<()> {
    /// let client = ReportClient::new(
    ///     "https://reports.example.com/api/csv_report",
    ///     "secret-key",
    ///     RetryConfig::default(),
    /// )?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        endpoint: impl reqwest::IntoUrl,
        api_key: impl Into<String>,
        retry: RetryConfig,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into_url()?,
            api_key: api_key.into(),
            transport: RetryingTransport::new(retry),
            mute_log: false,
        })
    }

    /// Create a client around an existing transport
    pub fn with_transport(
        endpoint: impl reqwest::IntoUrl,
        api_key: impl Into<String>,
        transport: RetryingTransport,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into_url()?,
            api_key: api_key.into(),
            transport,
            mute_log: false,
        })
    }

    /// Suppress info-level diagnostics (row counts); warnings still emit
    #[must_use]
    pub fn mute_log(mut self, mute: bool) -> Self {
        self.mute_log = mute;
        self
    }

    /// The report endpoint this client talks to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Fetch one report.
    ///
    /// Never returns `Err` for remote-side failures; the only hard errors
    /// are a request that cannot be built and a 200 body that fails to
    /// parse as delimited text (which must abort the batch rather than
    /// silently drop data).
    pub async fn fetch(&self, params: &WorkItem) -> Result<FetchResult> {
        let request = self
            .transport
            .client()
            .get(self.endpoint.clone())
            .query(&params.query_pairs())
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .build()?;

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Report request failed, skipped");
                return Ok(FetchResult::Empty);
            }
        };

        match response.status() {
            StatusCode::OK => {
                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read report body, skipped");
                        return Ok(FetchResult::Empty);
                    }
                };
                let table = Table::from_csv_str(&body)?;
                if !self.mute_log {
                    tracing::info!(rows = table.row_count(), "Report fetched");
                }
                if table.is_empty() {
                    Ok(FetchResult::Empty)
                } else {
                    Ok(FetchResult::Table(table))
                }
            }
            StatusCode::NO_CONTENT => {
                tracing::warn!("No content for report request");
                Ok(FetchResult::Empty)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let detail = serde_json::from_str::<serde_json::Value>(&body)
                    .map(|v| v.to_string())
                    .unwrap_or(body);
                tracing::warn!(
                    status = status.as_u16(),
                    error = %detail,
                    "Report not available, skipped"
                );
                Ok(FetchResult::Empty)
            }
        }
    }
}
