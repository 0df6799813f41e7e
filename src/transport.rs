//! Bounded-retry HTTP transport
//!
//! [`RetryingTransport`] wraps a `reqwest::Client` with a retry policy for
//! transient failures: connection-level errors and a configurable set of
//! status codes (by default the server-error family). Delays between
//! attempts grow exponentially with an optional jitter.
//!
//! When the retry budget runs out on a transient STATUS, the last failing
//! response is returned as `Ok`; the decision to treat it as fatal or as
//! "no data" belongs to the caller. Exhaustion on a connection-level error
//! has no response to hand back and surfaces as `Err`.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use rand::Rng;
use std::time::Duration;

/// HTTP client wrapper enforcing the bounded-retry policy.
///
/// Holds its [`RetryConfig`] by value: per-instance, immutable. The inner
/// `reqwest::Client` is cheap to clone and internally pooled, so one
/// transport can be shared across concurrent workers.
#[derive(Clone, Debug)]
pub struct RetryingTransport {
    client: reqwest::Client,
    config: RetryConfig,
}

impl RetryingTransport {
    /// Create a transport with a fresh `reqwest::Client`
    pub fn new(config: RetryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create a transport around an existing client (custom TLS, proxy, timeouts)
    pub fn with_client(client: reqwest::Client, config: RetryConfig) -> Self {
        Self { client, config }
    }

    /// The underlying client, for building requests
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The retry policy in effect
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Send a request, retrying transient failures up to `max_retries`.
    ///
    /// A request with a non-cloneable (streaming) body is sent exactly once.
    pub async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let mut attempt: u32 = 0;
        let mut delay = self.config.retry_delay;

        loop {
            let outcome = match request.try_clone() {
                Some(clone) => self.client.execute(clone).await,
                None => return self.client.execute(request).await.map_err(Error::from),
            };

            match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !self.config.is_transient_status(status) {
                        return Ok(response);
                    }
                    if attempt >= self.config.max_retries {
                        tracing::warn!(
                            status,
                            attempts = attempt + 1,
                            "Retry budget exhausted, returning last response"
                        );
                        return Ok(response);
                    }
                    attempt += 1;
                    tracing::warn!(
                        status,
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Transient status, retrying"
                    );
                    self.backoff(&mut delay).await;
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if attempt >= self.config.max_retries {
                        tracing::warn!(
                            error = %e,
                            attempts = attempt + 1,
                            "Retry budget exhausted on connection failure"
                        );
                        return Err(Error::Network(e));
                    }
                    attempt += 1;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Connection failure, retrying"
                    );
                    self.backoff(&mut delay).await;
                }
                Err(e) => return Err(Error::Network(e)),
            }
        }
    }

    /// Sleep for the current delay (jittered if configured) and advance it
    /// by the backoff multiplier, capped at `max_delay`.
    async fn backoff(&self, delay: &mut Duration) {
        let wait = if self.config.jitter {
            add_jitter(*delay)
        } else {
            *delay
        };
        tokio::time::sleep(wait).await;

        let next = Duration::from_secs_f64(delay.as_secs_f64() * self.config.backoff_multiplier);
        *delay = next.min(self.config.max_delay);
    }
}

/// Add random jitter to a delay to prevent thundering herd.
///
/// Uniformly distributed between 0% and 100% of the delay, so the actual
/// wait falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
