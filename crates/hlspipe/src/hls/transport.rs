// Segment transport: streams one segment over HTTP into a staging file.

use crate::hls::HlsPipeError;
use crate::hls::config::SegmentFetchConfig;
use crate::hls::retry::{RetryAction, RetryPolicy, retry_with_backoff};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT_ENCODING, HeaderValue};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// What a finished transfer looked like on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// HTTP status code of the last attempt
    pub status: u16,
    /// Advertised `Content-Length`, if any
    pub content_length: Option<u64>,
    pub bytes_written: u64,
    pub elapsed: Duration,
}

impl TransferReport {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait SegmentTransport: Send + Sync {
    /// Download `uri` into `destination`, truncating it first. Cancelling
    /// `abort` stops the transfer with [`HlsPipeError::TransferAborted`].
    async fn fetch(
        &self,
        uri: &str,
        destination: &Path,
        abort: &CancellationToken,
    ) -> Result<TransferReport, HlsPipeError>;
}

/// Paces a byte stream to a fixed average rate.
#[derive(Debug)]
pub struct RateLimiter {
    bytes_per_sec: u64,
    started: Instant,
    consumed: u64,
}

impl RateLimiter {
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            bytes_per_sec,
            started: Instant::now(),
            consumed: 0,
        }
    }

    /// How long to wait after consuming `bytes` more so the average stays
    /// under the limit.
    pub fn delay_for(&mut self, bytes: u64) -> Duration {
        self.consumed = self.consumed.saturating_add(bytes);
        if self.bytes_per_sec == 0 {
            return Duration::ZERO;
        }
        let due = Duration::from_secs_f64(self.consumed as f64 / self.bytes_per_sec as f64);
        due.saturating_sub(self.started.elapsed())
    }

    pub async fn consume(&mut self, bytes: u64) {
        let delay = self.delay_for(bytes);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

pub struct HttpTransport {
    http_client: Client,
    retry_policy: RetryPolicy,
    rate_limit: u64,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(http_client: Client, config: &SegmentFetchConfig) -> Self {
        Self {
            http_client,
            retry_policy: RetryPolicy::new(
                config.max_segment_retries,
                config.segment_retry_delay_base,
                config.segment_retry_delay_max,
            ),
            rate_limit: config.rate_limit_bytes_per_sec,
            request_timeout: config.segment_request_timeout,
        }
    }

    async fn attempt(
        &self,
        uri: &str,
        destination: &Path,
        abort: &CancellationToken,
    ) -> RetryAction<TransferReport> {
        let started = Instant::now();
        let mut request = self
            .http_client
            .get(uri)
            .header(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        if !self.request_timeout.is_zero() {
            request = request.timeout(self.request_timeout);
        }

        let response = tokio::select! {
            _ = abort.cancelled() => return RetryAction::Fail(HlsPipeError::TransferAborted),
            result = request.send() => match result {
                Ok(response) => response,
                Err(e) => return classify(HlsPipeError::from(e)),
            },
        };

        let status = response.status();
        let content_length = response.content_length();
        trace!(uri, status = status.as_u16(), ?content_length, "Segment response");

        if status.is_server_error() {
            return RetryAction::Retry(HlsPipeError::SegmentFetchError(format!(
                "Server error {status} for segment {uri}"
            )));
        }
        if !status.is_success() {
            // The fetcher rejects the report; retrying a 4xx will not help.
            return RetryAction::Success(TransferReport {
                status: status.as_u16(),
                content_length,
                bytes_written: 0,
                elapsed: started.elapsed(),
            });
        }

        let mut file = match File::create(destination).await {
            Ok(file) => file,
            Err(e) => return RetryAction::Fail(e.into()),
        };
        let mut limiter = RateLimiter::new(self.rate_limit);
        let mut stream = response.bytes_stream();
        let mut bytes_written = 0u64;

        loop {
            let chunk = tokio::select! {
                _ = abort.cancelled() => return RetryAction::Fail(HlsPipeError::TransferAborted),
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    if let Err(e) = file.write_all(&bytes).await {
                        return RetryAction::Fail(e.into());
                    }
                    bytes_written += bytes.len() as u64;
                    tokio::select! {
                        _ = abort.cancelled() => return RetryAction::Fail(HlsPipeError::TransferAborted),
                        _ = limiter.consume(bytes.len() as u64) => {}
                    }
                }
                Some(Err(e)) => return classify(HlsPipeError::from(e)),
                None => break,
            }
        }

        if let Err(e) = file.flush().await {
            return RetryAction::Fail(e.into());
        }

        let report = TransferReport {
            status: status.as_u16(),
            content_length,
            bytes_written,
            elapsed: started.elapsed(),
        };
        trace!(uri, bytes = bytes_written, elapsed_ms = report.elapsed.as_millis() as u64, "Segment saved");
        RetryAction::Success(report)
    }
}

fn classify(err: HlsPipeError) -> RetryAction<TransferReport> {
    if err.is_retryable() {
        RetryAction::Retry(err)
    } else {
        RetryAction::Fail(err)
    }
}

#[async_trait]
impl SegmentTransport for HttpTransport {
    async fn fetch(
        &self,
        uri: &str,
        destination: &Path,
        abort: &CancellationToken,
    ) -> Result<TransferReport, HlsPipeError> {
        match retry_with_backoff(&self.retry_policy, abort, |_| {
            self.attempt(uri, destination, abort)
        })
        .await
        {
            // Cancellation of this token only ever comes from the watchdog.
            Err(HlsPipeError::Cancelled) => Err(HlsPipeError::TransferAborted),
            other => other,
        }
    }
}
