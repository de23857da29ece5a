//! Job dispatch over HTTP
//!
//! Every message becomes one synchronous POST to the configured job endpoint.
//! The status code is the only success signal: 2xx is `Success`, anything
//! else (including no response at all) is `Failure`.

use crate::config::WorkerConfig;
use crate::error::DispatchError;
use crate::message::Message;
use crate::metrics::MetricsSink;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Header marking a request as forwarded from the queue (sqsd-compatible).
pub const QUEUE_FORWARDED_HEADER: &str = "X-Aws-Sqsd-Receive-Count";

/// Fixed marker value; job handlers only check that the header is present.
pub const QUEUE_FORWARDED_VALUE: &str = "2";

/// Upper bound on how much of a rejected response body is kept for logs
pub const MAX_BODY_SNIPPET: usize = 2048;

/// Result of one job invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Failure(DispatchError),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success)
    }
}

/// Turns a message into a job invocation.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, message: &Message) -> DispatchOutcome;
}

/// Dispatcher that POSTs message bodies to the job endpoint
pub struct HttpDispatcher {
    client: Client,
    job_url: String,
    timeout: Duration,
    metrics: Arc<dyn MetricsSink>,
}

impl HttpDispatcher {
    /// Create a dispatcher sharing `client` with the rest of the pool.
    pub fn new(client: Client, config: &WorkerConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            client,
            job_url: config.job_url.clone(),
            timeout: config.job_timeout,
            metrics,
        }
    }

    /// HTTP client used for job invocations.
    ///
    /// The per-job timeout is applied per request, not here.
    pub fn build_client() -> Result<Client, reqwest::Error> {
        Client::builder()
            .user_agent(concat!("sqsd-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
    }

    async fn invoke(&self, message: &Message) -> DispatchOutcome {
        let result = self
            .client
            .post(&self.job_url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(QUEUE_FORWARDED_HEADER, QUEUE_FORWARDED_VALUE)
            .body(message.body.clone())
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return DispatchOutcome::Failure(DispatchError::timeout(format!(
                    "no response within {}s: {}",
                    self.timeout.as_secs(),
                    e
                )));
            }
            Err(e) => return DispatchOutcome::Failure(DispatchError::transport(e.to_string())),
        };

        let status = response.status();
        if status.is_success() {
            return DispatchOutcome::Success;
        }

        let body_snippet = read_snippet(response).await;
        DispatchOutcome::Failure(DispatchError::rejected(
            status.as_u16(),
            status_description(status),
            body_snippet,
        ))
    }
}

#[async_trait]
impl JobDispatcher for HttpDispatcher {
    async fn dispatch(&self, message: &Message) -> DispatchOutcome {
        let started = Instant::now();
        self.metrics.increment("received", &[]);

        let outcome = self.invoke(message).await;

        match &outcome {
            DispatchOutcome::Success => {
                self.metrics.increment("success", &[]);
            }
            DispatchOutcome::Failure(error) => {
                self.metrics.increment("error", &[("status", error.metric_tag())]);
            }
        }

        let elapsed = started.elapsed();
        self.metrics
            .histogram("response_time", elapsed.as_secs_f64() * 1000.0, &[]);

        match &outcome {
            DispatchOutcome::Success => info!(
                message_id = %message.log_id(),
                duration_ms = elapsed.as_millis() as u64,
                "Job succeeded"
            ),
            DispatchOutcome::Failure(DispatchError::Rejected {
                description,
                body_snippet,
                ..
            }) => warn!(
                message_id = %message.log_id(),
                status = %description,
                body = %body_snippet,
                duration_ms = elapsed.as_millis() as u64,
                "Job rejected"
            ),
            DispatchOutcome::Failure(error) => warn!(
                message_id = %message.log_id(),
                error = %error,
                duration_ms = elapsed.as_millis() as u64,
                "Job dispatch failed"
            ),
        }

        outcome
    }
}

/// Status line as the endpoint would print it, e.g. "500 Internal Server Error".
fn status_description(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

/// Read at most [`MAX_BODY_SNIPPET`] bytes of the response body.
async fn read_snippet(mut response: Response) -> String {
    let mut buf: Vec<u8> = Vec::new();

    while buf.len() < MAX_BODY_SNIPPET {
        match response.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Failed to read rejected response body");
                break;
            }
        }
    }

    snippet(buf)
}

/// Cap `buf` at [`MAX_BODY_SNIPPET`] bytes without splitting a UTF-8 character.
fn snippet(mut buf: Vec<u8>) -> String {
    buf.truncate(MAX_BODY_SNIPPET);

    if let Err(e) = std::str::from_utf8(&buf) {
        // Incomplete sequence at the end: the cut landed mid-character.
        if e.error_len().is_none() {
            buf.truncate(e.valid_up_to());
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_description() {
        assert_eq!(
            status_description(StatusCode::INTERNAL_SERVER_ERROR),
            "500 Internal Server Error"
        );
        assert_eq!(status_description(StatusCode::NOT_FOUND), "404 Not Found");
        assert_eq!(
            status_description(StatusCode::from_u16(599).unwrap()),
            "599"
        );
    }

    #[test]
    fn test_snippet_keeps_char_boundary() {
        let mut body = "a".repeat(MAX_BODY_SNIPPET - 1).into_bytes();
        body.extend_from_slice("é tail".as_bytes());

        let cut = snippet(body);
        assert_eq!(cut.len(), MAX_BODY_SNIPPET - 1);
        assert!(!cut.contains('\u{FFFD}'));
    }

    #[test]
    fn test_snippet_short_and_invalid_bodies() {
        assert_eq!(snippet(b"bad gateway".to_vec()), "bad gateway");
        // Invalid bytes inside the body are still replaced, not dropped.
        assert_eq!(snippet(vec![b'o', 0xFF, b'k']), "o\u{FFFD}k");
    }

    #[test]
    fn test_outcome_is_success() {
        assert!(DispatchOutcome::Success.is_success());
        assert!(!DispatchOutcome::Failure(DispatchError::transport("refused")).is_success());
    }
}
