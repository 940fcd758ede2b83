//! Pushes snapshots to the collector with classified retries.
//!
//! One `push` call owns its retry counter and nothing else; the exporter
//! itself is stateless between calls and can be shared across jobs.

use crate::domain::errors::{PushError, TransportError};
use crate::domain::job::PushSummary;
use crate::domain::metric_set::{LabelSet, Snapshot};
use crate::domain::ports::{PushMethod, PushRequest, Transport, TransportResponse};
use crate::infrastructure::core::shutdown::ShutdownSignal;
use crate::infrastructure::push::backoff::{ExponentialBackoff, RetryPolicy};
use crate::infrastructure::push::exposition;
use crate::infrastructure::push::target::push_url;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use url::Url;

/// Collector location and per-attempt limits
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: Url,
    pub timeout: Duration,
    pub max_retries: u32,
}

/// Classified result of a single attempt
enum Attempt {
    Delivered(u16),
    Retryable(String),
    Rejected { status: Option<u16>, reason: String },
}

fn classify(outcome: Result<TransportResponse, TransportError>) -> Attempt {
    match outcome {
        Ok(resp) => match resp.status {
            200..=299 => Attempt::Delivered(resp.status),
            500..=599 => Attempt::Retryable(format!("collector returned {}", resp.status)),
            400..=499 => Attempt::Rejected {
                status: Some(resp.status),
                reason: summarize_body(&resp.body),
            },
            other => Attempt::Rejected {
                status: Some(other),
                reason: "unexpected response status".to_string(),
            },
        },
        Err(e) if e.is_transient() => Attempt::Retryable(e.to_string()),
        Err(e) => Attempt::Rejected {
            status: None,
            reason: e.to_string(),
        },
    }
}

fn summarize_body(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "client error".to_string();
    }
    body.chars().take(200).collect()
}

/// Serializes snapshots and delivers them through a `Transport`
#[derive(Clone)]
pub struct Exporter {
    endpoint: Endpoint,
    policy: RetryPolicy,
    method: PushMethod,
    transport: Arc<dyn Transport>,
    shutdown: Option<ShutdownSignal>,
}

impl Exporter {
    pub fn new(endpoint: Endpoint, policy: RetryPolicy, transport: Arc<dyn Transport>) -> Self {
        Self {
            endpoint,
            policy,
            method: PushMethod::Put,
            transport,
            shutdown: None,
        }
    }

    /// Use `POST` (add to group) instead of `PUT` (replace group).
    pub fn with_method(mut self, method: PushMethod) -> Self {
        self.method = method;
        self
    }

    /// Stop retrying and abandon backoff sleeps once `signal` fires.
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Encode `snapshot` and push it as `job` under `grouping_key`.
    pub async fn push(
        &self,
        snapshot: &Snapshot,
        job: &str,
        grouping_key: &LabelSet,
    ) -> Result<PushSummary, PushError> {
        let url = push_url(&self.endpoint.url, job, grouping_key)?;
        let body =
            exposition::encode(snapshot).map_err(|e| PushError::Encoding(e.to_string()))?;
        let mut summary = self.send_with_retry(job, self.method, url, body).await?;
        summary.series = snapshot.len();
        Ok(summary)
    }

    /// Delete the group identified by `job` and `grouping_key`.
    pub async fn delete(&self, job: &str, grouping_key: &LabelSet) -> Result<PushSummary, PushError> {
        let url = push_url(&self.endpoint.url, job, grouping_key)?;
        self.send_with_retry(job, PushMethod::Delete, url, String::new())
            .await
    }

    async fn send_with_retry(
        &self,
        job: &str,
        method: PushMethod,
        url: String,
        body: String,
    ) -> Result<PushSummary, PushError> {
        let started = Instant::now();
        let deadline = self.policy.deadline;
        let mut backoff = ExponentialBackoff::new(&self.policy);
        let mut attempts: u32 = 0;

        loop {
            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                error!(
                    "Exporter [{}]: deadline {:?} exhausted after {} attempt(s)",
                    job, deadline, attempts
                );
                return Err(PushError::DeadlineExceeded { deadline, attempts });
            }

            attempts += 1;
            let request = PushRequest {
                method,
                url: url.clone(),
                body: body.clone(),
                timeout: self.endpoint.timeout.min(remaining),
            };
            debug!(
                "Exporter [{}]: {} {} (attempt {}, timeout {:?})",
                job, method, request.url, attempts, request.timeout
            );

            // Bound the attempt even if the transport ignores its timeout.
            let outcome = match tokio::time::timeout(request.timeout, self.transport.send(&request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(request.timeout)),
            };

            let reason = match classify(outcome) {
                Attempt::Delivered(status) => {
                    return Ok(PushSummary {
                        job: job.to_string(),
                        status,
                        attempts,
                        elapsed: started.elapsed(),
                        series: 0,
                    });
                }
                Attempt::Rejected { status, reason } => {
                    error!(
                        "Exporter [{}]: collector rejected {} (status {:?}): {}",
                        job, method, status, reason
                    );
                    return Err(PushError::PermanentRejection {
                        status,
                        reason,
                        attempts,
                    });
                }
                Attempt::Retryable(reason) => reason,
            };

            if attempts > self.endpoint.max_retries {
                error!(
                    "Exporter [{}]: giving up after {} attempt(s): {}",
                    job, attempts, reason
                );
                return Err(PushError::TransientNetworkError { attempts, reason });
            }
            if self.shutdown.as_ref().is_some_and(|s| s.is_triggered()) {
                return Err(PushError::Interrupted { attempts, reason });
            }

            let delay = backoff.next_delay(&mut rand::rng());
            let wait = delay.min(deadline.saturating_sub(started.elapsed()));
            warn!(
                "Exporter [{}]: attempt {} failed ({}), retrying in {:?}",
                job, attempts, reason, wait
            );

            match &self.shutdown {
                Some(signal) => {
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = signal.cancelled() => {
                            return Err(PushError::Interrupted { attempts, reason });
                        }
                    }
                }
                None => tokio::time::sleep(wait).await,
            }
        }
    }
}
