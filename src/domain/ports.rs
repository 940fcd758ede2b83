use crate::domain::errors::TransportError;
use crate::domain::metric_set::{MetricDescriptor, Sample};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// HTTP verb used against the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMethod {
    /// Replace every metric of the group
    Put,
    /// Replace only the metric families present in the payload
    Post,
    /// Remove the group
    Delete,
}

impl PushMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushMethod::Put => "PUT",
            PushMethod::Post => "POST",
            PushMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for PushMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "put" => Ok(PushMethod::Put),
            "post" => Ok(PushMethod::Post),
            _ => anyhow::bail!("Invalid PUSH_METHOD: {}. Must be 'put' or 'post'", s),
        }
    }
}

/// One request to the collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    pub method: PushMethod,
    pub url: String,
    pub body: String,
    /// Upper bound for this single attempt
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// Carries a push request to the collector.
///
/// Implementations report what happened on the wire; classifying the outcome
/// and retrying is the exporter's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PushRequest) -> Result<TransportResponse, TransportError>;
}

/// Per-tick information handed to a sampler
#[derive(Debug, Clone)]
pub struct SampleContext {
    pub job: String,
    pub tick: u64,
    pub now: DateTime<Utc>,
}

/// Produces new measurement values on each tick. Never fails.
pub trait Sampler: Send {
    fn sample(&mut self, ctx: &SampleContext) -> Vec<Sample>;

    /// Families this sampler emits, used for HELP text.
    fn descriptors(&self) -> Vec<MetricDescriptor> {
        Vec::new()
    }
}
