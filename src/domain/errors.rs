use std::time::Duration;
use thiserror::Error;

/// Errors raised by `MetricSet` on malformed caller input
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl MetricError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        MetricError::InvalidArgument {
            reason: reason.into(),
        }
    }
}

/// Low-level failures reported by a `Transport`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Timeouts and connection failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout(_) | TransportError::Connect(_))
    }
}

/// Outcome classification of a failed push
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PushError {
    #[error("Transient network error after {attempts} attempt(s): {reason}")]
    TransientNetworkError { attempts: u32, reason: String },

    #[error("Collector rejected push (status {status:?}) on attempt {attempts}: {reason}")]
    PermanentRejection {
        status: Option<u16>,
        reason: String,
        attempts: u32,
    },

    #[error("Push deadline of {deadline:?} exceeded after {attempts} attempt(s)")]
    DeadlineExceeded { deadline: Duration, attempts: u32 },

    #[error("Push interrupted by shutdown after {attempts} attempt(s): {reason}")]
    Interrupted { attempts: u32, reason: String },

    #[error("Invalid push target: {0}")]
    InvalidTarget(String),

    #[error("Failed to encode metrics: {0}")]
    Encoding(String),
}

impl PushError {
    /// Short label used for logs and self-metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PushError::TransientNetworkError { .. } => "transient",
            PushError::PermanentRejection { .. } => "rejected",
            PushError::DeadlineExceeded { .. } => "deadline",
            PushError::Interrupted { .. } => "interrupted",
            PushError::InvalidTarget(_) => "invalid_target",
            PushError::Encoding(_) => "encoding",
        }
    }

    /// Wire attempts made before the error surfaced.
    pub fn attempts(&self) -> u32 {
        match self {
            PushError::TransientNetworkError { attempts, .. }
            | PushError::DeadlineExceeded { attempts, .. }
            | PushError::Interrupted { attempts, .. }
            | PushError::PermanentRejection { attempts, .. } => *attempts,
            PushError::InvalidTarget(_) | PushError::Encoding(_) => 0,
        }
    }
}
