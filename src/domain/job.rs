//! Push job description and lifecycle state.

use crate::domain::metric_set::LabelSet;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Lifecycle of a job. `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Sampling,
    Pushing,
    Sleeping,
    Cancelled,
}

impl JobState {
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Cancelled, _) => false,
            (_, Cancelled) => true,
            (Idle, Sampling) | (Sampling, Pushing) | (Pushing, Sleeping) | (Sleeping, Sampling) => {
                true
            }
            // one-shot runs go back to idle after their push
            (Pushing, Idle) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == JobState::Cancelled
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Static configuration of a push job
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Job name used in the collector URL
    pub id: String,
    pub interval: Duration,
    pub grouping_key: LabelSet,
}

impl JobSpec {
    pub fn new(id: impl Into<String>, interval: Duration) -> Self {
        Self {
            id: id.into(),
            interval,
            grouping_key: LabelSet::new(),
        }
    }

    pub fn with_grouping_key(mut self, grouping_key: LabelSet) -> Self {
        self.grouping_key = grouping_key;
        self
    }
}

/// Result of the most recent push
#[derive(Debug, Clone, PartialEq)]
pub enum PushStatus {
    Success { status: u16, attempts: u32 },
    Failed { kind: &'static str, message: String },
}

impl PushStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, PushStatus::Success { .. })
    }
}

/// Outcome of a successful push
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushSummary {
    pub job: String,
    pub status: u16,
    pub attempts: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub series: usize,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Runtime state of a job, mutated every tick
#[derive(Debug, Clone)]
pub struct PushJob {
    pub id: String,
    pub interval: Duration,
    pub grouping_key: LabelSet,
    pub last_push_time: Option<DateTime<Utc>>,
    pub last_push_status: Option<PushStatus>,
    pub state: JobState,
    pub ticks: u64,
    pub pushes_succeeded: u64,
    pub pushes_failed: u64,
}

impl PushJob {
    pub fn new(spec: &JobSpec) -> Self {
        Self {
            id: spec.id.clone(),
            interval: spec.interval,
            grouping_key: spec.grouping_key.clone(),
            last_push_time: None,
            last_push_status: None,
            state: JobState::Idle,
            ticks: 0,
            pushes_succeeded: 0,
            pushes_failed: 0,
        }
    }

    /// Move to `next`. Returns false and stays put on an illegal transition.
    pub fn transition(&mut self, next: JobState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                "Job [{}]: ignoring illegal transition {} -> {}",
                self.id,
                self.state,
                next
            );
            return false;
        }
        tracing::trace!("Job [{}]: {} -> {}", self.id, self.state, next);
        self.state = next;
        true
    }

    pub fn record_success(&mut self, summary: &PushSummary) {
        self.last_push_time = Some(Utc::now());
        self.last_push_status = Some(PushStatus::Success {
            status: summary.status,
            attempts: summary.attempts,
        });
        self.pushes_succeeded += 1;
    }

    pub fn record_failure(&mut self, kind: &'static str, message: String) {
        self.last_push_time = Some(Utc::now());
        self.last_push_status = Some(PushStatus::Failed { kind, message });
        self.pushes_failed += 1;
    }
}
