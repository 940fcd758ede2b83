use crate::infrastructure::observability::PusherMetrics;
use std::time::{Duration, Instant};

/// Times one push call and records its latency together with its outcome.
///
/// A timer dropped without `finish` (the push future was aborted) still
/// observes its latency and counts the push as `abandoned`.
pub struct PushTimer {
    metrics: PusherMetrics,
    job: String,
    start: Instant,
    finished: bool,
}

impl PushTimer {
    pub(crate) fn new(metrics: PusherMetrics, job: &str) -> Self {
        Self {
            metrics,
            job: job.to_string(),
            start: Instant::now(),
            finished: false,
        }
    }

    /// Record the push as `outcome` after `attempts` wire attempts.
    pub fn finish(mut self, outcome: &str, attempts: u32) -> Duration {
        self.finished = true;
        let elapsed = self.observe();
        self.metrics.record_push(&self.job, outcome, attempts);
        elapsed
    }

    fn observe(&self) -> Duration {
        let elapsed = self.start.elapsed();
        self.metrics
            .push_duration_seconds
            .with_label_values(&[self.job.as_str()])
            .observe(elapsed.as_secs_f64());
        elapsed
    }
}

impl Drop for PushTimer {
    fn drop(&mut self) {
        if !self.finished {
            self.observe();
            self.metrics
                .pushes_total
                .with_label_values(&[self.job.as_str(), "abandoned"])
                .inc();
        }
    }
}
