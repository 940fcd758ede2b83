//! Prometheus self-metrics for the pusher.
//!
//! All metrics use the `metric_pusher_` prefix. They live in a private
//! registry and describe the pusher itself, never the pushed workload.

use crate::infrastructure::observability::PushTimer;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct PusherMetrics {
    registry: Arc<Registry>,
    /// Completed push calls by job and outcome
    pub pushes_total: IntCounterVec,
    /// Wire attempts made by job
    pub push_attempts_total: IntCounterVec,
    /// Wall time of a push call, retries included
    pub push_duration_seconds: HistogramVec,
    /// Sampler output rejected by a MetricSet
    pub sample_errors_total: IntCounterVec,
}

impl PusherMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let pushes_total = IntCounterVec::new(
            Opts::new(
                "metric_pusher_pushes_total",
                "Completed push calls by job and outcome",
            ),
            &["job", "outcome"],
        )?;
        registry.register(Box::new(pushes_total.clone()))?;

        let push_attempts_total = IntCounterVec::new(
            Opts::new(
                "metric_pusher_push_attempts_total",
                "Wire attempts made against the collector",
            ),
            &["job"],
        )?;
        registry.register(Box::new(push_attempts_total.clone()))?;

        let push_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "metric_pusher_push_duration_seconds",
                "Push call latency in seconds, retries included",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["job"],
        )?;
        registry.register(Box::new(push_duration_seconds.clone()))?;

        let sample_errors_total = IntCounterVec::new(
            Opts::new(
                "metric_pusher_sample_errors_total",
                "Sampler batches rejected by the metric set",
            ),
            &["job"],
        )?;
        registry.register(Box::new(sample_errors_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            pushes_total,
            push_attempts_total,
            push_duration_seconds,
            sample_errors_total,
        })
    }

    /// Render all self-metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    /// Start timing a push for `job`; see `PushTimer::finish`.
    pub fn time_push(&self, job: &str) -> PushTimer {
        PushTimer::new(self.clone(), job)
    }

    pub fn record_push(&self, job: &str, outcome: &str, attempts: u32) {
        self.pushes_total.with_label_values(&[job, outcome]).inc();
        self.push_attempts_total
            .with_label_values(&[job])
            .inc_by(u64::from(attempts));
    }

    pub fn inc_sample_errors(&self, job: &str) {
        self.sample_errors_total.with_label_values(&[job]).inc();
    }

    pub fn pushes(&self, job: &str, outcome: &str) -> u64 {
        self.pushes_total.with_label_values(&[job, outcome]).get()
    }

    pub fn attempts(&self, job: &str) -> u64 {
        self.push_attempts_total.with_label_values(&[job]).get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = PusherMetrics::new().expect("Failed to create metrics");
        metrics.record_push("demo", "success", 1);
        assert!(metrics.render().contains("metric_pusher_"));
    }

    #[test]
    fn test_push_outcomes_counted_per_job() {
        let metrics = PusherMetrics::new().expect("Failed to create metrics");
        metrics.record_push("demo", "success", 1);
        metrics.record_push("demo", "success", 3);
        metrics.record_push("demo", "transient", 4);
        metrics.record_push("batch", "success", 1);

        assert_eq!(metrics.pushes("demo", "success"), 2);
        assert_eq!(metrics.pushes("demo", "transient"), 1);
        assert_eq!(metrics.attempts("demo"), 8);
        assert_eq!(metrics.attempts("batch"), 1);

        let output = metrics.render();
        assert!(output.contains("metric_pusher_pushes_total{job=\"demo\",outcome=\"success\"} 2"));
    }
}
