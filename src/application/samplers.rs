//! Simulated workload samplers.
//!
//! Both samplers draw every value from an injected RNG, so a seeded RNG gives
//! a fully reproducible sequence of samples.

use crate::domain::metric_set::{LabelSet, MetricDescriptor, MetricKind, Sample};
use crate::domain::ports::{SampleContext, Sampler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ERROR_TYPES: [&str; 3] = ["connection", "timeout", "validation"];
const TASK_TYPES: [&str; 3] = ["processing", "validation", "storage"];

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn with_label(base: &LabelSet, name: &str, value: &str) -> LabelSet {
    let mut labels = base.clone();
    labels.insert(name.to_string(), value.to_string());
    labels
}

/// Continuous service telemetry: CPU, memory, task counts, errors, latency
pub struct WorkloadSampler<R = StdRng> {
    prefix: String,
    labels: LabelSet,
    rng: R,
}

impl WorkloadSampler<StdRng> {
    pub fn seeded(prefix: impl Into<String>, labels: LabelSet, seed: Option<u64>) -> Self {
        Self::with_rng(prefix, labels, make_rng(seed))
    }
}

impl<R: Rng + Send> WorkloadSampler<R> {
    pub fn with_rng(prefix: impl Into<String>, labels: LabelSet, rng: R) -> Self {
        Self {
            prefix: prefix.into(),
            labels,
            rng,
        }
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }
}

impl<R: Rng + Send> Sampler for WorkloadSampler<R> {
    fn sample(&mut self, _ctx: &SampleContext) -> Vec<Sample> {
        let mut samples = Vec::with_capacity(10);

        samples.push(Sample::gauge(
            self.name("cpu_utilization"),
            self.labels.clone(),
            self.rng.random_range(5.0..95.0),
        ));
        samples.push(Sample::gauge(
            self.name("memory_usage_mb"),
            self.labels.clone(),
            self.rng.random_range(50.0..500.0),
        ));

        let succeeded = self.rng.random_range(10..=100u32);
        let failed = self.rng.random_range(0..=10u32);
        let tasks = self.name("tasks_processed_total");
        samples.push(Sample::counter(
            tasks.clone(),
            with_label(&self.labels, "status", "success"),
            f64::from(succeeded),
        ));
        samples.push(Sample::counter(
            tasks,
            with_label(&self.labels, "status", "failed"),
            f64::from(failed),
        ));

        if self.rng.random_bool(0.3) {
            let errors = self.name("errors_total");
            for error_type in ERROR_TYPES {
                if self.rng.random_bool(0.5) {
                    let count = self.rng.random_range(1..=5u32);
                    samples.push(Sample::counter(
                        errors.clone(),
                        with_label(&self.labels, "error_type", error_type),
                        f64::from(count),
                    ));
                }
            }
        }

        let latency = self.name("task_latency_ms");
        for task_type in TASK_TYPES {
            let value = self.rng.random_range(10.0..500.0);
            samples.push(Sample::gauge(
                latency.clone(),
                with_label(&self.labels, "task_type", task_type),
                value,
            ));
        }

        samples
    }

    fn descriptors(&self) -> Vec<MetricDescriptor> {
        vec![
            MetricDescriptor::new(
                self.name("cpu_utilization"),
                MetricKind::Gauge,
                "CPU utilization percentage",
            ),
            MetricDescriptor::new(
                self.name("memory_usage_mb"),
                MetricKind::Gauge,
                "Memory usage in megabytes",
            ),
            MetricDescriptor::new(
                self.name("tasks_processed_total"),
                MetricKind::Counter,
                "Number of tasks processed",
            ),
            MetricDescriptor::new(
                self.name("errors_total"),
                MetricKind::Counter,
                "Number of errors encountered",
            ),
            MetricDescriptor::new(
                self.name("task_latency_ms"),
                MetricKind::Gauge,
                "Task processing latency in milliseconds",
            ),
        ]
    }
}

pub const BATCH_DURATION_METRIC: &str = "batch_job_duration_seconds";
pub const BATCH_RECORDS_METRIC: &str = "batch_job_records_processed";

/// One-shot batch run: simulated duration and processed record count
pub struct BatchRunSampler<R = StdRng> {
    labels: LabelSet,
    rng: R,
}

impl BatchRunSampler<StdRng> {
    pub fn seeded(labels: LabelSet, seed: Option<u64>) -> Self {
        Self::with_rng(labels, make_rng(seed))
    }
}

impl<R: Rng + Send> BatchRunSampler<R> {
    pub fn with_rng(labels: LabelSet, rng: R) -> Self {
        Self { labels, rng }
    }
}

impl<R: Rng + Send> Sampler for BatchRunSampler<R> {
    fn sample(&mut self, _ctx: &SampleContext) -> Vec<Sample> {
        let duration = self.rng.random_range(5.0..=20.0);
        let records = self.rng.random_range(1000..=10000u32);
        vec![
            Sample::gauge(BATCH_DURATION_METRIC, self.labels.clone(), duration),
            Sample::counter(BATCH_RECORDS_METRIC, self.labels.clone(), f64::from(records)),
        ]
    }

    fn descriptors(&self) -> Vec<MetricDescriptor> {
        vec![
            MetricDescriptor::new(
                BATCH_DURATION_METRIC,
                MetricKind::Gauge,
                "Duration of batch job",
            ),
            MetricDescriptor::new(
                BATCH_RECORDS_METRIC,
                MetricKind::Counter,
                "Records processed",
            ),
        ]
    }
}
