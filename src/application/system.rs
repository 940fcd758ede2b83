//! Wiring: config in, running jobs out.

use crate::application::samplers::{BatchRunSampler, WorkloadSampler};
use crate::application::scheduler::{JobRunner, Scheduler};
use crate::config::{Config, JobMode};
use crate::domain::errors::PushError;
use crate::domain::job::{JobSpec, PushJob, PushSummary};
use crate::domain::ports::Transport;
use crate::infrastructure::HttpTransport;
use crate::infrastructure::core::shutdown::ShutdownSignal;
use crate::infrastructure::observability::PusherMetrics;
use crate::infrastructure::push::Exporter;
use anyhow::Result;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Application {
    pub config: Config,
    pub scheduler: Scheduler,
    // Not bound to the shutdown signal, so the final delete still runs after it fires.
    exporter: Exporter,
    shutdown: ShutdownSignal,
    run_id: i64,
}

impl Application {
    pub fn build(config: Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.collector.timeout));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        info!(
            "Building metric pusher (mode: {}, collector: {}, interval: {:?})",
            config.job.mode, config.collector.url, config.job.interval
        );

        let metrics = PusherMetrics::new()?;
        let exporter = Exporter::new(
            config.collector.endpoint(),
            config.collector.retry_policy(),
            transport,
        )
        .with_method(config.collector.method);
        let shutdown = ShutdownSignal::new();
        let scheduler = Scheduler::new(exporter.clone(), shutdown.clone(), metrics);

        Ok(Self {
            config,
            scheduler,
            exporter,
            shutdown,
            run_id: Utc::now().timestamp(),
        })
    }

    /// Pin the timestamp used in job names and the batch `job_id` label.
    pub fn with_run_id(mut self, run_id: i64) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn metrics(&self) -> &PusherMetrics {
        self.scheduler.metrics()
    }

    pub fn continuous_runner(&self) -> JobRunner {
        let sampler = WorkloadSampler::seeded(
            self.config.job.metrics_prefix.clone(),
            self.config.static_labels(),
            self.config.job.sampler_seed,
        );
        JobRunner::new(
            self.config.continuous_spec(self.run_id),
            Box::new(sampler),
        )
    }

    /// Batch runner named after the application's run id.
    pub fn batch_runner(&self) -> JobRunner {
        self.batch_runner_for(self.run_id)
    }

    /// Batch runner for one run: `batch-job-<run_id>` with a matching `job_id` label.
    pub fn batch_runner_for(&self, run_id: i64) -> JobRunner {
        let mut labels = self.config.static_labels();
        labels.insert("job_id".to_string(), run_id.to_string());
        let sampler = BatchRunSampler::seeded(labels, self.config.job.sampler_seed);
        JobRunner::new(self.config.batch_spec(run_id), Box::new(sampler))
    }

    /// Fresh batch runners for `both` mode, one per run.
    ///
    /// Run ids follow the wall clock but never repeat, even when two runs
    /// start within the same second.
    fn batch_runners(&self) -> impl FnMut() -> JobRunner + '_ {
        let mut last_id: Option<i64> = None;
        move || {
            let now = Utc::now().timestamp();
            let run_id = match last_id {
                Some(last) => now.max(last + 1),
                None => now.max(self.run_id),
            };
            last_id = Some(run_id);
            self.batch_runner_for(run_id)
        }
    }

    /// A single batch run: sample once, push once (with retries).
    pub async fn run_batch(&self) -> Result<PushSummary, PushError> {
        let mut runner = self.batch_runner();
        info!("Starting batch job {}", runner.spec().id);
        self.scheduler.run_once(&mut runner).await
    }

    /// Spawn the long-running jobs: the continuous job, plus the batch loop
    /// in `both` mode. A single batch run goes through `run_batch` instead.
    pub fn start(self) -> SystemHandle {
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move { self.run().await });
        SystemHandle { shutdown, task }
    }

    async fn run(self) -> Result<RunReport> {
        let continuous = self.continuous_runner();
        let spec = continuous.spec().clone();

        let report = if self.config.job.mode == JobMode::Both {
            let report = self
                .scheduler
                .run_both(continuous, self.batch_runners(), self.config.batch_pause())
                .await?;
            RunReport {
                continuous: Some(report.continuous),
                batch: report.batch,
                batch_runs: report.batch_runs,
            }
        } else {
            RunReport {
                continuous: Some(self.scheduler.run_continuous(continuous).await),
                batch: None,
                batch_runs: 0,
            }
        };

        self.delete_group(&spec).await;
        Ok(report)
    }

    async fn delete_group(&self, spec: &JobSpec) {
        if !self.config.collector.delete_on_shutdown {
            return;
        }
        match self.exporter.delete(&spec.id, &spec.grouping_key).await {
            Ok(summary) => info!(
                "Deleted group for job {} (status {}, {} attempt(s))",
                spec.id, summary.status, summary.attempts
            ),
            Err(e) => warn!("Failed to delete group for job {}: {}", spec.id, e),
        }
    }
}

/// What the jobs looked like when they stopped
#[derive(Debug)]
pub struct RunReport {
    pub continuous: Option<PushJob>,
    pub batch: Option<PushJob>,
    pub batch_runs: u64,
}

#[derive(Debug)]
pub enum ShutdownOutcome {
    /// Every job observed the signal and returned
    Clean(RunReport),
    /// Grace period elapsed or a second signal arrived; jobs were aborted
    Forced,
}

pub struct SystemHandle {
    shutdown: ShutdownSignal,
    task: JoinHandle<Result<RunReport>>,
}

impl SystemHandle {
    /// Signal every job and wait at most `grace` for them to stop.
    ///
    /// `force` resolving first (a second interrupt) aborts the jobs immediately.
    pub async fn shutdown<F>(mut self, grace: Duration, force: F) -> Result<ShutdownOutcome>
    where
        F: Future<Output = ()>,
    {
        info!("Shutdown requested, waiting up to {:?} for jobs", grace);
        self.shutdown.trigger();

        tokio::select! {
            joined = &mut self.task => Ok(ShutdownOutcome::Clean(joined??)),
            _ = tokio::time::sleep(grace) => {
                warn!("Jobs still running after {:?}, aborting", grace);
                self.task.abort();
                Ok(ShutdownOutcome::Forced)
            }
            _ = force => {
                warn!("Second interrupt received, aborting jobs");
                self.task.abort();
                Ok(ShutdownOutcome::Forced)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::JobState;
    use crate::infrastructure::{MockReply, ScriptedTransport};
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(&|key: &str| map.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_batch_runner_carries_job_id_label() {
        let app = Application::with_transport(
            config(&[("INSTANCE_NAME", "host-1"), ("SAMPLER_SEED", "9")]),
            Arc::new(ScriptedTransport::accepting()),
        )
        .unwrap()
        .with_run_id(1700000000);

        let runner = app.batch_runner();
        assert_eq!(runner.spec().id, "batch-job-1700000000");
        assert!(runner.spec().grouping_key.is_empty());

        let continuous = app.continuous_runner();
        assert_eq!(continuous.spec().id, "sample-batch-app-1700000000");
        assert_eq!(continuous.spec().grouping_key["instance"], "host-1");
    }

    #[tokio::test]
    async fn test_run_batch_pushes_job_id() {
        let transport = ScriptedTransport::accepting();
        let app = Application::with_transport(
            config(&[("INSTANCE_NAME", "host-1"), ("SAMPLER_SEED", "9")]),
            Arc::new(transport.clone()),
        )
        .unwrap()
        .with_run_id(42);

        let summary = app.run_batch().await.unwrap();
        assert_eq!(summary.job, "batch-job-42");
        assert_eq!(summary.series, 2);

        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].contains("job_id=\"42\""));
        assert!(transport.requests()[0].url.ends_with("/metrics/job/batch-job-42"));
    }

    #[tokio::test]
    async fn test_continuous_shutdown_deletes_group() {
        let transport = ScriptedTransport::accepting();
        let app = Application::with_transport(
            config(&[
                ("INSTANCE_NAME", "host-1"),
                ("PUSH_INTERVAL", "1"),
                ("DELETE_ON_SHUTDOWN", "true"),
            ]),
            Arc::new(transport.clone()),
        )
        .unwrap()
        .with_run_id(7);

        let handle = app.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let outcome = handle
            .shutdown(Duration::from_secs(5), std::future::pending())
            .await
            .unwrap();
        let report = match outcome {
            ShutdownOutcome::Clean(report) => report,
            ShutdownOutcome::Forced => panic!("expected a clean shutdown"),
        };
        let job = report.continuous.unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert!(job.ticks >= 1);

        let requests = transport.requests();
        let last = requests.last().unwrap();
        assert_eq!(last.method, crate::domain::ports::PushMethod::Delete);
        assert!(last.url.contains("/metrics/job/sample-batch-app-7/"));
    }

    #[tokio::test]
    async fn test_both_mode_gives_every_batch_run_its_own_job() {
        let transport = ScriptedTransport::accepting();
        let app = Application::with_transport(
            config(&[
                ("JOB_MODE", "both"),
                ("INSTANCE_NAME", "host-1"),
                ("PUSH_INTERVAL", "1"),
                ("BATCH_PAUSE_MIN_SECS", "0"),
                ("BATCH_PAUSE_MAX_SECS", "0"),
                ("SAMPLER_SEED", "3"),
            ]),
            Arc::new(transport.clone()),
        )
        .unwrap();

        let handle = app.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let report = match handle
            .shutdown(Duration::from_secs(5), std::future::pending())
            .await
            .unwrap()
        {
            ShutdownOutcome::Clean(report) => report,
            ShutdownOutcome::Forced => panic!("expected a clean shutdown"),
        };
        assert!(report.batch_runs >= 2);
        assert_eq!(report.batch.unwrap().state, JobState::Cancelled);

        let batch_requests: Vec<_> = transport
            .requests()
            .into_iter()
            .filter(|r| r.url.contains("/metrics/job/batch-job-"))
            .collect();
        assert_eq!(batch_requests.len() as u64, report.batch_runs);

        let mut previous: Option<i64> = None;
        for request in &batch_requests {
            let run_id: i64 = request
                .url
                .rsplit("batch-job-")
                .next()
                .and_then(|id| id.parse().ok())
                .unwrap();
            assert!(request.body.contains(&format!("job_id=\"{}\"", run_id)));
            if let Some(previous) = previous {
                assert!(run_id > previous, "run id {} reused after {}", run_id, previous);
            }
            previous = Some(run_id);
        }
    }

    #[tokio::test]
    async fn test_second_signal_forces_shutdown() {
        let app = Application::with_transport(
            config(&[("PUSH_INTERVAL", "1"), ("PUSH_DEADLINE_SECS", "30")]),
            Arc::new(ScriptedTransport::always(MockReply::Hang)),
        )
        .unwrap();

        let handle = app.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let outcome = handle
            .shutdown(Duration::from_secs(60), async {})
            .await
            .unwrap();
        assert!(matches!(outcome, ShutdownOutcome::Forced));
    }
}
