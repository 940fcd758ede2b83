//! Job scheduling: continuous tick loops and one-shot runs.
//!
//! Every job owns its own `MetricSet`; the only thing jobs share is the
//! exporter (stateless) and the shutdown signal.

use crate::domain::errors::PushError;
use crate::domain::job::{JobSpec, JobState, PushJob, PushSummary};
use crate::domain::metric_set::MetricSet;
use crate::domain::ports::{SampleContext, Sampler};
use crate::infrastructure::core::shutdown::ShutdownSignal;
use crate::infrastructure::observability::PusherMetrics;
use crate::infrastructure::push::Exporter;
use anyhow::Result;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A job together with everything it exclusively owns
pub struct JobRunner {
    spec: JobSpec,
    job: PushJob,
    metric_set: MetricSet,
    sampler: Box<dyn Sampler>,
    state_tx: watch::Sender<JobState>,
}

impl JobRunner {
    pub fn new(spec: JobSpec, sampler: Box<dyn Sampler>) -> Self {
        let metric_set = MetricSet::new();
        for descriptor in sampler.descriptors() {
            metric_set.describe(&descriptor.name, &descriptor.help);
        }
        let job = PushJob::new(&spec);
        let (state_tx, _) = watch::channel(job.state);

        Self {
            spec,
            job,
            metric_set,
            sampler,
            state_tx,
        }
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn job(&self) -> &PushJob {
        &self.job
    }

    pub fn metric_set(&self) -> &MetricSet {
        &self.metric_set
    }

    /// Watch the job's state as it moves through its lifecycle.
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state_tx.subscribe()
    }

    pub fn into_job(self) -> PushJob {
        self.job
    }

    fn set_state(&mut self, next: JobState) {
        if self.job.transition(next) {
            self.state_tx.send_replace(next);
        }
    }

    fn sample_tick(&mut self, metrics: &PusherMetrics) {
        self.job.ticks += 1;
        let ctx = SampleContext {
            job: self.spec.id.clone(),
            tick: self.job.ticks,
            now: Utc::now(),
        };
        let samples = self.sampler.sample(&ctx);
        if let Err(e) = self.metric_set.apply(&samples) {
            error!(
                "Scheduler [{}]: sampler output rejected on tick {}: {}",
                self.spec.id, self.job.ticks, e
            );
            metrics.inc_sample_errors(&self.spec.id);
        }
    }
}

/// Bounds of the random pause between batch runs in `both` mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPause {
    pub min: Duration,
    pub max: Duration,
}

impl Default for BatchPause {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(30),
            max: Duration::from_secs(60),
        }
    }
}

impl BatchPause {
    fn draw<R: Rng>(&self, rng: &mut R) -> Duration {
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        Duration::from_secs_f64(rng.random_range(lo.as_secs_f64()..=hi.as_secs_f64()))
    }
}

/// Final state of both jobs after `run_both`
#[derive(Debug)]
pub struct BothReport {
    pub continuous: PushJob,
    /// The most recent batch run, `None` if shutdown came before the first
    pub batch: Option<PushJob>,
    pub batch_runs: u64,
    pub batch_failures: u64,
}

#[derive(Clone)]
pub struct Scheduler {
    exporter: Exporter,
    shutdown: ShutdownSignal,
    metrics: PusherMetrics,
}

impl Scheduler {
    pub fn new(exporter: Exporter, shutdown: ShutdownSignal, metrics: PusherMetrics) -> Self {
        Self {
            exporter: exporter.with_shutdown(shutdown.clone()),
            shutdown,
            metrics,
        }
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    pub fn metrics(&self) -> &PusherMetrics {
        &self.metrics
    }

    /// Sample into the job's metric set, then push a snapshot of it.
    async fn cycle(&self, runner: &mut JobRunner) -> Result<PushSummary, PushError> {
        runner.set_state(JobState::Sampling);
        runner.sample_tick(&self.metrics);

        runner.set_state(JobState::Pushing);
        let snapshot = runner.metric_set.snapshot();
        let job_id = runner.spec.id.as_str();
        let timer = self.metrics.time_push(job_id);
        let result = self
            .exporter
            .push(&snapshot, job_id, &runner.spec.grouping_key)
            .await;

        match &result {
            Ok(summary) => {
                timer.finish("success", summary.attempts);
                info!(
                    "Scheduler [{}]: pushed {} series (status {}, {} attempt(s), {:?})",
                    job_id, summary.series, summary.status, summary.attempts, summary.elapsed
                );
                runner.job.record_success(summary);
            }
            Err(e) => {
                timer.finish(e.kind(), e.attempts());
                runner.job.record_failure(e.kind(), e.to_string());
            }
        }
        result
    }

    /// Tick until shutdown: sample, push, sleep for what is left of the interval.
    ///
    /// Push failures are logged and counted; they never end the loop.
    pub async fn run_continuous(&self, mut runner: JobRunner) -> PushJob {
        info!(
            "Scheduler [{}]: starting continuous job (interval {:?})",
            runner.spec.id, runner.spec.interval
        );

        loop {
            if self.shutdown.is_triggered() {
                break;
            }
            let tick_started = Instant::now();

            if let Err(e) = self.cycle(&mut runner).await {
                warn!(
                    "Scheduler [{}]: push failed, continuing with next tick: {}",
                    runner.spec.id, e
                );
            }
            if self.shutdown.is_triggered() {
                break;
            }

            runner.set_state(JobState::Sleeping);
            let wait = runner.spec.interval.saturating_sub(tick_started.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        runner.set_state(JobState::Cancelled);
        info!(
            "Scheduler [{}]: cancelled after {} tick(s) ({} ok, {} failed)",
            runner.spec.id, runner.job.ticks, runner.job.pushes_succeeded, runner.job.pushes_failed
        );
        runner.into_job()
    }

    /// Run `run_continuous` on its own task.
    pub fn spawn_continuous(&self, runner: JobRunner) -> JoinHandle<PushJob> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run_continuous(runner).await })
    }

    /// One sample → push cycle, returning its outcome.
    pub async fn run_once(&self, runner: &mut JobRunner) -> Result<PushSummary, PushError> {
        if runner.job.state.is_terminal() {
            return Err(PushError::Interrupted {
                attempts: 0,
                reason: format!("job '{}' is cancelled", runner.spec.id),
            });
        }

        let result = self.cycle(runner).await;
        runner.set_state(JobState::Idle);
        result
    }

    /// Continuous job in the background plus batch runs at random pauses,
    /// until shutdown.
    ///
    /// `next_batch` is called once per run. Each run is its own job with its
    /// own `MetricSet`, so a batch counter never goes backwards on a series
    /// the collector already holds.
    pub async fn run_both<F>(
        &self,
        continuous: JobRunner,
        mut next_batch: F,
        pause: BatchPause,
    ) -> Result<BothReport>
    where
        F: FnMut() -> JobRunner,
    {
        let continuous_handle = self.spawn_continuous(continuous);
        let mut rng = StdRng::from_os_rng();
        let mut last_batch: Option<JobRunner> = None;
        let mut batch_runs = 0u64;
        let mut batch_failures = 0u64;

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            let mut batch = next_batch();
            batch_runs += 1;
            match self.run_once(&mut batch).await {
                Ok(summary) => info!(
                    "Scheduler [{}]: batch run {} delivered {} series",
                    batch.spec.id, batch_runs, summary.series
                ),
                Err(e) => {
                    batch_failures += 1;
                    warn!(
                        "Scheduler [{}]: batch run {} failed: {}",
                        batch.spec.id, batch_runs, e
                    );
                }
            }
            last_batch = Some(batch);

            let wait = pause.draw(&mut rng);
            info!("Scheduler: next batch run in {:?}", wait);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        let batch = last_batch.map(|mut runner| {
            runner.set_state(JobState::Cancelled);
            runner.into_job()
        });
        let continuous = continuous_handle.await?;

        Ok(BothReport {
            continuous,
            batch,
            batch_runs,
            batch_failures,
        })
    }
}
