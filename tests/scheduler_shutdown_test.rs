use metric_pusher::application::samplers::{BatchRunSampler, WorkloadSampler};
use metric_pusher::application::scheduler::{BatchPause, BothReport, JobRunner, Scheduler};
use metric_pusher::domain::job::{JobSpec, JobState};
use metric_pusher::domain::metric_set::labels;
use metric_pusher::infrastructure::core::shutdown::ShutdownSignal;
use metric_pusher::infrastructure::observability::PusherMetrics;
use metric_pusher::infrastructure::push::{Endpoint, Exporter, RetryPolicy, parse_collector_url};
use metric_pusher::infrastructure::{MockReply, ScriptedTransport};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn scheduler(transport: ScriptedTransport, deadline: Duration) -> Scheduler {
    let endpoint = Endpoint {
        url: parse_collector_url("gateway:9091").unwrap(),
        timeout: Duration::from_millis(200),
        max_retries: 3,
    };
    let policy = RetryPolicy {
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        deadline,
        ..RetryPolicy::default()
    };
    Scheduler::new(
        Exporter::new(endpoint, policy, Arc::new(transport)),
        ShutdownSignal::new(),
        PusherMetrics::new().unwrap(),
    )
}

fn continuous_runner(interval: Duration) -> JobRunner {
    let spec = JobSpec::new("demo-app-1", interval)
        .with_grouping_key(labels([("instance", "host-1"), ("pod", "demo-0")]));
    JobRunner::new(
        spec,
        Box::new(WorkloadSampler::seeded(
            "demo",
            labels([("instance", "host-1"), ("app", "demo-app")]),
            Some(11),
        )),
    )
}

fn batch_runner(run_id: u64) -> JobRunner {
    let job_id = run_id.to_string();
    JobRunner::new(
        JobSpec::new(format!("batch-job-{}", run_id), Duration::from_secs(1)),
        Box::new(BatchRunSampler::seeded(
            labels([("instance", "host-1"), ("job_id", job_id.as_str())]),
            Some(11 + run_id),
        )),
    )
}

/// Factory handing out a fresh batch runner with the next run id on each call
fn batch_runners() -> impl FnMut() -> JobRunner + Send + 'static {
    let mut run_id = 0;
    move || {
        run_id += 1;
        batch_runner(run_id)
    }
}

/// `(url, series labels) -> value` for every `batch_job_records_processed` sample
fn records_samples(url: &str, body: &str) -> Vec<((String, String), f64)> {
    body.lines()
        .filter_map(|line| line.strip_prefix("batch_job_records_processed{"))
        .filter_map(|rest| rest.split_once("} "))
        .map(|(series, value)| {
            (
                (url.to_string(), series.to_string()),
                value.trim().parse::<f64>().unwrap(),
            )
        })
        .collect()
}

async fn run_both_for(scheduler: &Scheduler, pause: BatchPause, runtime: Duration) -> BothReport {
    let both = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler
                .run_both(
                    continuous_runner(Duration::from_millis(50)),
                    batch_runners(),
                    pause,
                )
                .await
        })
    };

    tokio::time::sleep(runtime).await;
    scheduler.shutdown_signal().trigger();
    both.await.unwrap().unwrap()
}

#[tokio::test]
async fn test_continuous_job_ticks_until_cancelled() {
    let transport = ScriptedTransport::accepting();
    let scheduler = scheduler(transport.clone(), Duration::from_secs(1));
    let runner = continuous_runner(Duration::from_millis(50));
    let mut states = runner.subscribe();

    let handle = scheduler.spawn_continuous(runner);
    tokio::time::sleep(Duration::from_millis(180)).await;

    let started = Instant::now();
    scheduler.shutdown_signal().trigger();
    let job = handle.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(job.state, JobState::Cancelled);
    assert!(job.ticks >= 2, "only {} tick(s)", job.ticks);
    assert_eq!(job.pushes_succeeded, job.ticks);
    assert!(job.last_push_time.is_some());
    assert_eq!(*states.borrow_and_update(), JobState::Cancelled);
    assert_eq!(transport.calls() as u64, job.ticks);
    assert!(
        transport.requests()[0]
            .url
            .ends_with("/metrics/job/demo-app-1/instance/host-1/pod/demo-0")
    );
}

#[tokio::test]
async fn test_shutdown_during_sleep_returns_promptly() {
    let scheduler = scheduler(ScriptedTransport::accepting(), Duration::from_secs(1));
    let runner = continuous_runner(Duration::from_secs(3600));
    let mut states = runner.subscribe();

    let handle = scheduler.spawn_continuous(runner);
    states
        .wait_for(|s| *s == JobState::Sleeping)
        .await
        .unwrap();

    let started = Instant::now();
    scheduler.shutdown_signal().trigger();
    let job = handle.await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(job.state, JobState::Cancelled);
    assert_eq!(job.ticks, 1);
}

#[tokio::test]
async fn test_shutdown_with_hanging_collector_is_bounded() {
    let deadline = Duration::from_millis(400);
    let scheduler = scheduler(ScriptedTransport::always(MockReply::Hang), deadline);
    let runner = continuous_runner(Duration::from_millis(50));
    let mut states = runner.subscribe();

    let handle = scheduler.spawn_continuous(runner);
    states
        .wait_for(|s| *s == JobState::Pushing)
        .await
        .unwrap();

    let started = Instant::now();
    scheduler.shutdown_signal().trigger();
    let job = handle.await.unwrap();

    assert!(
        started.elapsed() <= deadline + Duration::from_millis(300),
        "shutdown took {:?}",
        started.elapsed()
    );
    assert_eq!(job.state, JobState::Cancelled);
    assert_eq!(job.pushes_succeeded, 0);
}

#[tokio::test]
async fn test_failed_pushes_do_not_stop_the_loop() {
    let transport = ScriptedTransport::always(MockReply::Status(400));
    let scheduler = scheduler(transport.clone(), Duration::from_secs(1));
    let handle = scheduler.spawn_continuous(continuous_runner(Duration::from_millis(30)));

    tokio::time::sleep(Duration::from_millis(150)).await;
    scheduler.shutdown_signal().trigger();
    let job = handle.await.unwrap();

    assert!(job.pushes_failed >= 2);
    assert_eq!(job.pushes_succeeded, 0);
    assert!(!job.last_push_status.as_ref().unwrap().is_success());
    assert_eq!(
        scheduler.metrics().pushes("demo-app-1", "rejected"),
        job.pushes_failed
    );
}

#[tokio::test]
async fn test_run_both_keeps_jobs_separate() {
    let transport = ScriptedTransport::accepting();
    let scheduler = scheduler(transport.clone(), Duration::from_secs(1));
    let pause = BatchPause {
        min: Duration::from_millis(20),
        max: Duration::from_millis(40),
    };

    let report = run_both_for(&scheduler, pause, Duration::from_millis(250)).await;

    assert_eq!(report.continuous.state, JobState::Cancelled);
    let last_batch = report.batch.unwrap();
    assert_eq!(last_batch.state, JobState::Cancelled);
    assert_eq!(last_batch.id, format!("batch-job-{}", report.batch_runs));
    assert_eq!(last_batch.pushes_succeeded, 1);
    assert!(report.batch_runs >= 2);
    assert_eq!(report.batch_failures, 0);

    for request in transport.requests() {
        if request.url.contains("/batch-job-") {
            assert!(!request.body.contains("demo_cpu_utilization"));
            assert!(request.body.contains("batch_job_records_processed"));
        } else {
            assert!(request.url.contains("/demo-app-1/"));
            assert!(!request.body.contains("batch_job_records_processed"));
        }
    }
}

#[tokio::test]
async fn test_run_both_batch_counter_never_decreases() {
    let transport = ScriptedTransport::accepting();
    let scheduler = scheduler(transport.clone(), Duration::from_secs(1));
    let pause = BatchPause {
        min: Duration::from_millis(5),
        max: Duration::from_millis(10),
    };

    let report = run_both_for(&scheduler, pause, Duration::from_millis(200)).await;
    assert!(report.batch_runs >= 3, "only {} batch run(s)", report.batch_runs);

    let mut last_seen: HashMap<(String, String), f64> = HashMap::new();
    let mut batch_urls = HashSet::new();
    for request in transport.requests() {
        if !request.url.contains("/batch-job-") {
            continue;
        }
        batch_urls.insert(request.url.clone());
        for (series, value) in records_samples(&request.url, &request.body) {
            if let Some(previous) = last_seen.insert(series.clone(), value) {
                assert!(
                    value >= previous,
                    "{:?} went from {} to {}",
                    series,
                    previous,
                    value
                );
            }
        }
    }

    // Every run pushes to its own group with its own job_id.
    assert_eq!(batch_urls.len() as u64, report.batch_runs);
    assert_eq!(last_seen.len() as u64, report.batch_runs);
}
