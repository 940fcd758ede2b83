//! Metric Pusher - periodic Pushgateway client
//!
//! Simulates a workload and pushes its metrics to a Prometheus Pushgateway,
//! either on a fixed interval (`continuous`), once (`batch`), or both.
//!
//! # Usage
//! ```sh
//! PUSH_GATEWAY_URL=localhost:9091 JOB_MODE=batch cargo run
//! ```
//!
//! # Exit codes
//! - `0` clean exit
//! - `1` batch push failed
//! - `2` invalid configuration
//! - `130` shutdown forced by a second signal or an elapsed grace period

use clap::Parser;
use metric_pusher::application::system::{Application, ShutdownOutcome};
use metric_pusher::config::{Config, JobMode, Overrides};
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(version, about = "Push simulated workload metrics to a Prometheus Pushgateway")]
struct Cli {
    /// continuous, batch or both (overrides JOB_MODE)
    #[arg(long)]
    mode: Option<String>,

    /// Collector address (overrides PUSH_GATEWAY_URL)
    #[arg(long)]
    gateway_url: Option<String>,

    /// Seconds between continuous pushes (overrides PUSH_INTERVAL)
    #[arg(long)]
    interval: Option<u64>,

    /// Seed for the workload simulation (overrides SAMPLER_SEED)
    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            mode: self.mode.clone(),
            gateway_url: self.gateway_url.clone(),
            interval_secs: self.interval,
            seed: self.seed,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return ExitCode::from(2);
        }
    };

    info!("Metric Pusher {} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: mode={}, collector={}, instance={}, app={}",
        config.job.mode, config.collector.url, config.job.instance_name, config.job.app_name
    );

    let grace = config.shutdown_grace();
    let app = match Application::build(config) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to build application: {:#}", e);
            return ExitCode::from(2);
        }
    };
    let metrics = app.metrics().clone();

    let code = if app.config.job.mode == JobMode::Batch {
        run_batch(&app).await
    } else {
        run_until_signal(app, grace).await
    };

    debug!("Pusher self-metrics:\n{}", metrics.render());
    code
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::from_env()?;
    config.apply_overrides(&cli.overrides())?;
    Ok(config)
}

async fn run_batch(app: &Application) -> ExitCode {
    let result = app.run_batch().await;
    let code = match &result {
        Ok(summary) => {
            info!(
                "Batch job {} pushed {} series in {:?}",
                summary.job, summary.series, summary.elapsed
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Batch job failed: {}", e);
            ExitCode::from(1)
        }
    };

    let line = match result {
        Ok(summary) => serde_json::to_string(&summary),
        Err(e) => serde_json::to_string(&serde_json::json!({
            "job": format!("batch-job-{}", app.run_id()),
            "status": "failed",
            "kind": e.kind(),
            "attempts": e.attempts(),
            "error": e.to_string(),
        })),
    };
    match line {
        Ok(json) => println!("PUSH_SUMMARY:{}", json),
        Err(e) => error!("Failed to serialize push summary: {}", e),
    }
    code
}

async fn run_until_signal(app: Application, grace: std::time::Duration) -> ExitCode {
    let handle = app.start();
    info!("Pusher running. Press Ctrl+C to shutdown.");

    if let Err(e) = wait_for_signal().await {
        error!("Failed to listen for shutdown signals: {}", e);
    }
    info!("Shutdown signal received, stopping jobs...");

    let force = async {
        if let Err(e) = wait_for_signal().await {
            error!("Failed to listen for a second signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match handle.shutdown(grace, force).await {
        Ok(ShutdownOutcome::Clean(report)) => {
            if let Some(job) = &report.continuous {
                info!(
                    "Continuous job {} stopped after {} tick(s) ({} ok, {} failed)",
                    job.id, job.ticks, job.pushes_succeeded, job.pushes_failed
                );
            }
            if report.batch.is_some() {
                info!("Batch job stopped after {} run(s)", report.batch_runs);
            }
            ExitCode::SUCCESS
        }
        Ok(ShutdownOutcome::Forced) => ExitCode::from(130),
        Err(e) => {
            error!("Jobs ended with an error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
