//! Configuration module for the metric pusher.
//!
//! Everything comes from environment variables (optionally via a `.env` file),
//! split by area: the collector endpoint and retry budget, and the jobs with
//! their static labels. Parsing goes through a key lookup so tests can supply
//! values without touching the process environment.

mod collector_config;
mod job_config;

pub use collector_config::{CollectorEnvConfig, DEFAULT_GATEWAY_URL};
pub use job_config::{JobEnvConfig, JobMode};

use crate::application::scheduler::BatchPause;
use crate::domain::job::JobSpec;
use crate::domain::metric_set::{LabelSet, labels};
use crate::infrastructure::push::parse_collector_url;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Source of raw configuration values by key
pub type Lookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

pub(crate) fn parse_or<T>(lookup: &Lookup<'_>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Failed to parse {} (got '{}')", key, raw)),
        None => Ok(default),
    }
}

pub(crate) fn parse_bool(lookup: &Lookup<'_>, key: &str, default: bool) -> Result<bool> {
    match lookup(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("Failed to parse {} (got '{}')", key, raw),
        },
        None => Ok(default),
    }
}

/// Command-line values that take precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mode: Option<String>,
    pub gateway_url: Option<String>,
    pub interval_secs: Option<u64>,
    pub seed: Option<u64>,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub collector: CollectorEnvConfig,
    pub job: JobEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    pub fn from_lookup(lookup: &Lookup<'_>) -> Result<Self> {
        let collector =
            CollectorEnvConfig::from_lookup(lookup).context("Failed to load collector config")?;
        let job = JobEnvConfig::from_lookup(lookup).context("Failed to load job config")?;
        Ok(Self { collector, job })
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<()> {
        if let Some(mode) = &overrides.mode {
            self.job.mode = mode.parse::<JobMode>()?;
        }
        if let Some(url) = &overrides.gateway_url {
            self.collector.url = parse_collector_url(url).context("Invalid --gateway-url")?;
        }
        if let Some(secs) = overrides.interval_secs {
            if secs == 0 {
                anyhow::bail!("--interval must be greater than 0");
            }
            self.job.interval = Duration::from_secs(secs);
        }
        if overrides.seed.is_some() {
            self.job.sampler_seed = overrides.seed;
        }
        Ok(())
    }

    /// `instance`, `app`, `pod` and `namespace` labels carried by every sample
    pub fn static_labels(&self) -> LabelSet {
        labels([
            ("instance", self.job.instance_name.as_str()),
            ("app", self.job.app_name.as_str()),
            ("pod", self.job.pod_name.as_str()),
            ("namespace", self.job.namespace.as_str()),
        ])
    }

    /// `<app>-<run id>`, grouped by instance and pod
    pub fn continuous_spec(&self, run_id: i64) -> JobSpec {
        JobSpec::new(format!("{}-{}", self.job.app_name, run_id), self.job.interval)
            .with_grouping_key(labels([
                ("instance", self.job.instance_name.as_str()),
                ("pod", self.job.pod_name.as_str()),
            ]))
    }

    /// `batch-job-<run id>`, no grouping key
    pub fn batch_spec(&self, run_id: i64) -> JobSpec {
        JobSpec::new(format!("batch-job-{}", run_id), self.job.interval)
    }

    pub fn batch_pause(&self) -> BatchPause {
        BatchPause {
            min: self.job.batch_pause_min,
            max: self.job.batch_pause_max,
        }
    }

    /// Upper bound on how long a clean shutdown may take
    pub fn shutdown_grace(&self) -> Duration {
        let pushes = if self.collector.delete_on_shutdown { 2 } else { 1 };
        self.collector.deadline * pushes + Duration::from_secs(1)
    }
}
