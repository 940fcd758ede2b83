//! Job mode, schedule and static label configuration.

use super::{Lookup, parse_or};
use anyhow::{Context, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which jobs the process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    Continuous,
    Batch,
    Both,
}

impl FromStr for JobMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continuous" => Ok(JobMode::Continuous),
            "batch" => Ok(JobMode::Batch),
            "both" => Ok(JobMode::Both),
            _ => anyhow::bail!(
                "Unknown JOB_MODE: {}. Use 'continuous', 'batch', or 'both'",
                s
            ),
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobMode::Continuous => "continuous",
            JobMode::Batch => "batch",
            JobMode::Both => "both",
        };
        f.write_str(s)
    }
}

/// Job environment configuration
#[derive(Debug, Clone)]
pub struct JobEnvConfig {
    pub mode: JobMode,
    pub interval: Duration,
    pub instance_name: String,
    pub app_name: String,
    pub metrics_prefix: String,
    pub pod_name: String,
    pub namespace: String,
    pub batch_pause_min: Duration,
    pub batch_pause_max: Duration,
    pub sampler_seed: Option<u64>,
}

impl JobEnvConfig {
    pub fn from_lookup(lookup: &Lookup<'_>) -> Result<Self> {
        let mode = match lookup("JOB_MODE") {
            Some(raw) => raw.parse::<JobMode>()?,
            None => JobMode::Continuous,
        };

        let interval_secs: u64 = parse_or(lookup, "PUSH_INTERVAL", 15)?;
        if interval_secs == 0 {
            anyhow::bail!("PUSH_INTERVAL must be greater than 0");
        }

        let batch_pause_min: u64 = parse_or(lookup, "BATCH_PAUSE_MIN_SECS", 30)?;
        let batch_pause_max: u64 = parse_or(lookup, "BATCH_PAUSE_MAX_SECS", 60)?;
        if batch_pause_min > batch_pause_max {
            anyhow::bail!(
                "BATCH_PAUSE_MIN_SECS ({}) must not exceed BATCH_PAUSE_MAX_SECS ({})",
                batch_pause_min,
                batch_pause_max
            );
        }

        let sampler_seed = lookup("SAMPLER_SEED")
            .map(|raw| raw.trim().parse::<u64>())
            .transpose()
            .context("Failed to parse SAMPLER_SEED")?;

        Ok(Self {
            mode,
            interval: Duration::from_secs(interval_secs),
            instance_name: lookup("INSTANCE_NAME").unwrap_or_else(|| default_instance_name(lookup)),
            app_name: lookup("APP_NAME").unwrap_or_else(|| "sample-batch-app".to_string()),
            metrics_prefix: lookup("METRICS_PREFIX").unwrap_or_else(|| "batch_app".to_string()),
            pod_name: lookup("POD_NAME").unwrap_or_else(|| "unknown".to_string()),
            namespace: lookup("POD_NAMESPACE").unwrap_or_else(|| "default".to_string()),
            batch_pause_min: Duration::from_secs(batch_pause_min),
            batch_pause_max: Duration::from_secs(batch_pause_max),
            sampler_seed,
        })
    }
}

fn default_instance_name(lookup: &Lookup<'_>) -> String {
    lookup("HOSTNAME")
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
