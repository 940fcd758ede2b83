//! Collector endpoint and retry configuration parsed from environment variables.

use super::{Lookup, parse_bool, parse_or};
use crate::domain::ports::PushMethod;
use crate::infrastructure::push::{Endpoint, RetryPolicy, parse_collector_url};
use anyhow::{Context, Result};
use std::time::Duration;
use url::Url;

pub const DEFAULT_GATEWAY_URL: &str = "prometheus-pushgateway:9091";

/// Collector environment configuration
#[derive(Debug, Clone)]
pub struct CollectorEnvConfig {
    pub url: Url,
    pub timeout: Duration,
    pub max_retries: u32,
    pub deadline: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub method: PushMethod,
    pub delete_on_shutdown: bool,
}

impl CollectorEnvConfig {
    pub fn from_lookup(lookup: &Lookup<'_>) -> Result<Self> {
        let raw_url = lookup("PUSH_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());
        let url = parse_collector_url(&raw_url).context("Failed to parse PUSH_GATEWAY_URL")?;

        let timeout_secs: u64 = parse_or(lookup, "PUSH_TIMEOUT_SECS", 5)?;
        let deadline_secs: u64 = parse_or(lookup, "PUSH_DEADLINE_SECS", 30)?;
        if timeout_secs == 0 {
            anyhow::bail!("PUSH_TIMEOUT_SECS must be greater than 0");
        }
        if deadline_secs == 0 {
            anyhow::bail!("PUSH_DEADLINE_SECS must be greater than 0");
        }

        let method = match lookup("PUSH_METHOD") {
            Some(raw) => raw.parse::<PushMethod>()?,
            None => PushMethod::Put,
        };

        Ok(Self {
            url,
            timeout: Duration::from_secs(timeout_secs),
            max_retries: parse_or(lookup, "PUSH_MAX_RETRIES", 3)?,
            deadline: Duration::from_secs(deadline_secs),
            backoff_base: Duration::from_millis(parse_or(lookup, "PUSH_BACKOFF_BASE_MS", 1000)?),
            backoff_max: Duration::from_millis(parse_or(lookup, "PUSH_BACKOFF_MAX_MS", 30_000)?),
            method,
            delete_on_shutdown: parse_bool(lookup, "DELETE_ON_SHUTDOWN", false)?,
        })
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            url: self.url.clone(),
            timeout: self.timeout,
            max_retries: self.max_retries,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: self.backoff_base,
            max_delay: self.backoff_max,
            deadline: self.deadline,
            ..RetryPolicy::default()
        }
    }
}
