//! Delivery of metric snapshots to a Pushgateway-style collector.

pub mod backoff;
pub mod exporter;
pub mod exposition;
pub mod target;

pub use backoff::{ExponentialBackoff, RetryPolicy};
pub use exporter::{Endpoint, Exporter};
pub use target::{parse_collector_url, push_url};
