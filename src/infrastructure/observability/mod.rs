//! Self-observability for the pusher.
//!
//! Push outcomes, wire attempts and push latency are kept in a private
//! Prometheus registry. Nothing here serves HTTP; the registry is rendered
//! into the logs on shutdown.

pub mod metrics;
pub mod push_timer;

pub use metrics::PusherMetrics;
pub use push_timer::PushTimer;
