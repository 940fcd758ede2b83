pub mod errors;
pub mod job;
pub mod metric_set;
pub mod ports;

pub use errors::{MetricError, PushError, TransportError};
pub use job::{JobSpec, JobState, PushJob, PushStatus, PushSummary};
pub use metric_set::{
    LabelSet, Measurement, MetricDescriptor, MetricKind, MetricSet, Sample, Snapshot, labels,
};
pub use ports::{PushMethod, PushRequest, SampleContext, Sampler, Transport, TransportResponse};
