//! Snapshot to text exposition format, via the `prometheus` text encoder.
//!
//! One `MetricFamily` per metric name. Families come out sorted by name and
//! series by label set, so the same snapshot always encodes to the same bytes.

use crate::domain::metric_set::{Measurement, MetricKind, Snapshot};
use prometheus::proto::{Counter, Gauge, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::TextEncoder;

/// `Content-Type` of an encoded push body, the text encoder's format type
pub fn content_type() -> &'static str {
    prometheus::TEXT_FORMAT
}

pub fn encode(snapshot: &Snapshot) -> prometheus::Result<String> {
    TextEncoder::new().encode_to_string(&families(snapshot))
}

/// Group a snapshot into metric families.
///
/// Snapshot order is (name, labels), so each family is a contiguous run.
pub fn families(snapshot: &Snapshot) -> Vec<MetricFamily> {
    let mut out: Vec<MetricFamily> = Vec::new();

    for m in &snapshot.measurements {
        let starts_family = out.last().is_none_or(|family| family.get_name() != m.name);
        if starts_family {
            let mut family = MetricFamily::new();
            family.set_name(m.name.clone());
            // Families without registered HELP fall back to their name.
            let help = snapshot.help.get(&m.name).unwrap_or(&m.name);
            family.set_help(help.clone());
            family.set_field_type(metric_type(m.kind));
            out.push(family);
        }
        if let Some(family) = out.last_mut() {
            family.mut_metric().push(to_metric(m));
        }
    }
    out
}

fn metric_type(kind: MetricKind) -> MetricType {
    match kind {
        MetricKind::Gauge => MetricType::GAUGE,
        MetricKind::Counter => MetricType::COUNTER,
    }
}

fn to_metric(m: &Measurement) -> Metric {
    let pairs = m
        .labels
        .iter()
        .map(|(name, value)| {
            let mut pair = LabelPair::new();
            pair.set_name(name.clone());
            pair.set_value(value.clone());
            pair
        })
        .collect();

    let mut metric = Metric::from_label(pairs);
    match m.kind {
        MetricKind::Gauge => {
            let mut gauge = Gauge::new();
            gauge.set_value(m.value);
            metric.set_gauge(gauge);
        }
        MetricKind::Counter => {
            let mut counter = Counter::new();
            counter.set_value(m.value);
            metric.set_counter(counter);
        }
    }
    metric
}
