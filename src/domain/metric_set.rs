//! Per-job measurement storage.
//!
//! A `MetricSet` holds at most one `Measurement` per (name, label set) key.
//! All mutations and snapshots go through a single mutex, so a snapshot is
//! always a point-in-time copy and never shows half of an `apply` batch.

use crate::domain::errors::MetricError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Label name → value. Sorted by construction, so it doubles as a key.
pub type LabelSet = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    /// Type name used in `# TYPE` lines
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub labels: LabelSet,
}

/// One value produced by a sampler: a new gauge value or a counter delta.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub kind: MetricKind,
    pub labels: LabelSet,
    pub value: f64,
}

impl Sample {
    pub fn gauge(name: impl Into<String>, labels: LabelSet, value: f64) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::Gauge,
            labels,
            value,
        }
    }

    pub fn counter(name: impl Into<String>, labels: LabelSet, delta: f64) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::Counter,
            labels,
            value: delta,
        }
    }
}

/// Static description of a metric family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: String,
    pub kind: MetricKind,
    pub help: String,
}

impl MetricDescriptor {
    pub fn new(name: impl Into<String>, kind: MetricKind, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            help: help.into(),
        }
    }
}

/// Immutable copy of a `MetricSet`, ordered by (name, labels).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub measurements: Vec<Measurement>,
    pub help: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn get(&self, name: &str, labels: &LabelSet) -> Option<&Measurement> {
        self.measurements
            .iter()
            .find(|m| m.name == name && &m.labels == labels)
    }
}

type MetricKey = (String, LabelSet);

#[derive(Default)]
struct Inner {
    measurements: BTreeMap<MetricKey, Measurement>,
    kinds: BTreeMap<String, MetricKind>,
    help: BTreeMap<String, String>,
}

impl Inner {
    fn validate(&self, sample: &Sample) -> Result<(), MetricError> {
        validate_metric_name(&sample.name)?;
        for name in sample.labels.keys() {
            validate_label_name(name)?;
        }
        if let Some(existing) = self.kinds.get(&sample.name) {
            if *existing != sample.kind {
                return Err(MetricError::invalid(format!(
                    "metric '{}' is a {}, cannot use it as a {}",
                    sample.name, existing, sample.kind
                )));
            }
        }
        if sample.kind == MetricKind::Counter && (sample.value.is_nan() || sample.value < 0.0) {
            return Err(MetricError::invalid(format!(
                "counter '{}' delta must be non-negative, got {}",
                sample.name, sample.value
            )));
        }
        Ok(())
    }

    fn write(&mut self, sample: &Sample) {
        self.kinds.insert(sample.name.clone(), sample.kind);
        let key = (sample.name.clone(), sample.labels.clone());
        match sample.kind {
            MetricKind::Gauge => {
                self.measurements.insert(
                    key,
                    Measurement {
                        name: sample.name.clone(),
                        kind: MetricKind::Gauge,
                        value: sample.value,
                        labels: sample.labels.clone(),
                    },
                );
            }
            MetricKind::Counter => {
                self.measurements
                    .entry(key)
                    .and_modify(|m| m.value += sample.value)
                    .or_insert_with(|| Measurement {
                        name: sample.name.clone(),
                        kind: MetricKind::Counter,
                        value: sample.value,
                        labels: sample.labels.clone(),
                    });
            }
        }
    }
}

/// In-memory collection of labeled gauges and counters owned by one job
#[derive(Default)]
pub struct MetricSet {
    inner: Mutex<Inner>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every write validates before mutating, so a poisoned guard still
        // holds a consistent map.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the current value of a gauge.
    pub fn set_gauge(&self, name: &str, labels: &LabelSet, value: f64) -> Result<(), MetricError> {
        self.apply(&[Sample::gauge(name, labels.clone(), value)])
    }

    /// Add `delta` to a counter, initializing it at `delta` if absent.
    pub fn increment_counter(
        &self,
        name: &str,
        labels: &LabelSet,
        delta: f64,
    ) -> Result<(), MetricError> {
        self.apply(&[Sample::counter(name, labels.clone(), delta)])
    }

    /// Apply a batch of samples under one lock acquisition.
    ///
    /// Every sample is validated before anything is written: on error the set
    /// is left exactly as it was.
    pub fn apply(&self, samples: &[Sample]) -> Result<(), MetricError> {
        let mut inner = self.lock();

        // Kinds declared earlier in the same batch count as registered.
        let mut batch_kinds: BTreeMap<&str, MetricKind> = BTreeMap::new();
        for sample in samples {
            inner.validate(sample)?;
            if let Some(kind) = batch_kinds.insert(&sample.name, sample.kind) {
                if kind != sample.kind {
                    return Err(MetricError::invalid(format!(
                        "metric '{}' used as both {} and {} in one batch",
                        sample.name, kind, sample.kind
                    )));
                }
            }
        }

        for sample in samples {
            inner.write(sample);
        }
        Ok(())
    }

    /// Register HELP text for a metric family.
    pub fn describe(&self, name: &str, help: &str) {
        self.lock().help.insert(name.to_string(), help.to_string());
    }

    /// Drop every measurement. HELP text and family kinds are kept.
    pub fn clear(&self) {
        self.lock().measurements.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of every measurement.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            measurements: inner.measurements.values().cloned().collect(),
            help: inner.help.clone(),
        }
    }
}

fn validate_metric_name(name: &str) -> Result<(), MetricError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(MetricError::invalid(format!("invalid metric name '{}'", name)))
    }
}

pub(crate) fn validate_label_name(name: &str) -> Result<(), MetricError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid || name.starts_with("__") {
        return Err(MetricError::invalid(format!("invalid label name '{}'", name)));
    }
    Ok(())
}

/// Build a `LabelSet` from string pairs.
pub fn labels<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
