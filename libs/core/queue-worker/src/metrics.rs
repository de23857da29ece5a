//! Metrics sinks for the bridge worker
//!
//! Recording a metric never blocks and never fails from the caller's point of
//! view, so emission can sit on the dispatch path without delaying
//! reconciliation.

use metrics::{counter, histogram, Label};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Response time buckets in milliseconds
const RESPONSE_TIME_BUCKETS_MS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0,
    60_000.0,
];

/// Install the global Prometheus recorder.
///
/// Call this once at startup. Subsequent calls return the existing handle.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("response_time".to_string()),
                RESPONSE_TIME_BUCKETS_MS,
            )?
            .install_recorder()?;
        info!("Prometheus metrics initialized");
        Ok(handle)
    })
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> Option<String> {
    prometheus_handle().map(|h| h.render())
}

/// Counter and histogram sink.
///
/// Implementations must be cheap and non-blocking; errors are swallowed.
pub trait MetricsSink: Send + Sync {
    /// Increment the counter `name` by one.
    fn increment(&self, name: &str, tags: &[(&str, &str)]);

    /// Record one sample for the histogram `name`.
    fn histogram(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

/// Sink used when metrics are disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn increment(&self, _name: &str, _tags: &[(&str, &str)]) {}

    fn histogram(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}
}

/// Sink that forwards to the `metrics` facade (and so to Prometheus once
/// [`init_metrics`] has run).
#[derive(Debug, Clone)]
pub struct PrometheusSink {
    prefix: String,
}

impl PrometheusSink {
    /// Create a sink whose metric names start with `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn labels(tags: &[(&str, &str)]) -> Vec<Label> {
        tags.iter()
            .map(|(key, value)| Label::new(key.to_string(), value.to_string()))
            .collect()
    }
}

impl Default for PrometheusSink {
    fn default() -> Self {
        Self::new("sqsd_bridge")
    }
}

impl MetricsSink for PrometheusSink {
    fn increment(&self, name: &str, tags: &[(&str, &str)]) {
        counter!(format!("{}_{}_total", self.prefix, name), Self::labels(tags)).increment(1);
    }

    fn histogram(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        histogram!(format!("{}_{}", self.prefix, name), Self::labels(tags)).record(value);
    }
}

/// A single recorded metric event
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    Increment {
        name: String,
        tags: Vec<(String, String)>,
    },
    Histogram {
        name: String,
        value: f64,
        tags: Vec<(String, String)>,
    },
}

/// In-memory sink for tests
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<MetricEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, in order
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times the counter `name` was incremented
    pub fn count(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, MetricEvent::Increment { name: n, .. } if n == name))
            .count()
    }

    /// Tags of every increment of `name`
    pub fn tags_for(&self, name: &str) -> Vec<Vec<(String, String)>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MetricEvent::Increment { name: n, tags } if n == name => Some(tags),
                _ => None,
            })
            .collect()
    }

    /// Samples recorded for the histogram `name`
    pub fn samples(&self, name: &str) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MetricEvent::Histogram { name: n, value, .. } if n == name => Some(value),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: MetricEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

fn owned(tags: &[(&str, &str)]) -> Vec<(String, String)> {
    tags.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl MetricsSink for RecordingSink {
    fn increment(&self, name: &str, tags: &[(&str, &str)]) {
        self.push(MetricEvent::Increment {
            name: name.to_string(),
            tags: owned(tags),
        });
    }

    fn histogram(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.push(MetricEvent::Histogram {
            name: name.to_string(),
            value,
            tags: owned(tags),
        });
    }
}
