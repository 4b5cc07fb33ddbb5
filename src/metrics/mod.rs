//! Request metrics: the sink contract, its labels, and its configuration.
//!
//! The middleware only knows [`MetricsSink`]. [`PrometheusMetrics`] is the
//! bundled backend; anything else (StatsD, OpenTelemetry, a test probe) plugs
//! in by implementing the trait.

mod prom;

pub use prom::PrometheusMetrics;

use crate::error::Error;

/// Default latency buckets, in milliseconds.
pub const DEFAULT_BUCKETS_MS: &[f64] = &[5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 750.0, 1000.0];

/// Label names, in the order backends declare them.
pub const LABEL_NAMES: [&str; 3] = ["path", "method", "code"];

/// Receives one histogram observation and one counter increment per request.
///
/// Shared by every in-flight request, so implementations synchronise
/// internally. Recording cannot fail from the caller's point of view: a
/// backend that cannot record drops the sample.
pub trait MetricsSink: Send + Sync {
    fn observe_histogram(&self, value: f64, labels: &Labels);
    fn increment_counter(&self, labels: &Labels);
}

/// The label set attached to every request sample.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Labels {
    pub path: String,
    pub method: String,
    pub code: String,
}

impl Labels {
    /// `(name, value)` pairs in [`LABEL_NAMES`] order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        LABEL_NAMES
            .into_iter()
            .zip([self.path.as_str(), self.method.as_str(), self.code.as_str()])
    }

    pub(crate) fn values(&self) -> [&str; 3] {
        [&self.path, &self.method, &self.code]
    }
}

/// Metric naming and bucket layout.
///
/// Metric names are `{namespace}_{subsystem}_duration_ms` and
/// `{namespace}_{subsystem}_code_total`.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsConfig {
    pub namespace: String,
    pub subsystem: String,
    pub buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "http_server".to_owned(),
            subsystem: "requests".to_owned(),
            buckets: DEFAULT_BUCKETS_MS.to_vec(),
        }
    }
}

impl MetricsConfig {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = subsystem.into();
        self
    }

    /// Replaces the bucket list. An empty list is rejected by
    /// [`validate`](Self::validate), not replaced with the defaults.
    pub fn buckets(mut self, buckets: impl Into<Vec<f64>>) -> Self {
        self.buckets = buckets.into();
        self
    }

    /// Buckets must be non-empty, finite, positive, and strictly ascending.
    pub fn validate(&self) -> Result<(), Error> {
        if self.buckets.is_empty() {
            return Err(Error::Config("bucket list is empty".to_owned()));
        }
        if let Some(bad) = self.buckets.iter().find(|b| !b.is_finite() || **b <= 0.0) {
            return Err(Error::Config(format!("bucket {bad} is not a positive number")));
        }
        if let Some(pair) = self.buckets.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::Config(format!(
                "buckets must be strictly ascending, got {} before {}",
                pair[0], pair[1]
            )));
        }
        Ok(())
    }
}
