//! Prometheus backend for [`MetricsSink`].

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use tracing::debug;

use super::{LABEL_NAMES, Labels, MetricsConfig, MetricsSink};
use crate::error::Error;

/// Request latency histogram and status counter, registered in a
/// caller-owned [`Registry`].
#[derive(Clone)]
pub struct PrometheusMetrics {
    duration: HistogramVec,
    codes: IntCounterVec,
}

impl PrometheusMetrics {
    /// Validates `config`, creates both collectors, and registers them.
    ///
    /// Fails on an invalid config, an invalid metric name, or a name that is
    /// already registered in `registry`.
    pub fn new(config: &MetricsConfig, registry: &Registry) -> Result<Self, Error> {
        config.validate()?;

        let duration = HistogramVec::new(
            HistogramOpts::new("duration_ms", "http server requests duration(ms).")
                .namespace(config.namespace.as_str())
                .subsystem(config.subsystem.as_str())
                .buckets(config.buckets.clone()),
            &LABEL_NAMES,
        )?;
        let codes = IntCounterVec::new(
            Opts::new("code_total", "http server requests code count.")
                .namespace(config.namespace.as_str())
                .subsystem(config.subsystem.as_str()),
            &LABEL_NAMES,
        )?;

        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(codes.clone()))?;
        Ok(Self { duration, codes })
    }
}

impl MetricsSink for PrometheusMetrics {
    fn observe_histogram(&self, value: f64, labels: &Labels) {
        match self.duration.get_metric_with_label_values(&labels.values()) {
            Ok(histogram) => histogram.observe(value),
            Err(e) => debug!("dropping latency sample: {e}"),
        }
    }

    fn increment_counter(&self, labels: &Labels) {
        match self.codes.get_metric_with_label_values(&labels.values()) {
            Ok(counter) => counter.inc(),
            Err(e) => debug!("dropping status sample: {e}"),
        }
    }
}
