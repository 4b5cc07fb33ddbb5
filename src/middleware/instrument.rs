//! Per-request latency and status metrics.

use std::sync::Arc;
use std::time::Instant;

use prometheus::Registry;
use tracing::trace;

use super::Middleware;
use super::recorder::ResponseRecorder;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::metrics::{Labels, MetricsConfig, MetricsSink, PrometheusMetrics};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Middleware that reports one latency observation and one status count per
/// request, labelled by path, method, and status code.
///
/// The sample is taken when the wrapped handler finishes, however it
/// finishes: normal return, panic, or the request future being dropped (a
/// timeout, a client disconnect). In the last two cases the status is
/// whatever had been set by then, `200` if nothing had.
///
/// # Label cardinality
///
/// By default the `path` label is the raw request path, so every distinct
/// URL is its own series and the backend keeps all of them. Paths that carry
/// ids (`/users/8f14e45f…`) should be collapsed with
/// [`path_label`](Self::path_label) before this runs in production.
#[derive(Clone)]
pub struct Instrumentation {
    sink: Arc<dyn MetricsSink>,
    path_label: Option<PathLabel>,
}

type PathLabel = Arc<dyn Fn(&str) -> String + Send + Sync>;

impl Instrumentation {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink, path_label: None }
    }

    /// Maps the request path to the `path` label value.
    ///
    /// ```rust
    /// # use std::sync::Arc;
    /// # use gatehouse::middleware::Instrumentation;
    /// # use gatehouse::testing::MetricsProbe;
    /// let instrumentation = Instrumentation::new(Arc::new(MetricsProbe::new()))
    ///     .path_label(|path| match path.strip_prefix("/users/") {
    ///         Some(_) => "/users/{id}".to_owned(),
    ///         None => path.to_owned(),
    ///     });
    /// ```
    pub fn path_label(mut self, label: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.path_label = Some(Arc::new(label));
        self
    }

    /// Reports to Prometheus collectors registered in `registry`.
    ///
    /// The config is validated here; an explicitly empty bucket list is an
    /// error, not a request for the defaults.
    pub fn prometheus(config: &MetricsConfig, registry: &Registry) -> Result<Self, Error> {
        Ok(Self::new(Arc::new(PrometheusMetrics::new(config, registry)?)))
    }
}

impl Middleware for Instrumentation {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        BoxedHandler::new(Instrumented {
            sink: Arc::clone(&self.sink),
            path_label: self.path_label.clone(),
            next,
        })
    }
}

struct Instrumented {
    sink: Arc<dyn MetricsSink>,
    path_label: Option<PathLabel>,
    next: BoxedHandler,
}

impl Handler for Instrumented {
    fn call<'a>(&'a self, req: Request, res: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut sample = Sample {
                sink: &*self.sink,
                path: match &self.path_label {
                    Some(label) => label(req.path()),
                    None => req.path().to_owned(),
                },
                method: req.method().as_str().to_owned(),
                start: Instant::now(),
                recorder: ResponseRecorder::new(res),
            };
            self.next.call(req, &mut sample.recorder).await;
        })
    }
}

/// Emits on drop, so unwinding and cancellation report too.
struct Sample<'a> {
    sink: &'a dyn MetricsSink,
    path: String,
    method: String,
    start: Instant,
    recorder: ResponseRecorder<'a>,
}

impl Drop for Sample<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        let labels = Labels {
            path: std::mem::take(&mut self.path),
            method: std::mem::take(&mut self.method),
            code: self.recorder.status().as_u16().to_string(),
        };
        trace!(path = %labels.path, method = %labels.method, code = %labels.code, elapsed_ms, "request sampled");
        self.sink.observe_histogram(elapsed_ms, &labels);
        self.sink.increment_counter(&labels);
    }
}
