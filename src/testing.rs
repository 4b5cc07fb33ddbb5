//! In-memory stand-ins for the transport and the metrics backend.
//!
//! Useful for testing handlers and middleware without a socket:
//!
//! ```rust
//! use gatehouse::testing::{ResponseCapture, request};
//! use gatehouse::{Handler, Method, Response, StatusCode};
//!
//! # tokio_test_block_on(async {
//! async fn hello(_req: gatehouse::Request) -> Response { Response::text("hi") }
//!
//! let mut capture = ResponseCapture::new();
//! Handler::call(&hello, request(Method::GET, "/"), &mut capture).await;
//! assert_eq!(capture.status(), Some(StatusCode::OK));
//! assert_eq!(capture.body(), "hi");
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Method, StatusCode};
use http_body_util::Empty;

use crate::metrics::{Labels, MetricsSink};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Builds a bodiless request for `method` and `path`.
///
/// # Panics
///
/// Panics if `path` is not a valid request target.
pub fn request(method: Method, path: &str) -> Request {
    let req = http::Request::builder()
        .method(method)
        .uri(path)
        .body(Empty::<Bytes>::new())
        .unwrap_or_else(|e| panic!("invalid test request `{path}`: {e}"));
    Request::from_http(req)
}

/// A [`ResponseWriter`] that keeps everything it is given.
///
/// Mirrors the transport's commit rules: the first `write_head` wins and the
/// first write or flush freezes the status, defaulting to `200 OK`. Every
/// write is kept as a separate chunk and every flush is counted, so tests can
/// check that nothing was merged or swallowed on the way.
#[derive(Debug, Default)]
pub struct ResponseCapture {
    headers: HeaderMap,
    status: Option<StatusCode>,
    committed: bool,
    chunks: Vec<Bytes>,
    flushes: usize,
}

impl ResponseCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status, or the pending one if nothing has been written.
    pub fn status(&self) -> Option<StatusCode> { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn chunks(&self) -> &[Bytes] { &self.chunks }
    pub fn flushes(&self) -> usize { self.flushes }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// All body chunks joined.
    pub fn body(&self) -> Bytes {
        let mut body = BytesMut::new();
        for chunk in &self.chunks {
            body.extend_from_slice(chunk);
        }
        body.freeze()
    }

    fn commit(&mut self) {
        self.committed = true;
        self.status.get_or_insert(StatusCode::OK);
    }
}

#[async_trait]
impl ResponseWriter for ResponseCapture {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) {
        if !self.committed && self.status.is_none() {
            self.status = Some(status);
        }
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.commit();
        self.chunks.push(chunk);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.commit();
        self.flushes += 1;
        Ok(())
    }
}

/// One sample reported to a [`MetricsProbe`].
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub value: f64,
    pub labels: Labels,
}

/// A [`MetricsSink`] that remembers every call.
#[derive(Debug, Default)]
pub struct MetricsProbe {
    observations: Mutex<Vec<Observation>>,
    increments: Mutex<Vec<Labels>>,
}

impl MetricsProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<Observation> {
        lock(&self.observations).clone()
    }

    pub fn increments(&self) -> Vec<Labels> {
        lock(&self.increments).clone()
    }
}

impl MetricsSink for MetricsProbe {
    fn observe_histogram(&self, value: f64, labels: &Labels) {
        lock(&self.observations).push(Observation { value, labels: labels.clone() });
    }

    fn increment_counter(&self, labels: &Labels) {
        lock(&self.increments).push(labels.clone());
    }
}

// A probe is read after a panicking handler; poisoning must not hide samples.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
