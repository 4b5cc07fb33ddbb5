use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::writer::ResponseWriter;

/// Wraps a [`ResponseWriter`] and remembers the status the response went out
/// with.
///
/// Everything passes straight through: headers, status, each chunk as it is
/// written, each flush as it is called. The recorder buffers nothing. The
/// recorded status is the first one set; if the body is written or flushed
/// before any status is set, that commits `200 OK` and later statuses are
/// ignored, as they would be on the wire.
pub struct ResponseRecorder<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: Option<StatusCode>,
}

impl<'a> ResponseRecorder<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self { inner, status: None }
    }

    /// The recorded status, or `200 OK` if none has been committed yet.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    fn commit(&mut self) {
        self.status.get_or_insert(StatusCode::OK);
    }
}

#[async_trait]
impl<'a> ResponseWriter for ResponseRecorder<'a> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_head(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
        self.inner.write_head(status);
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.commit();
        self.inner.write(chunk).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.commit();
        self.inner.flush().await
    }
}
