//! The outbound side of a request: a streaming response sink.
//!
//! Handlers do not return a finished response to the transport. They write
//! into a [`ResponseWriter`], which lets middleware sit between the handler
//! and the wire: it can observe the status, add headers, or refuse to call
//! the handler at all, and the handler's flushes still reach the client.
//!
//! The commit rules follow HTTP:
//!
//! - `write_head` sets the status. Only the first call counts.
//! - The head goes out on the first body write or flush. Header changes
//!   after that have no effect.
//! - A write or flush without a prior `write_head` commits `200 OK`.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// A response sink. One per request, never shared.
#[async_trait]
pub trait ResponseWriter: Send {
    /// Headers that will be sent with the response head.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sets the response status. Ignored after the first call.
    fn write_head(&mut self, status: StatusCode);

    /// Sends one body chunk, committing the head first if needed.
    ///
    /// Fails with [`io::ErrorKind::BrokenPipe`] once the client is gone.
    async fn write(&mut self, chunk: Bytes) -> io::Result<()>;

    /// Pushes the head and everything written so far to the transport.
    async fn flush(&mut self) -> io::Result<()>;
}
