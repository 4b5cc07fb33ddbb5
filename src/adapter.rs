//! Bridge between hyper and the [`Handler`] / [`ResponseWriter`] world.
//!
//! hyper wants a future that resolves to a complete `http::Response` whose
//! body it polls afterwards. Handlers want a writer they can push status,
//! headers, and chunks into as they go. The bridge runs each handler in its
//! own task with a [`ChannelWriter`]:
//!
//! ```text
//! hyper ── http::Request ──▶ HyperService::call
//!                                 │ spawn
//!                                 ▼
//!                        handler.call(req, &mut ChannelWriter)
//!                                 │ first write / flush / return
//!            ◀── oneshot(head) ───┤
//!            ◀── mpsc(chunk) ─────┘ one frame per write
//! ```
//!
//! Nothing is buffered beyond a small channel: a flush in the handler puts
//! the head on the wire, and each chunk becomes its own body frame.
//!
//! [`ServiceHandler`] goes the other way: an existing hyper service becomes
//! a [`Handler`], so gatehouse middleware can wrap an app built elsewhere.
//! Its response frames are written and flushed one by one as they arrive.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use hyper::body::{Body, Frame};
use hyper::service::Service;
use http_body_util::BodyExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::BoxError;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::{self, Request};
use crate::writer::ResponseWriter;

/// Chunks in flight between a handler and hyper before `write` waits.
const BODY_CHANNEL_DEPTH: usize = 8;

/// Streaming response body fed by a [`ChannelWriter`].
///
/// Ends when the writer is dropped, i.e. when the handler returns.
pub struct ChannelBody {
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelBody {
    fn empty() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self { rx }
    }
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        self.get_mut().rx.poll_recv(cx).map(|chunk| chunk.map(|data| Ok(Frame::data(data))))
    }
}

/// [`ResponseWriter`] whose head goes out through a oneshot and whose body
/// goes out through a channel.
struct ChannelWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    head: Option<(oneshot::Sender<http::Response<ChannelBody>>, mpsc::Receiver<Bytes>)>,
    tx: mpsc::Sender<Bytes>,
}

impl ChannelWriter {
    fn new(head: oneshot::Sender<http::Response<ChannelBody>>) -> Self {
        let (tx, rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
        Self { status: None, headers: HeaderMap::new(), head: Some((head, rx)), tx }
    }

    /// Sends the head if it has not gone out yet. Later header changes are
    /// invisible to the client.
    fn commit(&mut self) {
        let Some((head, rx)) = self.head.take() else {
            return;
        };
        let mut response = http::Response::new(ChannelBody { rx });
        *response.status_mut() = *self.status.get_or_insert(StatusCode::OK);
        *response.headers_mut() = std::mem::take(&mut self.headers);
        // The receiver is gone only if hyper dropped the request; writes will
        // report that.
        let _ = head.send(response);
    }
}

#[async_trait]
impl ResponseWriter for ChannelWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        } else {
            debug!(%status, "superfluous write_head ignored");
        }
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.commit();
        self.tx
            .send(chunk)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.commit();
        if self.tx.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
        }
        Ok(())
    }
}

/// Serves a [`BoxedHandler`] as a hyper [`Service`].
///
/// Accepts any request body hyper or another `http` stack produces. A
/// handler that panics before sending anything yields `500`.
#[derive(Clone)]
pub struct HyperService {
    handler: BoxedHandler,
}

impl HyperService {
    pub fn new(handler: impl Handler) -> Self {
        Self { handler: BoxedHandler::new(handler) }
    }
}

impl<B> Service<http::Request<B>> for HyperService
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<ChannelBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Infallible>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let handler = self.handler.clone();
        let req = Request::from_http(req);
        let (head_tx, head_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut writer = ChannelWriter::new(head_tx);
            handler.call(req, &mut writer).await;
            writer.commit();
        });

        Box::pin(async move {
            Ok(head_rx.await.unwrap_or_else(|_| {
                error!("handler ended without a response");
                let mut response = http::Response::new(ChannelBody::empty());
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            }))
        })
    }
}

/// Runs a hyper [`Service`] as a [`Handler`].
///
/// The request goes across with [`Request::into_http`]; the service's
/// status and headers are copied to the writer, then every data frame is
/// written and flushed as soon as the service yields it. Trailers are
/// dropped. A service error becomes `502 Bad Gateway`; a body error after
/// the head is out just ends the response.
///
/// ```rust
/// use std::convert::Infallible;
///
/// use bytes::Bytes;
/// use gatehouse::ServiceHandler;
/// use gatehouse::middleware::{Chain, Instrumentation};
/// use gatehouse::testing::MetricsProbe;
/// use http_body_util::Full;
///
/// let legacy = hyper::service::service_fn(|_req: http::Request<gatehouse::Body>| async {
///     Ok::<_, Infallible>(http::Response::new(Full::new(Bytes::from_static(b"legacy"))))
/// });
/// let app = Chain::new()
///     .with(Instrumentation::new(std::sync::Arc::new(MetricsProbe::new())))
///     .then(ServiceHandler::new(legacy));
/// ```
pub struct ServiceHandler<S> {
    service: S,
}

impl<S> ServiceHandler<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

impl<S, B, F, E> Handler for ServiceHandler<S>
where
    S: Service<http::Request<request::Body>, Response = http::Response<B>, Error = E, Future = F>
        + Send
        + Sync
        + 'static,
    F: Future<Output = Result<http::Response<B>, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError> + Send,
{
    fn call<'a>(&'a self, req: Request, res: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        let pending = self.service.call(req.into_http());
        Box::pin(async move {
            let response = match pending.await {
                Ok(response) => response,
                Err(e) => {
                    let e: BoxError = e.into();
                    warn!(error = %e, "wrapped service failed");
                    res.write_head(StatusCode::BAD_GATEWAY);
                    let _ = res.flush().await;
                    return;
                }
            };

            let (parts, body) = response.into_parts();
            res.headers_mut().extend(parts.headers);
            res.write_head(parts.status);

            if let Err(e) = relay(body, res).await {
                debug!("response not delivered: {e}");
            }
        })
    }
}

/// Writes and flushes each data frame of `body` as it arrives.
async fn relay<B>(body: B, res: &mut dyn ResponseWriter) -> io::Result<()>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<BoxError>,
{
    let mut body = std::pin::pin!(body);
    let mut sent = false;
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(io::Error::other)?;
        if let Ok(chunk) = frame.into_data() {
            res.write(chunk).await?;
            res.flush().await?;
            sent = true;
        }
    }
    if !sent {
        res.flush().await?;
    }
    Ok(())
}
