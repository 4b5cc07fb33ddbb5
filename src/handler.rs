//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! Routers and middleware hold handlers of *different* types behind one
//! interface, so every handler ends up as a trait object. The chain from user
//! code to vtable call is:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! BoxedHandler::new(hello)                         ← Handler blanket impl
//!        ↓  Arc<dyn Handler>
//! handler.call(req, &mut writer) at request time   ← one vtable dispatch
//!        ↓
//! Box::pin(async { hello(req).await.into_response().write_to(writer) })
//! ```
//!
//! Middleware implements [`Handler`] directly: it receives the request and
//! the writer, and decides whether and how to call the next handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::request::Request;
use crate::response::IntoResponse;
use crate::writer::ResponseWriter;

/// A heap-allocated, type-erased future borrowing the handler and the writer
/// for `'a`.
///
/// `Send` lets tokio move the request task across worker threads.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Anything that can serve a request into a [`ResponseWriter`].
///
/// Satisfied automatically by every `async fn` with the signature
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// Implement it by hand for middleware or for handlers that stream.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, req: Request, res: &'a mut dyn ResponseWriter) -> BoxFuture<'a>;
}

/// Implement `Handler` for any function with the right signature.
///
/// The returned value is written in one piece: status, headers,
/// `content-length`, body, flush. A write error means the client went away,
/// which is not the handler's problem, so it is only logged.
impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call<'a>(&'a self, req: Request, res: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        let fut = (self)(req);
        Box::pin(async move {
            if let Err(e) = fut.await.into_response().write_to(res).await {
                debug!("response not delivered: {e}");
            }
        })
    }
}

/// A shared, type-erased handler.
///
/// Cloning is one atomic increment. `BoxedHandler` is itself a [`Handler`],
/// which is what lets middleware wrap the output of other middleware.
#[derive(Clone)]
pub struct BoxedHandler(Arc<dyn Handler>);

impl BoxedHandler {
    pub fn new(handler: impl Handler) -> Self {
        Self(Arc::new(handler))
    }
}

impl Handler for BoxedHandler {
    fn call<'a>(&'a self, req: Request, res: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        self.0.call(req, res)
    }
}
