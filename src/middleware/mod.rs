//! Middleware layer.
//!
//! Middleware wraps a handler in another handler. It is the place for
//! cross-cutting concerns: identifying the caller, authorizing the request,
//! timing it.
//!
//! A [`Chain`] lists middleware outermost first:
//!
//! ```rust
//! use std::sync::Arc;
//! use gatehouse::middleware::{Authorizer, Chain, Identify, Instrumentation};
//! use gatehouse::policy::RbacPolicy;
//! use gatehouse::testing::MetricsProbe;
//! use gatehouse::{HeaderName, Response, Router};
//!
//! async fn item(_req: gatehouse::Request) -> Response { Response::text("item") }
//!
//! let policy = Arc::new(RbacPolicy::from_csv("p, alice, /items/*, GET").unwrap());
//! let app = Chain::new()
//!     .with(Identify::header(HeaderName::from_static("x-user")))
//!     .with(Instrumentation::new(Arc::new(MetricsProbe::new())))
//!     .with(Authorizer::new(policy))
//!     .then(Router::new().get("/items/{id}", item));
//! ```
//!
//! A request runs `Identify`, then `Instrumentation`, then `Authorizer`, then
//! the router, and unwinds in reverse. With `Instrumentation` outside
//! `Authorizer`, denied requests are measured too.

mod authorize;
mod identity;
mod instrument;
mod recorder;

pub use authorize::{ANONYMOUS, Authorizer};
pub use identity::Identify;
pub use instrument::Instrumentation;
pub use recorder::ResponseRecorder;

use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler};

/// Turns a handler into a handler that does something around it.
///
/// Any `Fn(BoxedHandler) -> BoxedHandler` closure is a middleware.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        (self)(next)
    }
}

/// An ordered list of middleware, outermost first.
///
/// `Chain::new().with(a).with(b).with(c).then(h)` behaves exactly like
/// `a.wrap(b.wrap(c.wrap(h)))`. Chains are cheap to clone and can be
/// concatenated with [`append`](Chain::append); splitting a list into
/// chains and appending them back does not change the result.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `middleware` inside everything already in the chain.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Adds every layer of `other`, in order, inside this chain.
    pub fn append(mut self, other: Chain) -> Self {
        self.layers.extend(other.layers);
        self
    }

    pub fn len(&self) -> usize { self.layers.len() }
    pub fn is_empty(&self) -> bool { self.layers.is_empty() }

    /// Wraps `handler` in every layer. The first layer added ends up
    /// outermost.
    pub fn then(&self, handler: impl Handler) -> BoxedHandler {
        self.layers
            .iter()
            .rev()
            .fold(BoxedHandler::new(handler), |next, layer| layer.wrap(next))
    }
}
