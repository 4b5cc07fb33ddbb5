//! # gatehouse
//!
//! Authorization and instrumentation middleware for hyper services.
//!
//! ## The pieces
//!
//! - [`Handler`]: anything that answers a [`Request`] by writing to a
//!   [`ResponseWriter`]. Plain `async fn(Request) -> impl IntoResponse`
//!   functions are handlers.
//! - [`middleware::Chain`]: composes middleware around a handler; the
//!   first one listed sees the request first.
//! - [`middleware::Authorizer`]: asks a [`policy::PolicyEvaluator`] whether
//!   `(subject, path, method)` is allowed and answers `403` otherwise. An
//!   evaluator error is a denial.
//! - [`middleware::Instrumentation`]: one latency observation and one status
//!   count per request, even when the handler panics or is cancelled.
//! - [`policy::RbacPolicy`]: an in-memory RBAC evaluator with `*` path
//!   patterns and transitive roles.
//! - [`Router`] and [`Server`]: radix-tree routing and a hyper server with
//!   graceful shutdown, for when gatehouse is the whole stack.
//! - [`HyperService`]: plugs any handler into an existing hyper stack
//!   without buffering response bodies. [`ServiceHandler`] does the
//!   reverse, so the middleware can wrap a hyper service built elsewhere.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gatehouse::middleware::{Authorizer, Chain, Identify, Instrumentation};
//! use gatehouse::metrics::MetricsConfig;
//! use gatehouse::policy::RbacPolicy;
//! use gatehouse::{HeaderName, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gatehouse::Error> {
//!     let policy = RbacPolicy::from_csv("p, alice, /reports/*, GET")?;
//!     let registry = prometheus::Registry::new();
//!
//!     let app = Chain::new()
//!         .with(Identify::header(HeaderName::from_static("x-user")))
//!         .with(Instrumentation::prometheus(&MetricsConfig::default(), &registry)?)
//!         .with(Authorizer::new(Arc::new(policy)))
//!         .then(Router::new().get("/reports/{id}", report));
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn report(req: Request) -> Response {
//!     Response::text(format!("report {}", req.param("id").unwrap_or("?")))
//! }
//! ```

mod adapter;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod writer;

pub mod metrics;
pub mod middleware;
pub mod policy;
pub mod testing;

pub use adapter::{ChannelBody, HyperService, ServiceHandler};
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, BoxedHandler, Handler};
pub use http::{HeaderMap, HeaderName, Method, StatusCode};
pub use request::{Body, Request};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use writer::ResponseWriter;
