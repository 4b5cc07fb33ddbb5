//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. The router is a
//! [`Handler`], so it is usually the innermost element of a middleware
//! [`Chain`](crate::middleware::Chain).

use std::collections::HashMap;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::IntoResponse;
use crate::writer::ResponseWriter;

/// The application router.
///
/// Build it once at startup. Each registration returns `self` so
/// registrations chain naturally.
///
/// Unmatched paths get `404 Not Found`; a path that exists only for other
/// methods gets `405 Method Not Allowed`.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust
    /// # use gatehouse::{Method, Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is malformed or conflicts with an earlier route for
    /// the same method. Routes are fixed at startup, so this is a programming
    /// error.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, BoxedHandler::new(handler))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self { self.on(Method::GET, path, handler) }
    pub fn post(self, path: &str, handler: impl Handler) -> Self { self.on(Method::POST, path, handler) }
    pub fn put(self, path: &str, handler: impl Handler) -> Self { self.on(Method::PUT, path, handler) }
    pub fn patch(self, path: &str, handler: impl Handler) -> Self { self.on(Method::PATCH, path, handler) }
    pub fn delete(self, path: &str, handler: impl Handler) -> Self { self.on(Method::DELETE, path, handler) }

    fn lookup(&self, method: &Method, path: &str) -> Result<(BoxedHandler, HashMap<String, String>), StatusCode> {
        let Some(matched) = self.routes.get(method).and_then(|tree| tree.at(path).ok()) else {
            let elsewhere = self.routes.values().any(|tree| tree.at(path).is_ok());
            return Err(if elsewhere { StatusCode::METHOD_NOT_ALLOWED } else { StatusCode::NOT_FOUND });
        };
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Ok((matched.value.clone(), params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl Handler for Router {
    fn call<'a>(&'a self, mut req: Request, res: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        match self.lookup(req.method(), req.path()) {
            Ok((handler, params)) => {
                req.set_params(params);
                Box::pin(async move { handler.call(req, res).await })
            }
            Err(status) => {
                debug!(method = %req.method(), path = req.path(), %status, "no route");
                Box::pin(async move {
                    if let Err(e) = status.into_response().write_to(res).await {
                        debug!("response not delivered: {e}");
                    }
                })
            }
        }
    }
}
