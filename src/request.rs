//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method};
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;

use crate::error::{BoxError, Error};

/// A streaming request body. Nothing in the pipeline reads it; the terminal
/// handler decides whether and how to consume it.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// An incoming HTTP request.
///
/// Carries the transport request unchanged, the router's path parameters,
/// and the authenticated subject attached upstream of authorization.
pub struct Request {
    inner: http::Request<Body>,
    params: HashMap<String, String>,
    subject: Option<String>,
}

impl Request {
    /// Adopts a request from any `http`-based stack.
    ///
    /// Method, URI, headers, and extensions move across as-is and the body
    /// is boxed, not read, so streaming uploads stay streaming.
    pub fn from_http<B>(req: http::Request<B>) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self {
            inner: req.map(|body| body.map_err(Into::into).boxed_unsync()),
            params: HashMap::new(),
            subject: None,
        }
    }

    /// Hands the request back to an `http`-based stack.
    ///
    /// Path parameters and the subject are gatehouse concepts and are dropped.
    pub fn into_http(self) -> http::Request<Body> {
        self.inner
    }

    pub fn method(&self) -> &Method { self.inner.method() }
    pub fn path(&self) -> &str { self.inner.uri().path() }
    pub fn headers(&self) -> &HeaderMap { self.inner.headers() }
    pub fn body_mut(&mut self) -> &mut Body { self.inner.body_mut() }
    pub fn into_body(self) -> Body { self.inner.into_body() }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name)?.to_str().ok()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The authenticated subject, if one was attached upstream.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Attaches the authenticated subject.
    ///
    /// The subject is fixed once attached; a second call fails with
    /// [`Error::SubjectAlreadyAttached`] and leaves the first value in place.
    pub fn attach_subject(&mut self, subject: impl Into<String>) -> Result<(), Error> {
        if self.subject.is_some() {
            return Err(Error::SubjectAlreadyAttached);
        }
        self.subject = Some(subject.into());
        Ok(())
    }

    /// Reads the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes, Error> {
        let collected = self.inner.into_body().collect().await.map_err(Error::Body)?;
        Ok(collected.to_bytes())
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }
}
