//! Outgoing HTTP response value and the [`IntoResponse`] conversion trait.
//!
//! Plain handlers build a [`Response`] and return it; the framework writes it
//! into the request's [`ResponseWriter`]. Handlers that need to stream
//! implement [`Handler`](crate::Handler) and use the writer directly.

use std::io;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, StatusCode};
use tracing::warn;

use crate::writer::ResponseWriter;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Prometheus,   // text/plain; version=0.0.4  (metrics exposition)
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Prometheus  => "text/plain; version=0.0.4",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// A complete HTTP response value.
///
/// ```rust
/// use gatehouse::{Response, StatusCode};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
pub struct Response {
    body: Bytes,
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::with_type(ContentType::Json, body.into())
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_type(ContentType::Text, Bytes::from(body.into()))
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: Vec::new(), status: code }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn body(&self) -> &Bytes { &self.body }

    fn with_type(content_type: ContentType, body: Bytes) -> Self {
        Self {
            body,
            headers: vec![(CONTENT_TYPE.as_str().to_owned(), content_type.as_str().to_owned())],
            status: StatusCode::OK,
        }
    }

    /// Writes the whole response into `res`: head, `content-length`, body,
    /// then a flush.
    ///
    /// Headers whose name or value is not valid on the wire are skipped with
    /// a warning rather than failing the response.
    pub async fn write_to(self, res: &mut dyn ResponseWriter) -> io::Result<()> {
        let headers = res.headers_mut();
        for (name, value) in &self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        res.write_head(self.status);
        if !self.body.is_empty() {
            res.write(self.body).await?;
        }
        res.flush().await
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(ContentType::Json, body.into())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text, Bytes::from(body.into()))
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type, body.into())
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }

    fn finish(self, content_type: ContentType, body: Bytes) -> Response {
        let mut headers = vec![(CONTENT_TYPE.as_str().to_owned(), content_type.as_str().to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}
