use http::HeaderName;
use tracing::debug;

use super::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Attaches the request subject from a header set by a trusted upstream
/// (an authenticating proxy, an API gateway).
///
/// Requests without the header, or with an empty or non-ASCII value, pass on
/// without a subject. A subject attached earlier in the chain is kept.
///
/// Only use this behind something that strips the header from client input.
#[derive(Clone)]
pub struct Identify {
    header: HeaderName,
}

impl Identify {
    pub fn header(name: HeaderName) -> Self {
        Self { header: name }
    }
}

impl Middleware for Identify {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        BoxedHandler::new(Identified { header: self.header.clone(), next })
    }
}

struct Identified {
    header: HeaderName,
    next: BoxedHandler,
}

impl Handler for Identified {
    fn call<'a>(&'a self, mut req: Request, res: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        let subject = req
            .headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        if let Some(subject) = subject
            && req.attach_subject(subject).is_err()
        {
            debug!(header = %self.header, "subject already attached, header ignored");
        }
        self.next.call(req, res)
    }
}
