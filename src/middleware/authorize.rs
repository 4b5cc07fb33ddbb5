//! Policy gate: asks a [`PolicyEvaluator`] before the request goes further.

use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, warn};

use super::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::policy::PolicyEvaluator;
use crate::request::Request;
use crate::response::IntoResponse;
use crate::writer::ResponseWriter;

/// Subject evaluated for requests that carry no identity.
pub const ANONYMOUS: &str = "anonymous";

/// Middleware that authorizes every request as `(subject, path, method)`.
///
/// - Permit: the next handler runs with the request and writer untouched.
/// - Deny: `403 Forbidden` with an empty body; the next handler never runs.
/// - Evaluator error: treated as deny.
///
/// A request without a subject is evaluated as [`ANONYMOUS`] (or whatever
/// [`anonymous_subject`](Self::anonymous_subject) sets), so the policy, not
/// the gate, decides what unauthenticated callers may do.
#[derive(Clone)]
pub struct Authorizer {
    evaluator: Arc<dyn PolicyEvaluator>,
    anonymous: Arc<str>,
}

impl Authorizer {
    pub fn new(evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self { evaluator, anonymous: Arc::from(ANONYMOUS) }
    }

    /// Overrides the subject used for requests without one.
    pub fn anonymous_subject(mut self, subject: &str) -> Self {
        self.anonymous = Arc::from(subject);
        self
    }
}

impl Middleware for Authorizer {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        BoxedHandler::new(Gate { policy: self.clone(), next })
    }
}

struct Gate {
    policy: Authorizer,
    next: BoxedHandler,
}

impl Gate {
    fn permits(&self, req: &Request) -> bool {
        let subject = match req.subject() {
            Some(s) if !s.is_empty() => s,
            _ => &*self.policy.anonymous,
        };
        let path = req.path();
        let method = req.method().as_str();

        match self.policy.evaluator.evaluate(subject, path, method) {
            Ok(true) => true,
            Ok(false) => {
                debug!(subject, path, method, "request denied by policy");
                false
            }
            Err(e) => {
                warn!(subject, path, method, error = %e, "policy evaluation failed, denying");
                false
            }
        }
    }
}

impl Handler for Gate {
    fn call<'a>(&'a self, req: Request, res: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        Box::pin(async move {
            if self.permits(&req) {
                self.next.call(req, res).await;
                return;
            }
            if let Err(e) = StatusCode::FORBIDDEN.into_response().write_to(res).await {
                debug!("denial not delivered: {e}");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::Method;

    use super::*;
    use crate::error::Error;
    use crate::response::Response;
    use crate::testing::{ResponseCapture, request};

    /// Answers with a fixed outcome and remembers what it was asked.
    struct Fixed {
        outcome: fn() -> Result<bool, Error>,
        asked: Mutex<Vec<(String, String, String)>>,
    }

    impl Fixed {
        fn new(outcome: fn() -> Result<bool, Error>) -> Arc<Self> {
            Arc::new(Self { outcome, asked: Mutex::default() })
        }
    }

    impl PolicyEvaluator for Fixed {
        fn evaluate(&self, subject: &str, object: &str, action: &str) -> Result<bool, Error> {
            self.asked.lock().unwrap().push((subject.into(), object.into(), action.into()));
            (self.outcome)()
        }
    }

    fn probe(calls: &Arc<AtomicUsize>) -> impl Handler {
        let calls = Arc::clone(calls);
        move |_req: Request| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Response::builder().header("x-test", "test").text("content") }
        }
    }

    async fn serve(gate: &Authorizer, calls: &Arc<AtomicUsize>, req: Request) -> ResponseCapture {
        let handler = gate.wrap(BoxedHandler::new(probe(calls)));
        let mut capture = ResponseCapture::new();
        handler.call(req, &mut capture).await;
        capture
    }

    #[tokio::test]
    async fn permit_passes_the_response_through() {
        let evaluator = Fixed::new(|| Ok(true));
        let calls = Arc::default();
        let mut req = request(Method::PUT, "/dataset1/resource1");
        req.attach_subject("alice").unwrap();

        let capture = serve(&Authorizer::new(evaluator.clone()), &calls, req).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(capture.status(), Some(StatusCode::OK));
        assert_eq!(capture.header("x-test"), Some("test"));
        assert_eq!(capture.body(), "content");
        let asked = evaluator.asked.lock().unwrap();
        assert_eq!(asked.as_slice(), [("alice".to_owned(), "/dataset1/resource1".to_owned(), "PUT".to_owned())]);
    }

    #[tokio::test]
    async fn deny_never_reaches_the_handler() {
        let calls = Arc::default();
        let capture =
            serve(&Authorizer::new(Fixed::new(|| Ok(false))), &calls, request(Method::GET, "/x")).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(capture.status(), Some(StatusCode::FORBIDDEN));
        assert!(capture.body().is_empty());
        assert_eq!(capture.header("x-test"), None);
    }

    #[tokio::test]
    async fn evaluator_error_fails_closed() {
        let calls = Arc::default();
        let gate = Authorizer::new(Fixed::new(|| Err(Error::Evaluation("store offline".into()))));
        let capture = serve(&gate, &calls, request(Method::GET, "/x")).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(capture.status(), Some(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn missing_subject_is_still_evaluated() {
        let evaluator = Fixed::new(|| Ok(false));
        let calls = Arc::default();
        serve(&Authorizer::new(evaluator.clone()), &calls, request(Method::GET, "/a")).await;

        let mut req = request(Method::GET, "/b");
        req.attach_subject("").unwrap();
        serve(&Authorizer::new(evaluator.clone()).anonymous_subject("guest"), &calls, req).await;

        let asked = evaluator.asked.lock().unwrap();
        assert_eq!(asked[0].0, ANONYMOUS);
        assert_eq!(asked[1].0, "guest");
    }
}
