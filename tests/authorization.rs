//! The path, role, and identity scenarios from the bundled policy fixture,
//! run through the full gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use gatehouse::middleware::{Authorizer, Chain, Identify};
use gatehouse::policy::RbacPolicy;
use gatehouse::testing::{ResponseCapture, request};
use gatehouse::{BoxedHandler, Handler, HeaderName, Method, Request, StatusCode};

const POLICY: &str = include_str!("fixtures/authz_policy.csv");

const METHODS: [Method; 5] = [Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

struct App {
    handler: BoxedHandler,
    policy: Arc<RbacPolicy>,
    reached: Arc<AtomicUsize>,
}

impl App {
    fn new() -> Self {
        let policy = Arc::new(RbacPolicy::from_csv(POLICY).unwrap());
        let reached = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reached);
        let handler = Chain::new()
            .with(Identify::header(HeaderName::from_static("x-user")))
            .with(Authorizer::new(policy.clone()))
            .then(move |_req: Request| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { StatusCode::OK }
            });
        Self { handler, policy, reached }
    }

    async fn status(&self, user: Option<&str>, method: Method, path: &str) -> StatusCode {
        let mut req = http::Request::builder().method(method).uri(path);
        if let Some(user) = user {
            req = req.header("x-user", user);
        }
        let req = Request::from_http(req.body(http_body_util::Empty::<bytes::Bytes>::new()).unwrap());

        let mut capture = ResponseCapture::new();
        self.handler.call(req, &mut capture).await;
        capture.status().unwrap()
    }

    fn reached(&self) -> usize {
        self.reached.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn alice_reads_dataset1_and_writes_only_resource1() {
    let app = App::new();
    assert_eq!(app.status(Some("alice"), Method::GET, "/dataset1/resource1").await, StatusCode::OK);
    assert_eq!(app.status(Some("alice"), Method::POST, "/dataset1/resource1").await, StatusCode::OK);
    assert_eq!(app.status(Some("alice"), Method::GET, "/dataset1/resource2").await, StatusCode::OK);
    assert_eq!(app.status(Some("alice"), Method::POST, "/dataset1/resource2").await, StatusCode::FORBIDDEN);
    assert_eq!(app.reached(), 3);
}

#[tokio::test]
async fn bob_posts_under_folder1_only() {
    let app = App::new();
    let path = "/dataset2/folder1/item1";
    assert_eq!(app.status(Some("bob"), Method::GET, path).await, StatusCode::FORBIDDEN);
    assert_eq!(app.status(Some("bob"), Method::POST, path).await, StatusCode::OK);
    assert_eq!(app.status(Some("bob"), Method::DELETE, path).await, StatusCode::FORBIDDEN);
    assert_eq!(app.reached(), 1);
}

#[tokio::test]
async fn bob_has_every_action_on_resource1_but_only_reads_resource2() {
    let app = App::new();
    for method in [Method::GET, Method::POST, Method::DELETE] {
        assert_eq!(app.status(Some("bob"), method.clone(), "/dataset2/resource1").await, StatusCode::OK, "{method}");
    }
    assert_eq!(app.status(Some("bob"), Method::GET, "/dataset2/resource2").await, StatusCode::OK);
    assert_eq!(app.status(Some("bob"), Method::POST, "/dataset2/resource2").await, StatusCode::FORBIDDEN);
    assert_eq!(app.status(Some("bob"), Method::DELETE, "/dataset2/resource2").await, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn folder_rule_covers_every_item() {
    let app = App::new();
    for item in ["/dataset2/folder1/item1", "/dataset2/folder1/item2"] {
        assert_eq!(app.status(Some("bob"), Method::GET, item).await, StatusCode::FORBIDDEN, "{item}");
        assert_eq!(app.status(Some("bob"), Method::POST, item).await, StatusCode::OK, "{item}");
        assert_eq!(app.status(Some("bob"), Method::DELETE, item).await, StatusCode::FORBIDDEN, "{item}");
    }
}

#[tokio::test]
async fn parent_rule_does_not_grant_siblings() {
    let app = App::new();
    assert_eq!(app.status(Some("bob"), Method::GET, "/dataset2/resource2").await, StatusCode::OK);
    assert_eq!(app.status(Some("bob"), Method::GET, "/dataset2/resource3").await, StatusCode::FORBIDDEN);
    assert_eq!(app.status(Some("bob"), Method::POST, "/dataset2/folder2/item1").await, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cathy_inherits_admin_until_revoked() {
    let app = App::new();
    for method in METHODS {
        assert_eq!(app.status(Some("cathy"), method.clone(), "/dataset1/item").await, StatusCode::OK, "{method}");
        assert_eq!(app.status(Some("cathy"), method.clone(), "/dataset2/item").await, StatusCode::FORBIDDEN, "{method}");
    }
    assert_eq!(app.reached(), METHODS.len());

    assert!(app.policy.delete_roles_for_user("cathy").unwrap());

    for method in METHODS {
        assert_eq!(app.status(Some("cathy"), method.clone(), "/dataset1/item").await, StatusCode::FORBIDDEN, "{method}");
        assert_eq!(app.status(Some("cathy"), method.clone(), "/dataset2/item").await, StatusCode::FORBIDDEN, "{method}");
    }
    assert_eq!(app.reached(), METHODS.len());
}

#[tokio::test]
async fn role_granted_at_runtime_then_revoked() {
    let app = App::new();
    assert_eq!(app.status(Some("dave"), Method::DELETE, "/dataset1/x").await, StatusCode::FORBIDDEN);

    app.policy.add_role_for_user("dave", "dataset1_admin").unwrap();
    assert_eq!(app.status(Some("dave"), Method::DELETE, "/dataset1/x").await, StatusCode::OK);

    app.policy.delete_roles_for_user("dave").unwrap();
    assert_eq!(app.status(Some("dave"), Method::DELETE, "/dataset1/x").await, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn no_identity_is_forbidden_everywhere() {
    let app = App::new();
    for path in ["/dataset1/resource1", "/dataset2/resource1", "/dataset2/folder1/item1"] {
        for method in METHODS {
            assert_eq!(app.status(None, method, path).await, StatusCode::FORBIDDEN);
        }
    }
    assert_eq!(app.reached(), 0);
}

#[tokio::test]
async fn anonymous_rules_apply_to_requests_without_identity() {
    let policy = Arc::new(RbacPolicy::from_csv(POLICY).unwrap());
    policy.add_policy("guest", "/public/*", "GET").unwrap();
    let handler = Chain::new()
        .with(Authorizer::new(policy).anonymous_subject("guest"))
        .then(|_req: Request| async { StatusCode::OK });

    let mut open = ResponseCapture::new();
    handler.call(request(Method::GET, "/public/index"), &mut open).await;
    assert_eq!(open.status(), Some(StatusCode::OK));

    let mut closed = ResponseCapture::new();
    handler.call(request(Method::GET, "/dataset1/resource1"), &mut closed).await;
    assert_eq!(closed.status(), Some(StatusCode::FORBIDDEN));
}
