//! The whole stack over a real socket.

use std::sync::Arc;
use std::time::Duration;

use gatehouse::middleware::{Authorizer, Chain, Identify, Instrumentation};
use gatehouse::policy::RbacPolicy;
use gatehouse::testing::MetricsProbe;
use gatehouse::{Error, HeaderName, Request, Response, Router, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;

const POLICY: &str = include_str!("fixtures/authz_policy.csv");

async fn roundtrip(addr: std::net::SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn serves_authorizes_and_drains() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let probe = Arc::new(MetricsProbe::new());
    let app = Chain::new()
        .with(Identify::header(HeaderName::from_static("x-user")))
        .with(Instrumentation::new(probe.clone()))
        .with(Authorizer::new(Arc::new(RbacPolicy::from_csv(POLICY).unwrap())))
        .then(Router::new().get("/dataset1/{item}", |req: Request| async move {
            Response::text(format!("item {}", req.param("item").unwrap_or("?")))
        }));

    let server = Server::from_listener(TcpListener::bind("127.0.0.1:0").await.unwrap());
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(server.serve_with_shutdown(app, async {
        let _ = stop_rx.await;
    }));

    let allowed = roundtrip(
        addr,
        "GET /dataset1/resource1 HTTP/1.1\r\nhost: test\r\nx-user: alice\r\nconnection: close\r\n\r\n",
    )
    .await;
    assert!(allowed.starts_with("HTTP/1.1 200 OK"), "{allowed}");
    assert!(allowed.ends_with("item resource1"), "{allowed}");

    let anonymous =
        roundtrip(addr, "GET /dataset1/resource1 HTTP/1.1\r\nhost: test\r\nconnection: close\r\n\r\n").await;
    assert!(anonymous.starts_with("HTTP/1.1 403 Forbidden"), "{anonymous}");

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();

    let codes: Vec<String> = probe.increments().into_iter().map(|l| l.code).collect();
    assert_eq!(codes, ["200", "403"]);
}

/// Reads from `stream` until the received bytes end with `tail`.
async fn read_until(stream: &mut TcpStream, tail: &str) -> String {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    while !out.ends_with(tail.as_bytes()) {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed early: {}", String::from_utf8_lossy(&out));
        out.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(out).unwrap()
}

fn start(router: Router) -> (std::net::SocketAddr, oneshot::Sender<()>, JoinHandle<Result<(), Error>>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let server = Server::from_listener(TcpListener::from_std(listener).unwrap());
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve_with_shutdown(router, async {
        let _ = stop_rx.await;
    }));
    (addr, stop_tx, handle)
}

#[tokio::test]
async fn idle_keep_alive_connection_does_not_block_shutdown() {
    let (addr, stop, server) = start(Router::new().get("/", |_req: Request| async { "hello" }));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nhost: test\r\n\r\n").await.unwrap();
    let head = read_until(&mut stream, "hello").await;
    assert!(head.starts_with("HTTP/1.1 200 OK"), "{head}");

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(3), server)
        .await
        .expect("server kept waiting on an idle connection")
        .unwrap()
        .unwrap();

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn request_in_flight_at_shutdown_completes() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (entered, go) = (Arc::clone(&started), Arc::clone(&release));
    let router = Router::new().get("/slow", move |_req: Request| {
        let (entered, go) = (Arc::clone(&entered), Arc::clone(&go));
        async move {
            entered.notify_one();
            go.notified().await;
            "finally"
        }
    });
    let (addr, stop, server) = start(router);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET /slow HTTP/1.1\r\nhost: test\r\n\r\n").await.unwrap();
    started.notified().await;

    stop.send(()).unwrap();
    tokio::task::yield_now().await;
    assert!(!server.is_finished());

    release.notify_one();
    let response = read_until(&mut stream, "finally").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");

    tokio::time::timeout(Duration::from_secs(3), server).await.unwrap().unwrap().unwrap();
}
