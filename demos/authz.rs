//! Policy-gated service with Prometheus metrics.
//!
//! Run with:
//!   cargo run --example authz
//!
//! Try:
//!   curl -H 'x-user: alice' http://localhost:3000/dataset1/resource1
//!   curl -H 'x-user: alice' -X POST http://localhost:3000/dataset1/resource2   # 403
//!   curl -H 'x-user: cathy' -X DELETE http://localhost:3000/dataset1/anything
//!   curl http://localhost:3000/dataset1/resource1                              # 403
//!   curl http://localhost:3000/metrics

use std::sync::Arc;

use gatehouse::metrics::MetricsConfig;
use gatehouse::middleware::{Authorizer, Chain, Identify, Instrumentation};
use gatehouse::policy::RbacPolicy;
use gatehouse::{ContentType, Error, HeaderName, Request, Response, Router, Server, StatusCode};
use prometheus::{Encoder, Registry, TextEncoder};

const POLICY: &str = "
p, alice, /dataset1/*, GET
p, alice, /dataset1/resource1, POST
p, bob, /dataset2/resource1, *
p, bob, /dataset2/folder1/*, POST
p, dataset1_admin, /dataset1/*, *
p, anonymous, /metrics, GET
g, cathy, dataset1_admin
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let registry = Registry::new();
    let policy = Arc::new(RbacPolicy::from_csv(POLICY)?);

    let scrape = registry.clone();
    let router = Router::new()
        .get("/metrics", move |_req: Request| {
            let body = exposition(&scrape);
            async move { body }
        })
        .get("/dataset1/{item}", read_item)
        .post("/dataset1/{item}", write_item)
        .delete("/dataset1/{item}", delete_item)
        .get("/dataset2/{*rest}", read_item)
        .post("/dataset2/{*rest}", write_item);

    let app = Chain::new()
        .with(Identify::header(HeaderName::from_static("x-user")))
        .with(Instrumentation::prometheus(&MetricsConfig::default(), &registry)?)
        .with(Authorizer::new(policy))
        .then(router);

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

fn exposition(registry: &Registry) -> Response {
    let mut out = Vec::new();
    match TextEncoder::new().encode(&registry.gather(), &mut out) {
        Ok(()) => Response::builder().bytes(ContentType::Prometheus, out),
        Err(_) => Response::status(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn read_item(req: Request) -> Response {
    Response::text(format!("{} read {}", req.subject().unwrap_or("?"), req.path()))
}

async fn write_item(req: Request) -> Response {
    let path = req.path().to_owned();
    match req.bytes().await {
        Ok(body) => Response::builder()
            .status(StatusCode::CREATED)
            .header("location", &path)
            .text(format!("stored {} bytes", body.len())),
        Err(_) => Response::status(StatusCode::BAD_REQUEST),
    }
}

async fn delete_item(_req: Request) -> StatusCode {
    StatusCode::NO_CONTENT
}
