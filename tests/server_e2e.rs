//! End-to-end tests over a real TCP socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tollgate::telemetry::Logger;
use tollgate::{Error, Pipeline, PipelineConfig, Server};

mod common;

use common::{SECURITY_HEADERS, demo_router, send};

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), Error>>,
}

async fn start(config: PipelineConfig) -> Running {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = Pipeline::standard(&config, &Logger::disabled())
        .unwrap()
        .terminal(demo_router(&calls));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(Server::serve_listener(listener, pipeline, async move {
        let _ = stopped.await;
    }));

    Running { addr, stop, handle }
}

async fn shutdown(running: Running) {
    running.stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running.handle)
        .await
        .expect("server did not drain in time")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn responses_carry_the_full_header_set() {
    let server = start(PipelineConfig::default()).await;

    let res = send(server.addr, "GET", "/middleware-demo/", &[]).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body, r#"{"message":"Middleware Demo"}"#);
    assert_eq!(res.header("x-request-id").map(str::len), Some(36));
    assert!(res.header("x-process-time").unwrap().parse::<f64>().is_ok());
    assert!(res.header("x-response-time").unwrap().ends_with('s'));
    for name in SECURITY_HEADERS {
        assert!(res.header(name).is_some(), "missing {name}");
    }

    shutdown(server).await;
}

#[tokio::test]
async fn rate_limit_applies_per_peer_over_tcp() {
    let server = start(PipelineConfig { requests_per_minute: 2, ..PipelineConfig::default() }).await;

    let mut statuses = Vec::new();
    for _ in 0..3 {
        statuses.push(send(server.addr, "GET", "/middleware-demo/rate-limit-test", &[]).await.status);
    }

    assert_eq!(statuses, [200, 200, 429]);
    shutdown(server).await;
}

#[tokio::test]
async fn forwarded_for_does_not_change_the_client() {
    let server = start(PipelineConfig { requests_per_minute: 1, ..PipelineConfig::default() }).await;

    let first = send(server.addr, "GET", "/middleware-demo/", &[("x-forwarded-for", "1.1.1.1")]).await;
    let second = send(server.addr, "GET", "/middleware-demo/", &[("x-forwarded-for", "2.2.2.2")]).await;

    assert_eq!(first.status, 200);
    assert_eq!(second.status, 429);
    shutdown(server).await;
}

#[tokio::test]
async fn oversized_declaration_is_rejected_on_the_wire() {
    let server = start(PipelineConfig { max_content_length: 16, ..PipelineConfig::default() }).await;

    // Only the header is sent; the limiter must answer without waiting for a body.
    let res = send(
        server.addr,
        "POST",
        "/middleware-demo/large-request",
        &[("content-length", "2000")],
    )
    .await;

    assert_eq!(res.status, 413);
    assert_eq!(res.body, r#"{"detail":"Request too large"}"#);
    shutdown(server).await;
}

#[tokio::test]
async fn faults_become_json_500s() {
    let server = start(PipelineConfig::default()).await;

    let res = send(server.addr, "GET", "/middleware-demo/fault", &[]).await;

    assert_eq!(res.status, 500);
    assert_eq!(res.body, r#"{"detail":"Internal server error","error":"Something went wrong"}"#);
    assert!(res.header("x-request-id").is_some());
    assert!(res.header("content-security-policy").is_some());
    shutdown(server).await;
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let server = start(PipelineConfig::default()).await;
    let addr = server.addr;

    assert_eq!(send(addr, "GET", "/health", &[]).await.status, 200);
    shutdown(server).await;

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
