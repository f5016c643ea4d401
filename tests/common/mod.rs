//! Shared helpers for the integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tollgate::{Fault, Request, Response, Router, health};

#[allow(dead_code)]
pub const SECURITY_HEADERS: [&str; 6] = [
    "x-content-type-options",
    "x-frame-options",
    "x-xss-protection",
    "strict-transport-security",
    "referrer-policy",
    "content-security-policy",
];

/// Builds an in-process request from `peer`. `None` means the transport
/// reported no address.
#[allow(dead_code)]
pub fn request(method: &str, path: &str, peer: Option<&str>, headers: &[(&str, &str)]) -> Request {
    let mut builder = http::Request::builder().method(method).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = Request::new(builder.body(Full::new(Bytes::new())).unwrap());
    match peer {
        Some(addr) => req.with_remote_addr(addr.parse::<SocketAddr>().unwrap()),
        None => req,
    }
}

/// The demo routes, counting how many requests reach any handler.
#[allow(dead_code)]
pub fn demo_router(calls: &Arc<AtomicUsize>) -> Router {
    let counted = |calls: &Arc<AtomicUsize>| {
        let calls = Arc::clone(calls);
        move |_req: Request| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Response::json(br#"{"message":"Middleware Demo"}"#.to_vec()) }
        }
    };
    let failing = {
        let calls = Arc::clone(calls);
        move |_req: Request| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<Response, _>(Fault::handler("This is a test error for middleware demonstration")) }
        }
    };
    let panicking = |_req: Request| async move {
        let routes: Vec<&str> = Vec::new();
        Response::text(routes[3])
    };

    Router::new()
        .get("/middleware-demo/", counted(calls))
        .get("/middleware-demo/rate-limit-test", counted(calls))
        .post("/middleware-demo/large-request", counted(calls))
        .get("/middleware-demo/error", |_req: Request| async {
            Response::detail(StatusCode::INTERNAL_SERVER_ERROR, "This is a simulated error")
        })
        .get("/middleware-demo/fault", failing)
        .get("/middleware-demo/panic", panicking)
        .get("/health", health::liveness)
}

/// A response read off the wire.
#[allow(dead_code)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[allow(dead_code)]
impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends one HTTP/1.1 request with `connection: close` and reads the whole
/// response.
#[allow(dead_code)]
pub async fn send(addr: SocketAddr, method: &str, path: &str, extra_headers: &[(&str, &str)]) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut raw = format!("{method} {path} HTTP/1.1\r\nhost: {addr}\r\nconnection: close\r\n");
    for (name, value) in extra_headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str("\r\n");
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    parse(&String::from_utf8(buf).unwrap())
}

fn parse(raw: &str) -> RawResponse {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let mut lines = head.lines();
    let status = lines.next().unwrap().split(' ').nth(1).unwrap().parse().unwrap();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_owned()))
        .collect();
    RawResponse { status, headers, body: body.to_owned() }
}
