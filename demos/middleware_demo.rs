//! Middleware demo: a handful of endpoints that exercise each interceptor.
//!
//! Run with:
//!   cargo run --example middleware_demo
//!   RATE_LIMIT_REQUESTS_PER_MINUTE=5 DEBUG=true cargo run --example middleware_demo
//!   TOLLGATE_CONFIG=tollgate.toml cargo run --example middleware_demo
//!
//! Try:
//!   curl -i http://127.0.0.1:8000/middleware-demo/
//!   curl -i http://127.0.0.1:8000/middleware-demo/slow
//!   curl -i http://127.0.0.1:8000/middleware-demo/error
//!   curl -i http://127.0.0.1:8000/middleware-demo/fault
//!   curl -i -X OPTIONS http://127.0.0.1:8000/middleware-demo/ \
//!       -H 'origin: http://localhost:3000' -H 'access-control-request-method: POST'
//!   curl -i -X POST http://127.0.0.1:8000/middleware-demo/large-request -d 'hello'
//!   for i in $(seq 1 6); do curl -s -o /dev/null -w '%{http_code}\n' \
//!       http://127.0.0.1:8000/middleware-demo/rate-limit-test; done
//!   curl -i http://127.0.0.1:8000/middleware-demo/headers
//!   curl -i http://127.0.0.1:8000/health

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::StatusCode;
use serde_json::json;
use tollgate::telemetry::{self, Logger};
use tollgate::{Fault, Pipeline, PipelineConfig, Request, Response, Router, Server, health};

#[tokio::main]
async fn main() -> Result<(), tollgate::Error> {
    let config = match std::env::var("TOLLGATE_CONFIG") {
        Ok(path) => PipelineConfig::load(Path::new(&path))?,
        Err(_) => PipelineConfig::default(),
    }
    .with_env_overrides();

    telemetry::init(&config.log)?;

    let app = Router::new()
        .get("/middleware-demo/", demo_root)
        .get("/middleware-demo/slow", slow)
        .get("/middleware-demo/error", error)
        .get("/middleware-demo/fault", fault)
        .post("/middleware-demo/large-request", large_request)
        .get("/middleware-demo/rate-limit-test", rate_limit_test)
        .get("/middleware-demo/headers", headers)
        .get("/health", health::liveness)
        .get("/health/ready", health::readiness);

    let pipeline = Pipeline::standard(&config, &Logger::default())?.terminal(app);

    Server::bind(&config.bind_address)?.serve(pipeline).await
}

async fn demo_root(_req: Request) -> serde_json::Value {
    json!({
        "message": "Middleware Demo",
        "features": [
            "Request logging with unique IDs",
            "Rate limiting",
            "Security headers",
            "Performance monitoring",
            "Error handling",
            "Request validation",
        ],
    })
}

// Sleeps past the default one-second threshold so Timing logs a warning.
async fn slow(_req: Request) -> serde_json::Value {
    tokio::time::sleep(Duration::from_millis(1200)).await;
    json!({ "message": "This was a slow request", "processing_time": "1.2 seconds" })
}

async fn error(_req: Request) -> Response {
    Response::detail(StatusCode::INTERNAL_SERVER_ERROR, "This is a simulated error")
}

// Fails instead of answering, so Recover produces the 500.
async fn fault(_req: Request) -> Result<Response, Fault> {
    Err(Fault::handler("This is a test error for middleware demonstration"))
}

async fn large_request(mut req: Request) -> Result<serde_json::Value, Fault> {
    let body = req.body_bytes().await?;
    Ok(json!({ "message": "Large request processed", "content_length": body.len() }))
}

async fn rate_limit_test(_req: Request) -> serde_json::Value {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64());
    json!({ "message": "Rate limit test successful", "timestamp": timestamp })
}

async fn headers(req: Request) -> serde_json::Value {
    let request_headers: serde_json::Map<String, serde_json::Value> = req
        .headers()
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.into())))
        .collect();
    let request_id = req
        .context()
        .and_then(|ctx| ctx.correlation_id())
        .map_or_else(|| "Not set".to_owned(), |id| id.to_string());

    json!({
        "request_headers": request_headers,
        "request_id": request_id,
        "message": "Check response headers for x-request-id and x-process-time",
    })
}
