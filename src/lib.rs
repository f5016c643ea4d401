//! # tollgate
//!
//! An ordered interceptor pipeline for HTTP services.
//!
//! Every request passes through the same fixed chain before it reaches your
//! handler, and every response passes back through it on the way out:
//!
//! ```text
//! SecurityHeaders → Recover → Trace → Timing → TrustedHosts → Cors
//!     → RateLimit → Authentication → Validation → handler
//! ```
//!
//! - **Correlation ids**: each request gets a fresh UUID, logged on entry and
//!   exit and echoed as `x-request-id`.
//! - **Host and origin checks**: requests naming an unknown `host` get
//!   `400`; allowed browser origins get CORS headers and preflight answers.
//! - **Rate limiting**: a 60-second sliding window per client IP. Excess
//!   requests get `429` with `retry-after`.
//! - **Security headers**: a fixed set, including a content-security-policy
//!   that depends on strict or permissive mode.
//! - **Size checks**: a declared `content-length` over the limit gets `413`
//!   before the handler runs.
//! - **Timing**: `x-process-time`, `x-response-time`, and a warning when a
//!   request is slow.
//! - **Fault translation**: a handler error or panic becomes a `500` JSON
//!   body. The message is only shown in permissive mode.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tollgate::{Pipeline, PipelineConfig, Request, Response, Router, Server, health, telemetry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tollgate::Error> {
//!     let config = PipelineConfig::default().with_env_overrides();
//!     telemetry::init(&config.log)?;
//!
//!     let app = Router::new()
//!         .get("/users/{id}", get_user)
//!         .get("/health", health::liveness);
//!
//!     let pipeline = Pipeline::standard(&config, &telemetry::Logger::default())?.terminal(app);
//!     Server::bind(&config.bind_address)?.serve(pipeline).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//! ```
//!
//! ## Custom interceptors
//!
//! Implement [`Interceptor`] and add it with [`PipelineBuilder::layer`].
//! See the [`middleware`] module for the contract.

mod clock;
mod config;
mod context;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod health;
pub mod middleware;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::PipelineConfig;
pub use context::{ClientIdentity, CorrelationId, RequestContext};
pub use error::{BoxError, ConfigError, Error, Fault, FaultKind, Outcome, ValidationError};
pub use handler::Handler;
pub use middleware::{Interceptor, Next, Pipeline, PipelineBuilder};
pub use request::Request;
pub use response::{IntoOutcome, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
