//! Chain composition.

use std::sync::Arc;

use http::StatusCode;
use tracing::error;

use crate::clock::{SharedClock, SystemClock};
use crate::config::PipelineConfig;
use crate::context::{ClientIdentity, RequestContext};
use crate::error::{ConfigError, Outcome};
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;
use crate::telemetry::Logger;

use super::{
    Authentication, Cors, Interceptor, Next, RateLimit, RateLimiter, Recover, SecurityHeaders, Timing,
    Trace, TrustedHosts, Validation,
};

/// An immutable interceptor chain wrapped around a terminal handler.
///
/// Composed once at startup; shared by every request.
///
/// ```rust,no_run
/// use tollgate::{Pipeline, PipelineConfig, Request, Router, Server};
/// use tollgate::telemetry::Logger;
///
/// # async fn run() -> Result<(), tollgate::Error> {
/// let config = PipelineConfig::default();
/// let router = Router::new().get("/", |_req: Request| async { "hello" });
///
/// let pipeline = Pipeline::standard(&config, &Logger::default())?.terminal(router);
/// Server::bind(&config.bind_address)?.serve(pipeline).await
/// # }
/// ```
pub struct Pipeline {
    layers: Vec<Arc<dyn Interceptor>>,
    terminal: BoxedHandler,
    clock: SharedClock,
    logger: Logger,
}

impl Pipeline {
    /// Wraps `terminal` in `interceptors`; the first one is outermost.
    pub fn build(interceptors: Vec<Arc<dyn Interceptor>>, terminal: impl Handler) -> Self {
        Self {
            layers: interceptors,
            terminal: terminal.into_boxed_handler(),
            clock: Arc::new(SystemClock),
            logger: Logger::default(),
        }
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// The canonical stack, outermost first:
    ///
    /// ```text
    /// SecurityHeaders → Recover → Trace → Timing → TrustedHosts → Cors
    ///     → RateLimit → Authentication → Validation → terminal
    /// ```
    ///
    /// `SecurityHeaders` cannot fault, so it sits outside `Recover` and also
    /// stamps the `500`s that `Recover` produces. Everything that can fault
    /// is nested inside `Recover`. `Trace` and `Timing` wrap every layer
    /// that can short-circuit, so rejections carry the correlation and
    /// timing headers too.
    ///
    /// Fails if `config` does not validate.
    pub fn standard(config: &PipelineConfig, logger: &Logger) -> Result<PipelineBuilder, ConfigError> {
        Self::standard_with_clock(config, logger, Arc::new(SystemClock))
    }

    /// [`standard`](Self::standard) with an explicit time source.
    pub fn standard_with_clock(
        config: &PipelineConfig,
        logger: &Logger,
        clock: SharedClock,
    ) -> Result<PipelineBuilder, ConfigError> {
        config.validate()?;

        let limiter = Arc::new(RateLimiter::new(config.requests_per_minute));

        Ok(PipelineBuilder::new()
            .clock(Arc::clone(&clock))
            .logger(logger.clone())
            .layer(SecurityHeaders::new(config))
            .layer(Recover::new(config.permissive, Arc::clone(&clock), logger.child("recover")))
            .layer(Trace::new(Arc::clone(&clock), logger.child("trace")))
            .layer(Timing::new(config.slow_request_threshold_secs, Arc::clone(&clock), logger.child("timing")))
            .layer(TrustedHosts::new(&config.allowed_hosts, logger.child("trusted_hosts")))
            .layer(Cors::new(&config.cors_origins))
            .layer(RateLimit::new(limiter, clock, logger.child("rate_limit")))
            .layer(Authentication::new(&config.public_path_prefixes, logger.child("authentication")))
            .layer(Validation::new(config.max_content_length, logger.child("validation"))))
    }

    /// Runs one request through the chain.
    ///
    /// Returns whatever the outermost interceptor returns, including an
    /// unhandled fault if no [`Recover`] is registered.
    pub async fn call(&self, req: Request) -> Outcome {
        let client = ClientIdentity::from_remote(req.remote_addr());
        let mut ctx = RequestContext::new(client, self.clock.now());
        Next::new(&self.layers, &self.terminal).run(&mut ctx, req).await
    }

    /// Runs one request and always produces a response.
    ///
    /// A fault that escapes the whole chain is logged and answered with a
    /// bare `500`. With [`Recover`] registered this never happens.
    pub async fn respond(&self, req: Request) -> Response {
        match self.call(req).await {
            Ok(res) => res,
            Err(fault) => {
                error!(parent: self.logger.span(), %fault, "fault escaped the pipeline");
                Response::detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }

    /// Interceptor names in execution order.
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }
}

/// Builder for [`Pipeline`]. Layers run in the order they are added.
pub struct PipelineBuilder {
    layers: Vec<Arc<dyn Interceptor>>,
    clock: SharedClock,
    logger: Logger,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self { layers: Vec::new(), clock: Arc::new(SystemClock), logger: Logger::default() }
    }

    /// Appends an interceptor inside every interceptor added so far.
    pub fn layer(self, interceptor: impl Interceptor) -> Self {
        self.layer_arc(Arc::new(interceptor))
    }

    /// Appends an interceptor that is already shared.
    pub fn layer_arc(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.layers.push(interceptor);
        self
    }

    /// Time source for request arrival stamps.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Finishes the chain with its terminal handler.
    pub fn terminal(self, terminal: impl Handler) -> Pipeline {
        Pipeline {
            layers: self.layers,
            terminal: terminal.into_boxed_handler(),
            clock: self.clock,
            logger: self.logger,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self { Self::new() }
}
