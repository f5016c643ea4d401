//! Correlation ids and request lifecycle logs.

use std::time::Duration;

use tracing::{Instrument, error, info, info_span};

use crate::clock::SharedClock;
use crate::context::{CorrelationId, RequestContext};
use crate::error::Outcome;
use crate::request::Request;
use crate::telemetry::Logger;

use super::{BoxFuture, Interceptor, Next};

/// Response header carrying the correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Response header carrying the time spent inside this interceptor, in
/// seconds with six decimals (`0.012345`).
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Assigns each request a fresh [`CorrelationId`], logs its start and end,
/// and echoes the id and elapsed time on the response.
///
/// Everything logged further down the chain runs inside a `request` span
/// carrying the id, so one request's lines can be pulled out of a busy log.
pub struct Trace {
    clock: SharedClock,
    logger: Logger,
}

impl Trace {
    pub fn new(clock: SharedClock, logger: Logger) -> Self {
        Self { clock, logger }
    }
}

impl Interceptor for Trace {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let started = self.clock.now();
            let id = ctx.assign_correlation_id(CorrelationId::generate());
            let method = req.method().clone();
            let path = req.path().to_owned();

            let span = info_span!(
                parent: self.logger.span(),
                "request",
                correlation_id = %id,
                method = %method,
                path = %path,
            );
            info!(parent: &span, correlation_id = %id, client = %ctx.client(), "request started");

            let outcome = next.run(ctx, req).instrument(span.clone()).await;
            let elapsed = self.clock.now().saturating_duration_since(started);

            match outcome {
                Ok(mut res) => {
                    info!(
                        parent: &span,
                        correlation_id = %id,
                        status = res.status_code().as_u16(),
                        elapsed_secs = elapsed.as_secs_f64(),
                        "request completed"
                    );
                    res.set_header(REQUEST_ID_HEADER, id.to_string());
                    res.set_header(PROCESS_TIME_HEADER, seconds(elapsed));
                    Ok(res)
                }
                Err(fault) => {
                    error!(
                        parent: &span,
                        correlation_id = %id,
                        %fault,
                        elapsed_secs = elapsed.as_secs_f64(),
                        "request failed"
                    );
                    Err(fault)
                }
            }
        })
    }
}

pub(crate) fn seconds(elapsed: Duration) -> String {
    format!("{:.6}", elapsed.as_secs_f64())
}
