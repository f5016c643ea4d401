//! Response timing and slow-request warnings.

use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::context::RequestContext;
use crate::error::Outcome;
use crate::request::Request;
use crate::telemetry::Logger;

use super::{BoxFuture, Interceptor, Next};

/// Response header with the time spent inside this interceptor, formatted
/// as seconds with four decimals and an `s` suffix (`0.0123s`).
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";

/// Measures the inner chain, stamps [`RESPONSE_TIME_HEADER`] and warns when
/// a request takes longer than the threshold.
///
/// The warning is logged whatever the outcome, faults included. Slow
/// requests are never rejected.
pub struct Timing {
    threshold: Duration,
    clock: SharedClock,
    logger: Logger,
}

impl Timing {
    /// `threshold_secs` is clamped: negative reads as zero, overflow as
    /// forever.
    pub fn new(threshold_secs: f64, clock: SharedClock, logger: Logger) -> Self {
        let threshold = Duration::try_from_secs_f64(threshold_secs.max(0.0)).unwrap_or(Duration::MAX);
        Self { threshold, clock, logger }
    }

    pub fn threshold(&self) -> Duration { self.threshold }
}

impl Interceptor for Timing {
    fn name(&self) -> &'static str {
        "timing"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let started = self.clock.now();
            let method = req.method().clone();
            let path = req.path().to_owned();

            let mut outcome = next.run(ctx, req).await;
            let elapsed = self.clock.now().saturating_duration_since(started);

            if elapsed > self.threshold {
                warn!(
                    parent: self.logger.span(),
                    %method,
                    %path,
                    elapsed_secs = elapsed.as_secs_f64(),
                    threshold_secs = self.threshold.as_secs_f64(),
                    "slow request"
                );
            } else {
                debug!(parent: self.logger.span(), %method, %path, elapsed_secs = elapsed.as_secs_f64(), "timed");
            }

            if let Ok(res) = &mut outcome {
                res.set_header(RESPONSE_TIME_HEADER, format_response_time(elapsed));
            }
            outcome
        })
    }
}

pub(crate) fn format_response_time(elapsed: Duration) -> String {
    format!("{:.4}s", elapsed.as_secs_f64())
}
