//! Fault translation.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use http::StatusCode;
use serde_json::json;
use tracing::error;

use crate::clock::SharedClock;
use crate::context::RequestContext;
use crate::error::{Fault, Outcome};
use crate::request::Request;
use crate::response::Response;
use crate::telemetry::Logger;

use super::timing::format_response_time;
use super::trace::seconds;
use super::{BoxFuture, Interceptor, Next, PROCESS_TIME_HEADER, REQUEST_ID_HEADER, RESPONSE_TIME_HEADER};

const GENERIC_MESSAGE: &str = "Something went wrong";

/// Turns any fault from the inner chain into a `500` JSON response.
///
/// Panics raised while polling the inner chain are caught and treated the
/// same way. The fault is logged with the request's correlation id. The
/// response carries `x-request-id` when one was assigned, plus timing
/// headers measured from arrival, since the interceptors that normally
/// stamp them never saw a response.
///
/// Permissive mode puts the fault message in the body; strict mode never
/// does.
pub struct Recover {
    expose_faults: bool,
    clock: SharedClock,
    logger: Logger,
}

impl Recover {
    pub fn new(expose_faults: bool, clock: SharedClock, logger: Logger) -> Self {
        Self { expose_faults, clock, logger }
    }

    fn translate(&self, ctx: &RequestContext, fault: &Fault) -> Response {
        let message = if self.expose_faults { fault.message() } else { GENERIC_MESSAGE };
        let mut res = Response::json_value(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({ "detail": "Internal server error", "error": message }),
        );

        let elapsed = self.clock.now().saturating_duration_since(ctx.arrival());
        if let Some(id) = ctx.correlation_id() {
            res.set_header(REQUEST_ID_HEADER, id.to_string());
        }
        res.set_header(PROCESS_TIME_HEADER, seconds(elapsed));
        res.set_header(RESPONSE_TIME_HEADER, format_response_time(elapsed));
        res
    }
}

impl Interceptor for Recover {
    fn name(&self) -> &'static str {
        "recover"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let outcome = AssertUnwindSafe(next.run(ctx, req))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(Fault::from_panic(payload)));

            match outcome {
                Ok(res) => Ok(res),
                Err(fault) => {
                    let correlation_id = ctx.correlation_id().map(|id| id.to_string());
                    error!(
                        parent: self.logger.span(),
                        correlation_id = correlation_id.as_deref().unwrap_or("-"),
                        client = %ctx.client(),
                        kind = fault.kind().as_str(),
                        %fault,
                        "unhandled fault"
                    );
                    Ok(self.translate(ctx, &fault))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use bytes::Bytes;
    use http_body_util::Full;
    use serde_json::Value;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::context::{ClientIdentity, CorrelationId};
    use crate::handler::Handler;
    use crate::telemetry::capture;

    fn request() -> Request {
        Request::new(http::Request::new(Full::new(Bytes::new())))
    }

    async fn run_failing(expose: bool, ctx: &mut RequestContext) -> Response {
        let chain: Vec<Arc<dyn Interceptor>> =
            vec![Arc::new(Recover::new(expose, Arc::new(ManualClock::new()), Logger::disabled()))];
        let terminal = (|_req: Request| async {
            Err::<Response, _>(Fault::handler("This is a test error for middleware demonstration"))
        })
        .into_boxed_handler();
        Next::new(&chain, &terminal).run(ctx, request()).await.unwrap()
    }

    fn body(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[tokio::test]
    async fn strict_mode_hides_the_message() {
        let mut ctx = RequestContext::new(ClientIdentity::unknown(), Instant::now());
        let res = run_failing(false, &mut ctx).await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body(&res),
            json!({ "detail": "Internal server error", "error": "Something went wrong" })
        );
    }

    #[tokio::test]
    async fn permissive_mode_shows_the_message() {
        let mut ctx = RequestContext::new(ClientIdentity::unknown(), Instant::now());
        let res = run_failing(true, &mut ctx).await;

        assert_eq!(
            body(&res)["error"],
            "This is a test error for middleware demonstration"
        );
    }

    #[test]
    fn stamps_correlation_and_timing_headers() {
        let clock = ManualClock::new();
        let arrival = clock.now();
        clock.advance(Duration::from_millis(20));

        let mut ctx = RequestContext::new(ClientIdentity::unknown(), arrival);
        let id = ctx.assign_correlation_id(CorrelationId::generate());
        let recover = Recover::new(false, Arc::new(clock), Logger::disabled());

        let res = recover.translate(&ctx, &Fault::handler("x"));

        assert_eq!(res.header(REQUEST_ID_HEADER), Some(id.to_string().as_str()));
        assert_eq!(res.header(PROCESS_TIME_HEADER), Some("0.020000"));
        assert_eq!(res.header(RESPONSE_TIME_HEADER), Some("0.0200s"));
    }

    #[tokio::test]
    async fn fault_is_logged_at_error_with_correlation_id() {
        let logs = capture::logs();
        let mut ctx = RequestContext::new(ClientIdentity::new("10.0.0.4"), Instant::now());
        let id = ctx.assign_correlation_id(CorrelationId::generate());

        run_failing(false, &mut ctx).await;

        let events = logs.with_message("unhandled fault");
        assert_eq!(events.len(), 1);
        let fields = &events[0]["fields"];
        assert_eq!(events[0]["level"], "ERROR");
        assert_eq!(fields["correlation_id"], id.to_string().as_str());
        assert_eq!(fields["client"], "10.0.0.4");
        assert_eq!(fields["kind"], "handler");
        assert!(fields["fault"].as_str().unwrap().contains("This is a test error"));
    }

    #[tokio::test]
    async fn panics_become_500() {
        let chain: Vec<Arc<dyn Interceptor>> =
            vec![Arc::new(Recover::new(true, Arc::new(ManualClock::new()), Logger::disabled()))];
        let terminal = (|_req: Request| async move {
            if true {
                panic!("index out of bounds");
            }
            Response::text("unreachable")
        })
        .into_boxed_handler();

        let mut ctx = RequestContext::new(ClientIdentity::unknown(), Instant::now());
        let res = Next::new(&chain, &terminal).run(&mut ctx, request()).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&res)["error"], "index out of bounds");
    }

    #[tokio::test]
    async fn successes_pass_untouched() {
        let chain: Vec<Arc<dyn Interceptor>> =
            vec![Arc::new(Recover::new(false, Arc::new(ManualClock::new()), Logger::disabled()))];
        let terminal = (|_req: Request| async { "fine" }).into_boxed_handler();

        let mut ctx = RequestContext::new(ClientIdentity::unknown(), Instant::now());
        let res = Next::new(&chain, &terminal).run(&mut ctx, request()).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::OK);
        assert!(res.header(RESPONSE_TIME_HEADER).is_none());
    }
}
