//! Middleware layer.
//!
//! Interceptors wrap every request and response and are the place for
//! cross-cutting concerns: correlation ids, rate limiting, header hygiene,
//! size checks, timing, fault translation. Handlers never see them.
//!
//! # The chain
//!
//! A [`Pipeline`] holds an immutable, ordered list of interceptors and a
//! terminal handler. The first interceptor registered is the outermost:
//!
//! ```text
//!   request ─▶ A.before ─▶ B.before ─▶ C.before ─▶ terminal
//!                                                     │
//!  response ◀─ A.after  ◀─ B.after  ◀─ C.after  ◀─────┘
//! ```
//!
//! An interceptor continues the chain by calling [`Next::run`]. Returning
//! without calling it short-circuits: nothing nested inside runs.
//!
//! # Outcomes, not exceptions
//!
//! Every step returns an [`Outcome`]. `Ok(response)` covers both normal
//! responses and deliberate rejections (429, 413). `Err(fault)` is an
//! unhandled failure; it travels outward untouched until [`Recover`] turns
//! it into a `500`. Register `Recover` outside anything that can fault.
//!
//! # Built-in interceptors
//!
//! | Interceptor | Role |
//! |---|---|
//! | [`SecurityHeaders`] | stamps the fixed security header set on every response |
//! | [`Recover`] | converts faults and panics into `500` |
//! | [`Trace`] | correlation id, entry/exit logs, `x-request-id`, `x-process-time` |
//! | [`Timing`] | `x-response-time`, slow-request warnings |
//! | [`TrustedHosts`] | `400` when the `host` header is not allowed |
//! | [`Cors`] | answers preflights, adds `access-control-*` headers for allowed origins |
//! | [`RateLimit`] | per-client sliding window, `429` on excess |
//! | [`Authentication`] | logs requests without a credential; never rejects |
//! | [`Validation`] | `413` on oversized declared bodies, warns on proxy headers |
//!
//! [`Pipeline::standard`] wires them in that order.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::context::RequestContext;
use crate::error::{Fault, Outcome};
use crate::handler::BoxedHandler;
use crate::request::Request;

mod auth;
mod cors;
mod pipeline;
mod rate_limit;
mod recover;
mod security_headers;
mod timing;
mod trace;
mod trusted_hosts;
mod validation;

pub use auth::Authentication;
pub use cors::Cors;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use rate_limit::{Decision, RateLimit, RateLimiter, WINDOW};
pub use recover::Recover;
pub use security_headers::SecurityHeaders;
pub use timing::{RESPONSE_TIME_HEADER, Timing};
pub use trace::{PROCESS_TIME_HEADER, REQUEST_ID_HEADER, Trace};
pub use trusted_hosts::TrustedHosts;
pub use validation::Validation;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One stage of request/response processing.
///
/// # Contract
///
/// - Call `next.run(ctx, req)` at most once. Not calling it short-circuits.
/// - Pass `Err(fault)` from downstream outward unless you are the stage
///   whose job is to translate it.
/// - Never `.await` while holding a lock: a request can be dropped at any
///   await point.
pub trait Interceptor: Send + Sync + 'static {
    /// Short, stable name for logs and [`Pipeline::layer_names`].
    fn name(&self) -> &'static str;

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome>;
}

/// The rest of the chain, as seen by one interceptor.
///
/// Consumed by [`Next::run`], so it cannot be invoked twice.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
    terminal: &'a BoxedHandler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Interceptor>], terminal: &'a BoxedHandler) -> Self {
        Self { chain, terminal }
    }

    /// Runs the next interceptor, or the terminal handler when none is left.
    pub async fn run(self, ctx: &mut RequestContext, req: Request) -> Outcome {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(ctx, req, Next::new(rest, self.terminal)).await,
            None => call_terminal(self.terminal, ctx, req).await,
        }
    }
}

/// Invokes the terminal handler with a snapshot of the context attached.
///
/// A panic while building or polling the handler's future comes back as a
/// [`FaultKind::Panic`](crate::FaultKind::Panic) fault, so every interceptor
/// sees handler panics as ordinary faults.
async fn call_terminal(terminal: &BoxedHandler, ctx: &RequestContext, mut req: Request) -> Outcome {
    req.attach_context(ctx.clone());

    let fut = match panic::catch_unwind(AssertUnwindSafe(|| terminal.call(req))) {
        Ok(fut) => fut,
        Err(payload) => return Err(Fault::from_panic(payload)),
    };

    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(Fault::from_panic(payload)))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;

    use super::*;
    use crate::context::ClientIdentity;
    use crate::error::FaultKind;
    use crate::handler::Handler;
    use crate::response::Response;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for Record {
        fn name(&self) -> &'static str { self.name }

        fn handle<'a>(
            &'a self,
            ctx: &'a mut RequestContext,
            req: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Outcome> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("{}:before", self.name));
                let outcome = next.run(ctx, req).await;
                self.log.lock().unwrap().push(format!("{}:after", self.name));
                outcome
            })
        }
    }

    fn request() -> Request {
        Request::new(http::Request::new(Full::new(Bytes::new())))
    }

    fn ctx() -> RequestContext {
        RequestContext::new(ClientIdentity::unknown(), Instant::now())
    }

    #[tokio::test]
    async fn next_runs_interceptors_then_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Record { name: "a", log: Arc::clone(&log) }),
            Arc::new(Record { name: "b", log: Arc::clone(&log) }),
        ];
        let terminal_log = Arc::clone(&log);
        let terminal = (move |_req: Request| {
            let log = Arc::clone(&terminal_log);
            async move {
                log.lock().unwrap().push("terminal".to_owned());
                Response::text("ok")
            }
        })
        .into_boxed_handler();

        let res = Next::new(&chain, &terminal).run(&mut ctx(), request()).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(
            *log.lock().unwrap(),
            ["a:before", "b:before", "terminal", "b:after", "a:after"]
        );
    }

    #[tokio::test]
    async fn terminal_sees_context_snapshot() {
        let terminal = (|req: Request| async move {
            match req.context() {
                Some(ctx) if ctx.client().is_unknown() => StatusCode::OK,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        })
        .into_boxed_handler();

        let res = Next::new(&[], &terminal).run(&mut ctx(), request()).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn terminal_panic_becomes_fault() {
        let terminal = (|_req: Request| async move {
            if true {
                panic!("handler exploded");
            }
            Response::text("unreachable")
        })
        .into_boxed_handler();

        let fault = Next::new(&[], &terminal).run(&mut ctx(), request()).await.unwrap_err();
        assert_eq!(fault.kind(), FaultKind::Panic);
        assert_eq!(fault.message(), "handler exploded");
    }
}
