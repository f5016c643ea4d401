//! Fixed security response headers.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::context::RequestContext;
use crate::error::Outcome;
use crate::request::Request;
use crate::response::Response;

use super::{BoxFuture, Interceptor, Next};

/// Stamps the configured security header set on every response that comes
/// back through it, overwriting any value set further in.
///
/// Never rejects and never faults. Faults pass through unstamped; register
/// it outside [`Recover`](super::Recover) so the translated `500`s are
/// stamped too.
pub struct SecurityHeaders {
    headers: Arc<[(&'static str, &'static str)]>,
}

impl SecurityHeaders {
    pub fn new(config: &PipelineConfig) -> Self {
        Self { headers: config.security_headers().into() }
    }

    pub fn apply(&self, res: &mut Response) {
        for (name, value) in self.headers.iter() {
            res.set_header(name, *value);
        }
    }
}

impl Interceptor for SecurityHeaders {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let mut outcome = next.run(ctx, req).await;
            if let Ok(res) = &mut outcome {
                self.apply(res);
            }
            outcome
        })
    }
}
