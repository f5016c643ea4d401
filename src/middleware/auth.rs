//! Credential-presence logging.

use http::header::AUTHORIZATION;
use tracing::info;

use crate::context::RequestContext;
use crate::error::Outcome;
use crate::request::Request;
use crate::telemetry::Logger;

use super::{BoxFuture, Interceptor, Next};

/// Notes requests to non-public paths that carry no `authorization` header.
///
/// This is an observability hook, not an access check: every request
/// continues down the chain. Public paths are configured as prefixes; the
/// entry `"/"` matches the root path only, otherwise it would cover
/// everything.
pub struct Authentication {
    public: Vec<String>,
    logger: Logger,
}

impl Authentication {
    pub fn new(public_prefixes: &[String], logger: Logger) -> Self {
        Self { public: public_prefixes.to_vec(), logger }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public.iter().any(|prefix| match prefix.as_str() {
            "/" => path == "/",
            prefix => path.starts_with(prefix),
        })
    }
}

impl Interceptor for Authentication {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            if !self.is_public(req.path()) && !req.headers().contains_key(AUTHORIZATION) {
                info!(
                    parent: self.logger.span(),
                    path = req.path(),
                    client = %ctx.client(),
                    "unauthenticated request to protected path"
                );
            }
            next.run(ctx, req).await
        })
    }
}
