//! Host header allow-list.

use http::StatusCode;
use http::header::HOST;
use tracing::warn;

use crate::context::RequestContext;
use crate::error::Outcome;
use crate::request::Request;
use crate::response::Response;
use crate::telemetry::Logger;

use super::{BoxFuture, Interceptor, Next};

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Any,
    Exact(String),
    // Stored with the leading dot: `*.example.com` keeps `.example.com`.
    Suffix(String),
}

impl HostPattern {
    fn parse(pattern: &str) -> Self {
        let pattern = pattern.to_ascii_lowercase();
        if pattern == "*" {
            HostPattern::Any
        } else if let Some(domain) = pattern.strip_prefix('*') {
            HostPattern::Suffix(domain.to_owned())
        } else {
            HostPattern::Exact(pattern)
        }
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Any => true,
            HostPattern::Exact(exact) => host == exact,
            HostPattern::Suffix(suffix) => host.ends_with(suffix.as_str()),
        }
    }
}

/// Rejects requests whose `host` names a server this deployment does not
/// answer for, with `400 {"detail":"Invalid host header"}`.
///
/// The port is ignored. With HTTP/2 the URI authority stands in for a
/// missing `host` header. A request naming no host at all only passes when
/// `"*"` is configured.
pub struct TrustedHosts {
    patterns: Vec<HostPattern>,
    logger: Logger,
}

impl TrustedHosts {
    pub fn new(allowed: &[String], logger: Logger) -> Self {
        Self { patterns: allowed.iter().map(|p| HostPattern::parse(p)).collect(), logger }
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        let host = strip_port(host).to_ascii_lowercase();
        self.patterns.iter().any(|pattern| pattern.matches(&host))
    }

    fn allows_any(&self) -> bool {
        self.patterns.contains(&HostPattern::Any)
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal: `[::1]:8000`.
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    host.split(':').next().unwrap_or(host)
}

impl Interceptor for TrustedHosts {
    fn name(&self) -> &'static str {
        "trusted_hosts"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            if !self.allows_any() {
                let host = req
                    .header(HOST.as_str())
                    .or_else(|| req.uri().authority().map(|authority| authority.as_str()))
                    .unwrap_or("");
                if !self.is_allowed(host) {
                    warn!(parent: self.logger.span(), host, client = %ctx.client(), "untrusted host");
                    return Ok(Response::detail(StatusCode::BAD_REQUEST, "Invalid host header"));
                }
            }
            next.run(ctx, req).await
        })
    }
}
