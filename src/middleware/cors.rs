//! Cross-origin resource sharing.

use std::collections::HashSet;

use http::{Method, StatusCode};

use crate::context::RequestContext;
use crate::error::Outcome;
use crate::request::Request;
use crate::response::Response;

use super::{BoxFuture, Interceptor, Next};

pub(crate) const ORIGIN: &str = "origin";
pub(crate) const REQUEST_METHOD: &str = "access-control-request-method";
pub(crate) const REQUEST_HEADERS: &str = "access-control-request-headers";
pub(crate) const ALLOW_ORIGIN: &str = "access-control-allow-origin";
pub(crate) const ALLOW_METHODS: &str = "access-control-allow-methods";
pub(crate) const ALLOW_HEADERS: &str = "access-control-allow-headers";
pub(crate) const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
pub(crate) const MAX_AGE: &str = "access-control-max-age";
const VARY: &str = "vary";

const ALLOWED_METHODS: &str = "DELETE, GET, HEAD, OPTIONS, PATCH, POST, PUT";
const PREFLIGHT_MAX_AGE: &str = "600";

#[derive(Debug, Clone)]
enum AllowedOrigins {
    Any,
    List(HashSet<String>),
}

impl AllowedOrigins {
    fn is_allowed(&self, origin: &str) -> bool {
        match self {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(origins) => origins.contains(origin),
        }
    }
}

/// Answers CORS preflights and marks responses to allowed origins.
///
/// Credentials are always allowed, so the matching origin is echoed back
/// rather than `*`, even when every origin is accepted. Any method and any
/// requested header pass the preflight.
///
/// A preflight (`OPTIONS` with `origin` and `access-control-request-method`)
/// never reaches the inner chain: an allowed origin gets `200`, any other
/// gets `400 {"detail":"Disallowed CORS origin"}`. Ordinary requests always
/// continue; a disallowed origin just gets no `access-control-*` headers.
pub struct Cors {
    origins: AllowedOrigins,
}

impl Cors {
    /// `"*"` anywhere in `origins` allows every origin.
    pub fn new(origins: &[String]) -> Self {
        let origins = if origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins.iter().cloned().collect())
        };
        Self { origins }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.origins.is_allowed(origin)
    }

    fn preflight(&self, origin: &str, requested_headers: Option<&str>) -> Response {
        if !self.is_allowed(origin) {
            return Response::detail(StatusCode::BAD_REQUEST, "Disallowed CORS origin");
        }

        let mut res = Response::text("OK");
        res.set_header(ALLOW_ORIGIN, origin);
        res.set_header(ALLOW_METHODS, ALLOWED_METHODS);
        if let Some(requested) = requested_headers {
            res.set_header(ALLOW_HEADERS, requested);
        }
        res.set_header(ALLOW_CREDENTIALS, "true");
        res.set_header(MAX_AGE, PREFLIGHT_MAX_AGE);
        res.set_header(VARY, "Origin");
        res
    }
}

impl Interceptor for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let Some(origin) = req.header(ORIGIN).map(str::to_owned) else {
                return next.run(ctx, req).await;
            };

            if req.method() == Method::OPTIONS && req.header(REQUEST_METHOD).is_some() {
                return Ok(self.preflight(&origin, req.header(REQUEST_HEADERS)));
            }

            let allowed = self.is_allowed(&origin);
            let mut outcome = next.run(ctx, req).await;
            if let (Ok(res), true) = (&mut outcome, allowed) {
                res.set_header(ALLOW_ORIGIN, origin);
                res.set_header(ALLOW_CREDENTIALS, "true");
                let vary = match res.header(VARY) {
                    Some(existing) if !existing.eq_ignore_ascii_case("origin") => format!("{existing}, Origin"),
                    _ => "Origin".to_owned(),
                };
                res.set_header(VARY, vary);
            }
            outcome
        })
    }
}
