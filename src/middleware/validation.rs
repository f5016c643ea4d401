//! Declared body-size limits and proxy header warnings.

use http::StatusCode;
use http::header::CONTENT_LENGTH;
use tracing::warn;

use crate::context::RequestContext;
use crate::error::Outcome;
use crate::request::Request;
use crate::response::Response;
use crate::telemetry::Logger;

use super::{BoxFuture, Interceptor, Next};

const FORWARDING_HEADERS: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

/// Rejects requests whose declared `content-length` exceeds the limit.
///
/// Only the header is inspected; the body is never read. A request with no
/// `content-length` passes. A value that is not a non-negative integer is
/// answered with `400`.
///
/// Forwarding headers are logged at warn level and otherwise ignored: the
/// client identity always comes from the socket.
pub struct Validation {
    max_content_length: u64,
    logger: Logger,
}

#[derive(Debug, PartialEq, Eq)]
enum Declared {
    Absent,
    Length(u64),
    Malformed,
}

impl Validation {
    pub fn new(max_content_length: u64, logger: Logger) -> Self {
        Self { max_content_length, logger }
    }

    fn declared_length(req: &Request) -> Declared {
        match req.headers().get(CONTENT_LENGTH) {
            None => Declared::Absent,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .map_or(Declared::Malformed, Declared::Length),
        }
    }
}

impl Interceptor for Validation {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            match Self::declared_length(&req) {
                Declared::Length(len) if len > self.max_content_length => {
                    warn!(
                        parent: self.logger.span(),
                        content_length = len,
                        limit = self.max_content_length,
                        path = req.path(),
                        "request too large"
                    );
                    return Ok(Response::detail(StatusCode::PAYLOAD_TOO_LARGE, "Request too large"));
                }
                Declared::Malformed => {
                    warn!(parent: self.logger.span(), path = req.path(), "malformed content-length");
                    return Ok(Response::detail(StatusCode::BAD_REQUEST, "Invalid content-length header"));
                }
                Declared::Absent | Declared::Length(_) => {}
            }

            for header in FORWARDING_HEADERS {
                if let Some(value) = req.header(header) {
                    warn!(parent: self.logger.span(), header, value, "suspicious header");
                }
            }

            next.run(ctx, req).await
        })
    }
}
