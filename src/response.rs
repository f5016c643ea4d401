//! Outgoing HTTP response type and the [`IntoResponse`] / [`IntoOutcome`]
//! conversion traits.
//!
//! Build a [`Response`] in your handler and return it. Interceptors adjust
//! headers on the way out with [`Response::set_header`].

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use tracing::warn;

use crate::error::{Fault, Outcome};

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK, no custom headers needed)
///
/// ```rust
/// use tollgate::Response;
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::detail(StatusCode::NOT_FOUND, "Post not found");
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use tollgate::Response;
/// use http::StatusCode;
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    body: Vec<u8>,
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::bytes_raw("application/json", body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::bytes_raw("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Vec::new(), headers: Vec::new(), status: code }
    }

    /// JSON error body of the shape `{"detail": "..."}`, used for every
    /// response the pipeline generates itself.
    pub fn detail(code: StatusCode, detail: &str) -> Self {
        Self::json_value(code, &serde_json::json!({ "detail": detail }))
    }

    /// Serialises `value` as the JSON body.
    pub fn json_value(code: StatusCode, value: &serde_json::Value) -> Self {
        Self::builder().status(code).json(value.to_string().into_bytes())
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    fn bytes_raw(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            body,
            headers: vec![("content-type".to_owned(), content_type.to_owned())],
            status: StatusCode::OK,
        }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Case-insensitive header lookup; returns the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets `name` to `value`, replacing every existing value for `name`.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_ascii_lowercase(), value.into()));
    }

    /// Converts to the `http` type hyper writes to the wire.
    ///
    /// Headers whose name or value is not valid HTTP are dropped with a
    /// warning rather than failing the whole response.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut out = http::Response::new(Full::new(Bytes::from(self.body)));
        *out.status_mut() = self.status;
        let headers = out.headers_mut();
        for (name, value) in self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(n), Ok(v)) => { headers.append(n, v); }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        out
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish("application/json", body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Terminate with no body (e.g. `204 No Content`).
    pub fn no_body(self) -> Response {
        Response { body: Vec::new(), headers: self.headers, status: self.status }
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

impl IntoResponse for serde_json::Value {
    fn into_response(self) -> Response { Response::json_value(StatusCode::OK, &self) }
}

// ── IntoOutcome ───────────────────────────────────────────────────────────────

/// What a terminal handler may return.
///
/// Every [`IntoResponse`] type listed above, plus `Result<T, E>` where the
/// error converts into a [`Fault`]. An `Err` travels up the pipeline as an
/// unhandled fault.
///
/// ```rust,ignore
/// async fn get_post(req: Request) -> Result<Response, Fault> {
///     let post = load(req.param("id"))?;
///     Ok(Response::json(serde_json::to_vec(&post)?))
/// }
/// ```
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

macro_rules! outcome_from_response {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoOutcome for $ty {
                fn into_outcome(self) -> Outcome { Ok(self.into_response()) }
            }
        )*
    };
}

outcome_from_response!(Response, &'static str, String, StatusCode, serde_json::Value);

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoResponse,
    E: Into<Fault>,
{
    fn into_outcome(self) -> Outcome {
        self.map(IntoResponse::into_response).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut res = Response::builder().header("X-Request-ID", "a").text("ok");
        res.set_header("x-request-id", "b");

        let matching: Vec<_> = res.headers().iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("x-request-id"))
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(res.header("X-REQUEST-ID"), Some("b"));
    }

    #[test]
    fn detail_body_is_json() {
        let res = Response::detail(StatusCode::PAYLOAD_TOO_LARGE, "Request too large");
        assert_eq!(res.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(res.header("content-type"), Some("application/json"));

        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["detail"], "Request too large");
    }

    #[test]
    fn into_inner_drops_invalid_headers() {
        let mut res = Response::text("ok");
        res.set_header("x-good", "yes");
        res.set_header("bad header", "no");

        let inner = res.into_inner();
        assert_eq!(inner.headers()["x-good"], "yes");
        assert_eq!(inner.headers().len(), 2);
    }

    #[test]
    fn results_become_outcomes() {
        let ok: Result<&'static str, Fault> = Ok("fine");
        assert_eq!(ok.into_outcome().unwrap().status_code(), StatusCode::OK);

        let err: Result<Response, Fault> = Err(Fault::handler("nope"));
        assert_eq!(err.into_outcome().unwrap_err().message(), "nope");
    }
}
