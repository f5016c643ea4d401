//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};

use crate::context::RequestContext;
use crate::error::BoxError;

/// Type-erased request body. Nothing in the pipeline reads it; only the
/// terminal handler decides whether to.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// An incoming HTTP request.
///
/// Headers are parsed up front; the body stays a stream until someone calls
/// [`Request::body_bytes`].
pub struct Request {
    parts: http::request::Parts,
    body: Body,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Wraps any `http::Request` whose body yields [`Bytes`].
    pub fn new<B>(req: http::Request<B>) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        Self {
            parts,
            body: body.map_err(Into::into).boxed_unsync(),
            params: HashMap::new(),
            remote_addr: None,
        }
    }

    /// Records the peer address the request arrived from.
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The pipeline's view of this request: correlation id, client identity
    /// and arrival time.
    ///
    /// Only set once the request reaches the terminal handler.
    pub fn context(&self) -> Option<&RequestContext> {
        self.parts.extensions.get::<RequestContext>()
    }

    /// Reads the whole body into memory, once. Later calls return the same
    /// bytes.
    pub async fn body_bytes(&mut self) -> Result<Bytes, BoxError> {
        let body = std::mem::replace(&mut self.body, empty_body());
        let bytes = body.collect().await?.to_bytes();
        self.body = Full::new(bytes.clone()).map_err(|never| match never {}).boxed_unsync();
        Ok(bytes)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub(crate) fn attach_context(&mut self, ctx: RequestContext) {
        self.parts.extensions.insert(ctx);
    }
}

fn empty_body() -> Body {
    Full::new(Bytes::new()).map_err(|never| match never {}).boxed_unsync()
}
