//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. In a pipeline the router
//! is the terminal handler: every interceptor has already run by the time a
//! route is matched.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::error::Outcome;
use crate::handler::{BoxedHandler, ErasedHandler, Handler};
use crate::middleware::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup and hand it to the pipeline as its terminal
/// handler. Each [`Router::on`] call returns `self` so registrations chain.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use tollgate::{Request, Response, Router};
    /// # use http::Method;
    /// # async fn get_post(_: Request) -> Response { Response::text("") }
    /// # async fn create_post(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/blog/{id}", get_post)
    ///     .on(Method::POST, "/blog",      create_post);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics on a malformed or conflicting path. Routes are fixed at
    /// startup, so this surfaces on the first run.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl ErasedHandler for Router {
    fn call(&self, mut req: Request) -> BoxFuture<'static, Outcome> {
        match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.set_params(params);
                handler.call(req)
            }
            None => Box::pin(async { Ok(Response::detail(StatusCode::NOT_FOUND, "Not Found")) }),
        }
    }
}
