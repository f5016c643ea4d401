//! Built-in health-check handlers.
//!
//! | Probe | Question |
//! |---|---|
//! | **Liveness** | Is the process alive? Failure → restart. |
//! | **Readiness** | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Both sit under a path listed in `public_path_prefixes` by default
//! (`/health`), so probes without credentials are not logged as
//! unauthenticated.
//!
//! ```rust,no_run
//! use tollgate::{Router, health};
//!
//! let app = Router::new()
//!     .get("/health", health::liveness)
//!     .get("/health/ready", health::readiness);
//! ```

use serde_json::json;

use crate::{Request, Response};

/// Always `200 OK` with `{"status":"healthy"}`. No dependencies.
pub async fn liveness(_req: Request) -> Response {
    Response::json_value(http::StatusCode::OK, &json!({ "status": "healthy" }))
}

/// Default readiness: `200 OK` with `{"status":"ready"}`. Replace it with
/// your own handler to gate on dependency health.
pub async fn readiness(_req: Request) -> Response {
    Response::json_value(http::StatusCode::OK, &json!({ "status": "ready" }))
}
