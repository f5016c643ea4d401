//! Per-request state threaded through the interceptor chain.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

/// Opaque per-request token used to correlate log lines with responses.
///
/// Random (UUID v4): 122 bits of entropy, so collisions between live
/// requests are not a practical concern.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

/// The rate-limit key for a caller.
///
/// Derived from the remote IP. Callers whose address is unavailable all
/// share the single key `"unknown"`, and therefore one rate-limit budget.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ClientIdentity(Arc<str>);

impl ClientIdentity {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    /// IP of the peer, without the port: two connections from one host
    /// share a budget.
    pub fn from_remote(remote: Option<SocketAddr>) -> Self {
        match remote {
            Some(addr) => Self::new(addr.ip().to_string()),
            None => Self::unknown(),
        }
    }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn is_unknown(&self) -> bool { &*self.0 == Self::UNKNOWN }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State owned by one in-flight request.
///
/// Created by the pipeline at entry and handed down the chain as
/// `&mut RequestContext`. Client identity and arrival time are fixed at
/// construction; the correlation id is assigned once, by the trace
/// interceptor.
#[derive(Clone, Debug)]
pub struct RequestContext {
    correlation_id: Option<CorrelationId>,
    client: ClientIdentity,
    arrival: Instant,
}

impl RequestContext {
    pub fn new(client: ClientIdentity, arrival: Instant) -> Self {
        Self { correlation_id: None, client, arrival }
    }

    /// Assigns the correlation id if none is set yet and returns the id in
    /// effect. A second call leaves the first id in place.
    pub fn assign_correlation_id(&mut self, id: CorrelationId) -> CorrelationId {
        *self.correlation_id.get_or_insert(id)
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> { self.correlation_id }
    pub fn client(&self) -> &ClientIdentity { &self.client }
    pub fn arrival(&self) -> Instant { self.arrival }
}
