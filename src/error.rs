//! Error types.
//!
//! Two families live here and they never mix:
//!
//! - [`Error`] and [`ConfigError`] are infrastructure failures: binding a
//!   port, reading a config file, installing the log subscriber. They are
//!   fatal at startup and surface through `main`.
//! - [`Fault`] is an *unhandled* failure inside a request: a terminal
//!   handler returning `Err`, or anything panicking inside the chain. It
//!   travels up the pipeline as the `Err` side of an [`Outcome`] until the
//!   [`Recover`](crate::middleware::Recover) interceptor turns it into a `500`.
//!
//! Expected rejections (429, 413, 400) are not errors at all. They are plain
//! [`Response`] values returned by the interceptor that decided to stop.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::response::Response;

/// The result of running a request through the pipeline, or any part of it.
pub type Outcome = Result<Response, Fault>;

/// Boxed upstream error carried inside a [`Fault`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Infrastructure failures returned by tollgate's fallible setup operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    Addr(String),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("telemetry: {0}")]
    Telemetry(String),
}

/// Why a [`PipelineConfig`](crate::config::PipelineConfig) was refused.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {}", join(.0))]
    Invalid(Vec<ValidationError>),
}

/// A single semantic problem found by
/// [`PipelineConfig::validate`](crate::config::PipelineConfig::validate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

// ── Fault ────────────────────────────────────────────────────────────────────

/// Where an unhandled fault came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The terminal handler returned an error.
    Handler,
    /// An interceptor gave up on the request.
    Interceptor,
    /// Something inside the chain panicked.
    Panic,
}

impl FaultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handler     => "handler",
            Self::Interceptor => "interceptor",
            Self::Panic       => "panic",
        }
    }
}

/// An unhandled failure travelling up the interceptor chain.
#[derive(Debug)]
pub struct Fault {
    kind: FaultKind,
    message: String,
    source: Option<BoxError>,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    /// A fault raised by a terminal handler.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Handler, message)
    }

    /// A fault raised by an interceptor.
    pub fn interceptor(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Interceptor, message)
    }

    /// Builds a fault from a caught panic payload.
    ///
    /// `panic!("...")` payloads are `&'static str` or `String`; anything else
    /// gets a placeholder message.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_owned()
        };
        Self::new(FaultKind::Panic, message)
    }

    /// Attaches the upstream error that caused this fault.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> FaultKind { self.kind }
    pub fn message(&self) -> &str { &self.message }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fault: {}", self.kind.as_str(), self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Handlers can bubble any error with `?`; it becomes a handler fault whose
/// message is the error's `Display` output.
impl From<BoxError> for Fault {
    fn from(e: BoxError) -> Self {
        Self::handler(e.to_string()).with_source(e)
    }
}

impl From<std::io::Error> for Fault {
    fn from(e: std::io::Error) -> Self {
        Self::handler(e.to_string()).with_source(e)
    }
}

impl From<serde_json::Error> for Fault {
    fn from(e: serde_json::Error) -> Self {
        Self::handler(e.to_string()).with_source(e)
    }
}
