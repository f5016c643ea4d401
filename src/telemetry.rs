//! Structured logging.
//!
//! Two halves:
//!
//! - [`init`] installs the process-wide `tracing` subscriber once, from
//!   `main`. JSON for production, pretty output for local work. `RUST_LOG`
//!   wins over the configured level when set.
//! - [`Logger`] is the handle interceptors log through. Each interceptor is
//!   given one at construction and emits its events under the logger's
//!   span, so a test or an embedding service can route pipeline logs
//!   wherever it wants without touching global state.

use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::Error;

/// Output format of the log subscriber.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// The `[log]` section of the config file.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. `"info"` or `"tollgate=debug,hyper=warn"`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: LogFormat::Json }
    }
}

/// Installs the global subscriber.
///
/// Fails if the filter directive does not parse or a subscriber is already
/// installed.
pub fn init(config: &LogConfig) -> Result<(), Error> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| Error::Telemetry(format!("invalid log level `{}`: {e}", config.level)))?,
    };

    let layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_filter(filter).boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| Error::Telemetry(e.to_string()))
}

/// Injectable logging handle.
///
/// Wraps the span that a component's events are recorded under. Cloning is
/// cheap (a span handle is reference counted).
#[derive(Clone, Debug)]
pub struct Logger {
    span: Span,
}

impl Logger {
    /// A logger whose events carry `component = <name>`.
    pub fn new(component: &'static str) -> Self {
        Self { span: tracing::info_span!("tollgate", component) }
    }

    /// Wraps an existing span, e.g. one owned by the embedding service.
    pub fn from_span(span: Span) -> Self {
        Self { span }
    }

    /// A logger that records nothing beyond what the global subscriber
    /// sees at the call site. Handy in tests.
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    /// Child logger for one pipeline stage.
    pub fn child(&self, stage: &'static str) -> Self {
        Self { span: tracing::info_span!(parent: &self.span, "stage", stage) }
    }

    pub fn span(&self) -> &Span { &self.span }
}

impl Default for Logger {
    fn default() -> Self { Self::new("pipeline") }
}

/// Log capture for unit tests.
#[cfg(test)]
pub(crate) mod capture {
    use std::io;
    use std::sync::{Arc, Mutex};

    use serde_json::Value;
    use tracing::subscriber::DefaultGuard;

    /// Records every event emitted on the current thread, as JSON lines,
    /// until dropped. `#[tokio::test]` runs on one thread, so events from
    /// the awaited chain land here.
    pub(crate) struct Captured {
        buffer: Arc<Mutex<Vec<u8>>>,
        _guard: DefaultGuard,
    }

    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn logs() -> Captured {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || Sink(Arc::clone(&sink)))
            .finish();
        Captured { buffer, _guard: tracing::subscriber::set_default(subscriber) }
    }

    impl Captured {
        pub(crate) fn events(&self) -> Vec<Value> {
            let buffer = self.buffer.lock().unwrap();
            String::from_utf8_lossy(&buffer)
                .lines()
                .filter_map(|line| serde_json::from_str(line).ok())
                .collect()
        }

        /// Events logged with exactly `message`.
        pub(crate) fn with_message(&self, message: &str) -> Vec<Value> {
            self.events().into_iter().filter(|event| event["fields"]["message"] == message).collect()
        }
    }
}
