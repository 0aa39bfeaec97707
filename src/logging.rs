//! Subscriber setup for the crate's `tracing` events
//!
//! The engine emits events under the `tiered_injector` target:
//!
//! | Level   | Events                                                        |
//! |---------|---------------------------------------------------------------|
//! | `debug` | registrations, container build, scope open/dispose, compiles  |
//! | `trace` | call-site construction, every resolution and its executor     |
//! | `warn`  | disposal failures on drop, validation failures                |
//!
//! Applications that already install a subscriber need nothing from this
//! module. The helpers here are for binaries and examples that don't.
//!
//! # Features
//!
//! - `logging` - emit events (default)
//! - `logging-json` - JSON subscriber output
//! - `logging-pretty` - human-readable subscriber output
//!
//! # Example
//!
//! ```rust,ignore
//! use tiered_injector::logging;
//!
//! logging::builder()
//!     .trace()
//!     .injector_only()
//!     .compact()
//!     .with_thread_names()
//!     .init();
//! ```

#[cfg(feature = "logging")]
use tracing::Level;

/// Target used by every event this crate emits
pub const TARGET: &str = "tiered_injector";

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-line, colored
    Pretty,
    /// Single line per event
    Compact,
}

/// Subscriber configuration
#[cfg(feature = "logging")]
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    from_env: bool,
    with_file: bool,
    with_line_number: bool,
    with_thread_names: bool,
}

#[cfg(feature = "logging")]
impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::default(),
            target: None,
            from_env: true,
            with_file: false,
            with_line_number: false,
            with_thread_names: false,
        }
    }
}

#[cfg(feature = "logging")]
impl LoggingBuilder {
    /// Start from the defaults: DEBUG, JSON, `RUST_LOG` honoured
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Include per-resolution events
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    /// Registrations and scope lifecycle only
    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    /// Only warnings and errors
    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    /// Restrict output to one target
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show this crate's events
    pub fn injector_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Ignore `RUST_LOG` and use the configured level and target only
    pub fn ignore_env(mut self) -> Self {
        self.from_env = false;
        self
    }

    /// Include source file names
    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    /// Include line numbers
    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    /// Include thread names, which shows the background compiler thread
    pub fn with_thread_names(mut self) -> Self {
        self.with_thread_names = true;
        self
    }

    /// JSON output
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Pretty output
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Compact output
    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Filter directive for the configured level and target
    pub fn directive(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        match self.target {
            Some(target) => format!("{target}={level}"),
            None => level,
        }
    }

    /// Install the subscriber globally.
    ///
    /// Fails if a global subscriber is already set.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn try_init(self) -> Result<(), crate::BoxError> {
        use tracing_subscriber::util::SubscriberInitExt;
        use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt};

        let filter = if self.from_env {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
        } else {
            EnvFilter::new(self.directive())
        };

        let base = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_thread_names(self.with_thread_names)
            .with_target(true);

        let layer = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => base.json().boxed(),
            // Without the json feature, JSON falls back to the default text format.
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => base.boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().boxed(),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .map_err(Into::into)
    }

    /// No subscriber backend is compiled in.
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn try_init(self) -> Result<(), crate::BoxError> {
        Err("enable the logging-json or logging-pretty feature to install a subscriber".into())
    }

    /// Install the subscriber, ignoring "already installed" and missing-backend errors.
    pub fn init(self) {
        let _ = self.try_init();
    }
}

/// Create a new logging builder
#[cfg(feature = "logging")]
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Install a subscriber with default settings.
///
/// JSON when `logging-json` is enabled, pretty otherwise.
#[cfg(feature = "logging")]
pub fn init() {
    #[cfg(feature = "logging-json")]
    builder().json().init();

    #[cfg(not(feature = "logging-json"))]
    builder().pretty().init();
}

/// Install a pretty subscriber showing only this crate's events at TRACE.
#[cfg(feature = "logging")]
pub fn init_injector_trace() {
    builder().pretty().trace().injector_only().with_thread_names().init();
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = LoggingBuilder::default();
        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Json);
        assert!(builder.from_env);
        assert_eq!(builder.directive(), "debug");
    }

    #[test]
    fn test_builder_chain() {
        let builder = LoggingBuilder::new()
            .trace()
            .compact()
            .with_thread_names()
            .ignore_env()
            .injector_only();

        assert_eq!(builder.format, LogFormat::Compact);
        assert!(builder.with_thread_names);
        assert!(!builder.from_env);
        assert_eq!(builder.directive(), "tiered_injector=trace");
    }
}
