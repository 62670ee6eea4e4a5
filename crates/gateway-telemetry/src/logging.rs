//! Structured log output.
//!
//! Logs go to stderr so stdout stays free for completion output. `RUST_LOG`
//! overrides the configured level when set.

use crate::tracing_setup::TracingError;
use std::fmt;
use tracing_subscriber::{
    fmt as fmt_layer, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line, span fields included
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level or `EnvFilter` directive (e.g. `info,gateway_providers=debug`)
    pub level: String,
    /// Line format
    pub format: LogFormat,
    /// Include the event target
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Config at a level
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// Set the format
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Filter from `RUST_LOG`, falling back to the configured level
    pub fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level)
            .map_err(|e| TracingError::Init(format!("invalid log level '{}': {e}", self.level)))
    }

    /// Formatting layer for this config, writing to stderr
    pub fn fmt_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        let layer = fmt_layer::layer()
            .with_writer(std::io::stderr)
            .with_target(self.with_target);
        match self.format {
            LogFormat::Pretty => layer.boxed(),
            LogFormat::Json => layer.json().with_current_span(true).boxed(),
        }
    }
}

/// Install the global subscriber with log output only
pub fn init_logging(config: &LoggingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;
    tracing_subscriber::registry()
        .with(config.fmt_layer().with_filter(filter))
        .try_init()
        .map_err(|e| TracingError::Init(e.to_string()))
}
