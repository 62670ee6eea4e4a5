//! OpenTelemetry tracing setup and request spans.
//!
//! [`init_tracing`] installs the log layer from [`LoggingConfig`] plus an
//! OpenTelemetry layer, so `bedrock_request` and `backend_call` spans are
//! exported as traces.

use crate::logging::LoggingConfig;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::{
    trace::{Config, RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::collections::HashMap;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Enable the OpenTelemetry layer
    pub enabled: bool,
    /// Service name
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (dev, staging, prod)
    pub environment: String,
    /// Sampling rate (0.0 - 1.0)
    pub sampling_rate: f64,
    /// Additional resource attributes
    pub attributes: HashMap<String, String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "bedrock-gateway".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            sampling_rate: 1.0,
            attributes: HashMap::new(),
        }
    }
}

impl TracingConfig {
    /// Create a new tracing configuration
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the environment
    #[must_use]
    pub fn with_environment(mut self, env: impl Into<String>) -> Self {
        self.environment = env.into();
        self
    }

    /// Set the sampling rate
    #[must_use]
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Add a resource attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    fn sampler(&self) -> Sampler {
        if self.sampling_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.sampling_rate <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.sampling_rate)
        }
    }

    fn resource(&self) -> Resource {
        let mut attributes = vec![
            opentelemetry::KeyValue::new("service.name", self.service_name.clone()),
            opentelemetry::KeyValue::new("service.version", self.service_version.clone()),
            opentelemetry::KeyValue::new("deployment.environment", self.environment.clone()),
        ];
        attributes.extend(
            self.attributes
                .iter()
                .map(|(k, v)| opentelemetry::KeyValue::new(k.clone(), v.clone())),
        );
        Resource::new(attributes)
    }
}

/// Install the global subscriber with log output and, when enabled, an
/// OpenTelemetry layer. Returns the tracer provider to shut down on exit.
///
/// # Errors
/// Returns error if a subscriber is already installed or the log level is invalid
pub fn init_tracing(
    config: &TracingConfig,
    logging: &LoggingConfig,
) -> Result<Option<TracerProvider>, TracingError> {
    let filter = logging.env_filter()?;

    if !config.enabled {
        tracing_subscriber::registry()
            .with(logging.fmt_layer().with_filter(filter))
            .try_init()
            .map_err(|e| TracingError::Init(e.to_string()))?;
        return Ok(None);
    }

    let tracer_config = Config::default()
        .with_sampler(config.sampler())
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(config.resource());

    let provider = TracerProvider::builder().with_config(tracer_config).build();
    let tracer = provider.tracer(config.service_name.clone());
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(logging.fmt_layer().with_filter(filter))
        .try_init()
        .map_err(|e| TracingError::Init(e.to_string()))?;

    info!(
        service = %config.service_name,
        environment = %config.environment,
        sampling_rate = config.sampling_rate,
        "Tracing initialized"
    );

    Ok(Some(provider))
}

/// Shutdown tracing and flush remaining spans
pub fn shutdown_tracing(provider: Option<TracerProvider>) {
    if let Some(provider) = provider {
        drop(provider);
        info!("Tracing shutdown complete");
    }
}

/// Telemetry initialization error
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    /// Failed to initialize the subscriber
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

/// Span for one uniform request
#[macro_export]
macro_rules! llm_request_span {
    ($request_id:expr, $model:expr, $family:expr, $stream:expr) => {
        tracing::info_span!(
            "bedrock_request",
            request_id = %$request_id,
            model = %$model,
            family = %$family,
            stream = $stream,
            otel.kind = "server"
        )
    };
}

/// Span for one backend call
#[macro_export]
macro_rules! provider_span {
    ($step:expr, $model_id:expr) => {
        tracing::info_span!(
            "backend_call",
            step = %$step,
            model_id = %$model_id,
            otel.kind = "client"
        )
    };
}
