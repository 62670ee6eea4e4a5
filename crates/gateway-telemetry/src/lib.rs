//! # Gateway Telemetry
//!
//! Logging and tracing for the Bedrock gateway.
//!
//! This crate provides:
//! - Structured log output (pretty or JSON) filtered by `EnvFilter`
//! - Distributed tracing with OpenTelemetry
//! - Span macros for requests and backend calls

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod tracing_setup;

// Re-export main types
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use tracing_setup::{init_tracing, shutdown_tracing, TracingConfig, TracingError};
