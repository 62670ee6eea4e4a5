//! Integration tests for the Bedrock gateway
//!
//! These tests drive [`gateway_providers::BedrockAdapter`] over the real
//! SigV4 HTTP runtime against a wiremock Bedrock endpoint, or over a
//! scripted in-memory runtime, covering:
//! - Non-streaming completions per wire protocol
//! - Streaming accumulation, mid-stream failures and cancellation
//! - Health-aware cross-region fallback
//! - Configuration files feeding the adapter

pub mod fixtures;
pub mod helpers;
pub mod mock_bedrock;
pub mod scripted_backend;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;
pub use mock_bedrock::*;
pub use scripted_backend::*;

#[cfg(test)]
mod completion_tests;
#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod routing_tests;
#[cfg(test)]
mod streaming_tests;
