//! # Gateway Providers
//!
//! Backend adapters for the Bedrock gateway.
//!
//! The `bedrock` module serves uniform chat completions from the AWS Bedrock
//! runtime across its model families:
//! - Anthropic Claude
//! - Amazon Nova and Titan
//! - Meta Llama
//! - Mistral
//! - DeepSeek
//! - Cohere Command
//! - AI21 Jamba

#![forbid(unsafe_code)]
#![warn(missing_docs)]

#[cfg(feature = "bedrock")]
pub mod bedrock;

#[cfg(feature = "bedrock")]
pub use bedrock::{
    BackendInvoker, BedrockAdapter, BedrockConfig, BedrockRuntime, CapabilityMatrix,
    CapabilityRegistry, HttpBedrockRuntime, ModelEntry, ModelRegistry, ProviderFamily,
    UsageAccountant,
};
