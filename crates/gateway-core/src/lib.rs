//! # Gateway Core
//!
//! Core types, traits, and error handling for the Bedrock gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - The uniform chat-completion request and reply
//! - Streaming chunks and SSE framing
//! - The provider trait
//! - The error taxonomy
//! - Validated domain types (newtypes)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod request;
pub mod response;
pub mod streaming;
pub mod types;

// Re-export commonly used types
pub use error::{ErrorCategory, GatewayError, GatewayResult, UnsupportedParam};
pub use provider::{ChatEventStream, HealthStatus, LLMProvider, ModelInfo, ProviderType};
pub use request::{
    ChatMessage, ContentPart, FunctionCall, FunctionDefinition, GatewayRequest, ImageUrl,
    MessageContent, MessageRole, ReasoningEffort, ResponseFormat, StopSequences, StreamOptions,
    ThinkingConfig, ToolCall, ToolChoice, ToolDefinition,
};
pub use response::{Choice, FinishReason, GatewayResponse, ResponseMessage, Usage};
pub use streaming::{
    ChatChunk, ChunkChoice, ChunkDelta, FunctionCallDelta, StreamEvent, ToolCallDelta,
    DONE_MARKER,
};
pub use types::{ModelId, RequestId, Temperature, TopK, TopP};
