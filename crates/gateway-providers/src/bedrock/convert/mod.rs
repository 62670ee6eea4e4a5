//! Uniform request to provider-native request conversion.
//!
//! The converter picks one [`ProviderRequest`] variant per request. The
//! Converse shape serves every chat family; the raw-invocation shapes are
//! used only when the request carries tools and the family's
//! [`ToolTransport`] says Converse cannot carry them.

pub mod claude;
pub mod converse;
pub mod llama;
pub mod mistral;

use super::family::{LlamaGeneration, ProviderFamily, ToolTransport};
use super::registry::ModelEntry;
use gateway_core::{
    ChatMessage, GatewayError, GatewayRequest, MessageRole, ReasoningEffort, StopSequences,
};
use serde_json::Value;

pub use claude::ClaudeMessagesRequest;
pub use converse::ConverseRequest;
pub use llama::LlamaPromptRequest;
pub use mistral::MistralChatRequest;

/// Library-wide default for `max_tokens`
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Thinking budget for `reasoning_effort: low`
pub const THINKING_BUDGET_LOW: u32 = 1024;
/// Thinking budget for `reasoning_effort: medium`
pub const THINKING_BUDGET_MEDIUM: u32 = 4096;
/// Thinking budget for `reasoning_effort: high`
pub const THINKING_BUDGET_HIGH: u32 = 16384;

/// Conversion settings
#[derive(Debug, Clone, Copy)]
pub struct ConvertOptions {
    /// Used when the caller omits `max_tokens` or sends zero
    pub default_max_tokens: u32,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            default_max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Backend call shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// Unified turn-based call (`converse` / `converse-stream`)
    Converse,
    /// Raw model invocation (`invoke` / `invoke-with-response-stream`)
    InvokeModel,
}

/// Provider-native request, built once per call
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderRequest {
    /// Converse API request (any chat family)
    Converse(ConverseRequest),
    /// Anthropic Messages body for Claude tool calls
    ClaudeMessages(ClaudeMessagesRequest),
    /// Llama prompt body for Llama tool calls
    LlamaPrompt(LlamaPromptRequest),
    /// Mistral chat body for Mistral tool calls
    MistralChat(MistralChatRequest),
}

impl ProviderRequest {
    /// Family the request was built for
    #[must_use]
    pub fn family(&self) -> ProviderFamily {
        match self {
            Self::Converse(r) => r.family,
            Self::ClaudeMessages(_) => ProviderFamily::Claude,
            Self::LlamaPrompt(_) => ProviderFamily::Llama,
            Self::MistralChat(_) => ProviderFamily::Mistral,
        }
    }

    /// Backend call shape
    #[must_use]
    pub fn call_shape(&self) -> CallShape {
        match self {
            Self::Converse(_) => CallShape::Converse,
            _ => CallShape::InvokeModel,
        }
    }

    /// Effective `max_tokens`
    #[must_use]
    pub fn max_tokens(&self) -> u32 {
        match self {
            Self::Converse(r) => r.inference_config.max_tokens,
            Self::ClaudeMessages(r) => r.max_tokens,
            Self::LlamaPrompt(r) => r.max_gen_len,
            Self::MistralChat(r) => r.max_tokens,
        }
    }

    /// Normalized stop sequences
    #[must_use]
    pub fn stop_sequences(&self) -> Option<&[String]> {
        match self {
            Self::Converse(r) => r.inference_config.stop_sequences.as_deref(),
            Self::ClaudeMessages(r) => r.stop_sequences.as_deref(),
            Self::LlamaPrompt(r) => r.stop.as_deref(),
            Self::MistralChat(r) => r.stop.as_deref(),
        }
    }

    /// Stop sequences the backend cannot apply, cut from the completion
    /// after it arrives
    #[must_use]
    pub fn local_stop_sequences(&self) -> &[String] {
        match self {
            Self::LlamaPrompt(r) => r.stop.as_deref().unwrap_or_default(),
            _ => &[],
        }
    }

    /// Wire body
    pub fn to_body(&self) -> Result<Value, GatewayError> {
        let body = match self {
            Self::Converse(r) => serde_json::to_value(r),
            Self::ClaudeMessages(r) => serde_json::to_value(r),
            Self::LlamaPrompt(r) => serde_json::to_value(r),
            Self::MistralChat(r) => serde_json::to_value(r),
        };
        body.map_err(|e| {
            GatewayError::internal(format!("Failed to serialize Bedrock request: {e}"))
        })
    }
}

/// Convert a uniform request for the resolved model
pub fn to_provider_request(
    request: &GatewayRequest,
    entry: &ModelEntry,
    options: &ConvertOptions,
) -> Result<ProviderRequest, GatewayError> {
    if !entry.family.is_chat() {
        return Err(GatewayError::unsupported_operation(
            &entry.public_name,
            "chat completions",
        ));
    }

    let raw_invoke = request.has_tools()
        && entry.family.tool_transport() == ToolTransport::InvokeModel
        && !tools_disabled(request);

    if !raw_invoke {
        return converse::build(request, entry.family, options).map(ProviderRequest::Converse);
    }

    match entry.family {
        ProviderFamily::Claude => {
            claude::build(request, options).map(ProviderRequest::ClaudeMessages)
        }
        ProviderFamily::Llama => {
            let generation = LlamaGeneration::from_model_id(&entry.backend_id);
            Ok(ProviderRequest::LlamaPrompt(llama::build(
                request, generation, options,
            )))
        }
        ProviderFamily::Mistral => {
            mistral::build(request, options).map(ProviderRequest::MistralChat)
        }
        other => converse::build(request, other, options).map(ProviderRequest::Converse),
    }
}

/// `tool_choice: "none"` switches tools off for the turn
pub(crate) fn tools_disabled(request: &GatewayRequest) -> bool {
    matches!(&request.tool_choice, Some(gateway_core::ToolChoice::String(s)) if s == "none")
}

/// Non-empty stop strings
pub(crate) fn normalize_stop(stop: Option<&StopSequences>) -> Option<Vec<String>> {
    stop.and_then(StopSequences::normalized)
}

/// `max_tokens` with zero and absence replaced by the default
pub(crate) fn effective_max_tokens(request: &GatewayRequest, options: &ConvertOptions) -> u32 {
    match request.max_tokens {
        Some(value) if value > 0 => value,
        _ => options.default_max_tokens,
    }
}

/// Thinking budget requested through `thinking` or `reasoning_effort`
pub(crate) fn thinking_budget(request: &GatewayRequest) -> Option<u32> {
    if let Some(thinking) = &request.thinking {
        if !thinking.is_enabled() {
            return None;
        }
        return Some(thinking.budget_tokens.unwrap_or(THINKING_BUDGET_MEDIUM));
    }
    request.reasoning_effort.map(|effort| match effort {
        ReasoningEffort::Low => THINKING_BUDGET_LOW,
        ReasoningEffort::Medium => THINKING_BUDGET_MEDIUM,
        ReasoningEffort::High => THINKING_BUDGET_HIGH,
    })
}

/// System texts, in order, and the remaining turn-taking messages
pub(crate) fn split_system(messages: &[ChatMessage]) -> (Vec<String>, Vec<&ChatMessage>) {
    let mut system = Vec::new();
    let mut turns = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role == MessageRole::System {
            let text = message.text();
            if !text.is_empty() {
                system.push(text);
            }
        } else {
            turns.push(message);
        }
    }
    (system, turns)
}

/// Parse tool-call arguments into a JSON object
pub(crate) fn parse_arguments(arguments: &str) -> Value {
    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => value,
        _ if arguments.trim().is_empty() => Value::Object(serde_json::Map::new()),
        _ => serde_json::json!({ "input": arguments }),
    }
}
