//! Response types for the gateway.

use crate::request::{MessageRole, ToolCall};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Uniform (non-streaming) chat completion reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// Response identifier
    pub id: String,
    /// Object type (always "chat.completion")
    pub object: String,
    /// Unix timestamp of creation
    pub created: i64,
    /// Model that produced the reply, as the client named it
    pub model: String,
    /// Completion choices
    pub choices: Vec<Choice>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl GatewayResponse {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> GatewayResponseBuilder {
        GatewayResponseBuilder::default()
    }

    /// Text of the first choice
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }

    /// Finish reason of the first choice
    #[must_use]
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_ref())
    }
}

/// Builder for `GatewayResponse`
#[derive(Debug, Default)]
pub struct GatewayResponseBuilder {
    id: Option<String>,
    created: Option<i64>,
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

impl GatewayResponseBuilder {
    /// Set the response id
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the creation timestamp
    #[must_use]
    pub fn created(mut self, created: i64) -> Self {
        self.created = Some(created);
        self
    }

    /// Set the model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Add a choice
    #[must_use]
    pub fn choice(mut self, choice: Choice) -> Self {
        self.choices.push(choice);
        self
    }

    /// Set usage
    #[must_use]
    pub fn usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Build the response
    #[must_use]
    pub fn build(self) -> GatewayResponse {
        GatewayResponse {
            id: self
                .id
                .unwrap_or_else(|| format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())),
            object: "chat.completion".to_string(),
            created: self.created.unwrap_or_else(|| chrono::Utc::now().timestamp()),
            model: self.model.unwrap_or_default(),
            choices: self.choices,
            usage: self.usage,
        }
    }
}

/// A completion choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Choice index
    pub index: u32,
    /// Generated message
    pub message: ResponseMessage,
    /// Why generation stopped
    pub finish_reason: Option<FinishReason>,
}

impl Choice {
    /// Single choice at index 0
    #[must_use]
    pub fn new(message: ResponseMessage, finish_reason: Option<FinishReason>) -> Self {
        Self {
            index: 0,
            message,
            finish_reason,
        }
    }
}

/// Assistant message in a reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Always assistant
    pub role: MessageRole,
    /// Text body; empty (never null) when the backend returned no text
    pub content: Option<String>,
    /// Reasoning text, surfaced separately from the answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    /// Tool calls requested by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ResponseMessage {
    /// Assistant message with text
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            reasoning_content: None,
            tool_calls: None,
        }
    }

    /// Attach reasoning text (ignored when empty)
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        let reasoning = reasoning.into();
        if !reasoning.is_empty() {
            self.reasoning_content = Some(reasoning);
        }
        self
    }

    /// Attach tool calls (ignored when empty)
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        if !tool_calls.is_empty() {
            self.tool_calls = Some(tool_calls);
        }
        self
    }
}

/// Uniform finish reason.
///
/// Known backend codes translate to the four OpenAI values; anything else is
/// carried verbatim in [`FinishReason::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FinishReason {
    /// Natural end of turn or stop sequence hit
    Stop,
    /// Token limit reached
    Length,
    /// The model asked for tool calls
    ToolCalls,
    /// Output was filtered
    ContentFilter,
    /// Backend-specific code passed through unchanged
    Other(String),
}

impl FinishReason {
    /// Wire string
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
            Self::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FinishReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FinishReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "tool_calls" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            _ => Self::Other(raw),
        })
    }
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens
    pub prompt_tokens: u32,
    /// Output tokens
    pub completion_tokens: u32,
    /// Sum of both
    pub total_tokens: u32,
}

impl Usage {
    /// Usage with a computed total
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Usage as reported by a backend; the total is derived only when omitted
    #[must_use]
    pub fn from_reported(prompt_tokens: u32, completion_tokens: u32, total: Option<u32>) -> Self {
        match total {
            Some(total_tokens) => Self {
                prompt_tokens,
                completion_tokens,
                total_tokens,
            },
            None => Self::new(prompt_tokens, completion_tokens),
        }
    }
}
