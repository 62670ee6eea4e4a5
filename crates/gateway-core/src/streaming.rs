//! Streaming chunk types and SSE framing.

use crate::request::MessageRole;
use crate::response::{FinishReason, Usage};
use serde::{Deserialize, Serialize};

/// Literal end-of-stream marker payload
pub const DONE_MARKER: &str = "[DONE]";

/// One incremental chunk of a streamed reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Response id, stable across the whole stream
    pub id: String,
    /// Object type (always "chat.completion.chunk")
    pub object: String,
    /// Unix timestamp of the stream start
    pub created: i64,
    /// Model name
    pub model: String,
    /// Chunk choices (empty on the usage-only chunk)
    pub choices: Vec<ChunkChoice>,
    /// Usage totals, set on the usage chunk only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatChunk {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> ChatChunkBuilder {
        ChatChunkBuilder::default()
    }

    /// Delta of the first choice
    #[must_use]
    pub fn delta(&self) -> Option<&ChunkDelta> {
        self.choices.first().map(|choice| &choice.delta)
    }

    /// Finish reason of the first choice
    #[must_use]
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_ref())
    }
}

/// Builder for `ChatChunk`
#[derive(Debug, Default)]
pub struct ChatChunkBuilder {
    id: Option<String>,
    created: Option<i64>,
    model: Option<String>,
    choices: Vec<ChunkChoice>,
    usage: Option<Usage>,
}

impl ChatChunkBuilder {
    /// Set the id
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
    pub fn choice(mut self, choice: ChunkChoice) -> Self {
        self.choices.push(choice);
        self
    }

    /// Set usage
    #[must_use]
    pub fn usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Build the chunk
    #[must_use]
    pub fn build(self) -> ChatChunk {
        ChatChunk {
            id: self.id.unwrap_or_default(),
            object: "chat.completion.chunk".to_string(),
            created: self.created.unwrap_or_else(|| chrono::Utc::now().timestamp()),
            model: self.model.unwrap_or_default(),
            choices: self.choices,
            usage: self.usage,
        }
    }
}

/// A streamed choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index
    pub index: u32,
    /// Incremental delta
    pub delta: ChunkDelta,
    /// Set on the finishing chunk only
    pub finish_reason: Option<FinishReason>,
}

impl ChunkChoice {
    /// Choice 0 with the given delta
    #[must_use]
    pub fn new(delta: ChunkDelta, finish_reason: Option<FinishReason>) -> Self {
        Self {
            index: 0,
            delta,
            finish_reason,
        }
    }
}

/// Incremental message fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Role, sent on the first chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    /// Text fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reasoning fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    /// Tool-call fragments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

impl ChunkDelta {
    /// Whether the delta carries nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.content.is_none()
            && self.reasoning_content.is_none()
            && self.tool_calls.is_none()
    }
}

/// Fragment of a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the tool call within the message
    pub index: u32,
    /// Tool call id, on the first fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// "function", on the first fragment
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    /// Function name and argument fragment
    pub function: FunctionCallDelta,
}

/// Function part of a tool-call fragment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    /// Function name, on the first fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Argument JSON fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One item of the outbound stream
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A uniform chunk
    Chunk(ChatChunk),
    /// Terminal error object (`{"error": {...}}`)
    Error(serde_json::Value),
    /// End-of-stream marker
    Done,
}

impl StreamEvent {
    /// Render as a server-sent event frame
    #[must_use]
    pub fn to_sse(&self) -> String {
        let data = match self {
            Self::Chunk(chunk) => serde_json::to_string(chunk).unwrap_or_default(),
            Self::Error(body) => body.to_string(),
            Self::Done => DONE_MARKER.to_string(),
        };
        format!("data: {data}\n\n")
    }

    /// Whether this is the end marker
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Borrow the chunk, if any
    #[must_use]
    pub fn as_chunk(&self) -> Option<&ChatChunk> {
        match self {
            Self::Chunk(chunk) => Some(chunk),
            _ => None,
        }
    }
}
