//! Anthropic Messages body for raw Claude invocations.

use super::{
    effective_max_tokens, normalize_stop, parse_arguments, split_system, thinking_budget,
    ConvertOptions,
};
use gateway_core::{
    ChatMessage, ContentPart, GatewayError, GatewayRequest, MessageContent, MessageRole,
    ToolChoice,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Bedrock's Anthropic API version tag
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Anthropic Messages request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaudeMessagesRequest {
    /// API version tag
    pub anthropic_version: &'static str,
    /// Output token bound
    pub max_tokens: u32,
    /// Alternating turns
    pub messages: Vec<ClaudeMessage>,
    /// System prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Non-empty stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ClaudeTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ClaudeToolChoice>,
    /// Extended thinking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<Value>,
}

/// One Claude turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaudeMessage {
    /// `user` or `assistant`
    pub role: &'static str,
    pub content: Vec<ClaudeContent>,
}

/// Claude content block
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeContent {
    Text {
        text: String,
    },
    Image {
        source: ClaudeImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

/// Base64 image source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaudeImageSource {
    /// Always `base64`
    #[serde(rename = "type")]
    pub source_type: &'static str,
    pub media_type: String,
    pub data: String,
}

/// Tool definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaudeTool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Tool choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeToolChoice {
    Auto,
    Any,
    Tool { name: String },
}

/// Build the Messages body
pub fn build(
    request: &GatewayRequest,
    options: &ConvertOptions,
) -> Result<ClaudeMessagesRequest, GatewayError> {
    let (system_texts, turns) = split_system(&request.messages);

    let mut messages: Vec<ClaudeMessage> = Vec::with_capacity(turns.len());
    for message in turns {
        let (role, blocks) = convert_message(message);
        if blocks.is_empty() {
            continue;
        }
        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => messages.push(ClaudeMessage {
                role,
                content: blocks,
            }),
        }
    }

    if messages.first().is_some_and(|m| m.role == "assistant") {
        return Err(GatewayError::validation(
            "Claude conversations must start with a user message",
            Some("messages".to_string()),
            "invalid_message_order",
        ));
    }

    let tools = request
        .tools
        .iter()
        .flatten()
        .map(|tool| ClaudeTool {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            input_schema: tool
                .function
                .parameters
                .clone()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
        })
        .collect();

    let thinking = thinking_budget(request)
        .map(|budget| json!({"type": "enabled", "budget_tokens": budget}));

    Ok(ClaudeMessagesRequest {
        anthropic_version: ANTHROPIC_VERSION,
        max_tokens: effective_max_tokens(request, options),
        messages,
        system: (!system_texts.is_empty()).then(|| system_texts.join("\n")),
        // Claude rejects temperature alongside extended thinking
        temperature: if thinking.is_some() {
            None
        } else {
            request.temperature
        },
        top_p: request.top_p,
        top_k: request.top_k,
        stop_sequences: normalize_stop(request.stop.as_ref()),
        tools,
        tool_choice: request.tool_choice.as_ref().and_then(tool_choice),
        thinking,
    })
}

fn convert_message(message: &ChatMessage) -> (&'static str, Vec<ClaudeContent>) {
    match message.role {
        MessageRole::Tool => (
            "user",
            vec![ClaudeContent::ToolResult {
                tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                content: message.text(),
            }],
        ),
        MessageRole::Assistant => {
            let mut blocks: Vec<ClaudeContent> = content_blocks(&message.content)
                .into_iter()
                .filter(|b| !matches!(b, ClaudeContent::Text { text } if text.trim().is_empty()))
                .collect();
            for call in message.tool_calls.iter().flatten() {
                blocks.push(ClaudeContent::ToolUse {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    input: parse_arguments(&call.function.arguments),
                });
            }
            ("assistant", blocks)
        }
        MessageRole::User | MessageRole::System => ("user", content_blocks(&message.content)),
    }
}

fn content_blocks(content: &MessageContent) -> Vec<ClaudeContent> {
    match content {
        MessageContent::Text(text) => vec![ClaudeContent::Text { text: text.clone() }],
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => ClaudeContent::Text { text: text.clone() },
                ContentPart::ImageUrl { image_url } => match image_url.parse_data_url() {
                    Some((media_type, data)) => ClaudeContent::Image {
                        source: ClaudeImageSource {
                            source_type: "base64",
                            media_type,
                            data,
                        },
                    },
                    None => ClaudeContent::Text {
                        text: format!("[Image: {}]", image_url.url),
                    },
                },
            })
            .collect(),
    }
}

fn tool_choice(choice: &ToolChoice) -> Option<ClaudeToolChoice> {
    match choice {
        ToolChoice::String(s) if s == "auto" => Some(ClaudeToolChoice::Auto),
        ToolChoice::String(s) if s == "required" || s == "any" => Some(ClaudeToolChoice::Any),
        ToolChoice::String(_) => None,
        ToolChoice::Tool { function, .. } => Some(ClaudeToolChoice::Tool {
            name: function.name.clone(),
        }),
    }
}
