//! Bedrock Converse API request shape.

use super::{
    effective_max_tokens, normalize_stop, parse_arguments, split_system, thinking_budget,
    tools_disabled, ConvertOptions,
};
use crate::bedrock::family::{ProviderFamily, ToolTransport};
use gateway_core::{
    ChatMessage, ContentPart, GatewayError, GatewayRequest, MessageContent, MessageRole,
    ToolChoice, ToolDefinition,
};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Converse request body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
    /// Family the body was shaped for
    #[serde(skip)]
    pub family: ProviderFamily,
    /// Alternating user/assistant turns
    pub messages: Vec<ConverseMessage>,
    /// System slot
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<SystemBlock>,
    /// Inference knobs
    pub inference_config: InferenceConfig,
    /// Tool definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
    /// Model-specific fields Converse passes through
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_model_request_fields: Option<Value>,
}

impl ConverseRequest {
    /// Role names of the turns, in order
    #[must_use]
    pub fn roles(&self) -> Vec<&'static str> {
        self.messages.iter().map(|m| m.role.as_str()).collect()
    }
}

/// Converse turn role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverseRole {
    /// User turn (also carries tool results)
    User,
    /// Assistant turn
    Assistant,
}

impl ConverseRole {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One Converse turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConverseMessage {
    /// Turn role
    pub role: ConverseRole,
    /// Content blocks
    pub content: Vec<ContentBlock>,
}

/// Converse content block
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlock {
    /// Text
    Text(String),
    /// Inline image
    Image(ImageBlock),
    /// Tool call made by the assistant
    ToolUse(ToolUseBlock),
    /// Result of a tool call
    ToolResult(ToolResultBlock),
}

/// Inline image block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageBlock {
    /// `png`, `jpeg`, `gif` or `webp`
    pub format: String,
    /// Image bytes
    pub source: ImageSource,
}

/// Image bytes, base64
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageSource {
    /// Base64 payload
    pub bytes: String,
}

/// Assistant tool call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseBlock {
    /// Tool call id, shared with the matching result
    pub tool_use_id: String,
    /// Tool name
    pub name: String,
    /// Arguments object
    pub input: Value,
}

/// Tool result keyed by the call id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultBlock {
    /// Id of the tool call this answers
    pub tool_use_id: String,
    /// Result content
    pub content: Vec<ToolResultContent>,
}

/// Tool result content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolResultContent {
    /// Plain text result
    Text(String),
}

/// System slot block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SystemBlock {
    /// System text
    Text(String),
}

/// Converse inference knobs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    /// Output token bound, always positive
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Non-empty stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Converse tool configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// Tool specs
    pub tools: Vec<ConverseTool>,
    /// Tool choice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ConverseToolChoice>,
}

/// Tool wrapper
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConverseTool {
    /// Function-style tool
    ToolSpec(ToolSpec),
}

/// Tool specification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    /// Tool name
    pub name: String,
    /// Tool description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parameter schema
    pub input_schema: InputSchema,
}

/// JSON schema wrapper
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSchema {
    /// The schema, verbatim
    pub json: Value,
}

/// Converse tool choice
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConverseToolChoice {
    /// Model decides
    Auto(Map<String, Value>),
    /// Model must call some tool
    Any(Map<String, Value>),
    /// Model must call this tool
    Tool(ToolName),
}

/// Named tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolName {
    /// Tool name
    pub name: String,
}

/// Build a Converse request for the family
pub fn build(
    request: &GatewayRequest,
    family: ProviderFamily,
    options: &ConvertOptions,
) -> Result<ConverseRequest, GatewayError> {
    let (system_texts, turns) = split_system(&request.messages);
    let mut messages = convert_messages(&turns);

    let system = if family.supports_system_slot() {
        system_texts.into_iter().map(SystemBlock::Text).collect()
    } else {
        fold_system_into_first_user(&mut messages, &system_texts);
        Vec::new()
    };

    let tool_config = match family.tool_transport() {
        ToolTransport::Unsupported => None,
        _ if tools_disabled(request) => None,
        _ => request
            .tools
            .as_deref()
            .filter(|tools| !tools.is_empty())
            .map(|tools| ToolConfig {
                tools: tools.iter().map(tool_spec).collect(),
                tool_choice: request.tool_choice.as_ref().and_then(tool_choice),
            }),
    };

    Ok(ConverseRequest {
        family,
        messages,
        system,
        inference_config: InferenceConfig {
            max_tokens: effective_max_tokens(request, options),
            temperature: request.temperature,
            top_p: request.top_p,
            stop_sequences: normalize_stop(request.stop.as_ref()),
        },
        tool_config,
        additional_model_request_fields: additional_fields(request, family),
    })
}

/// Turn-taking messages in Converse form, consecutive roles merged
pub fn convert_messages(turns: &[&ChatMessage]) -> Vec<ConverseMessage> {
    let mut out: Vec<ConverseMessage> = Vec::with_capacity(turns.len());

    for message in turns {
        let (role, blocks) = match message.role {
            MessageRole::User | MessageRole::System => {
                (ConverseRole::User, content_blocks(&message.content))
            }
            MessageRole::Tool => (
                ConverseRole::User,
                vec![ContentBlock::ToolResult(ToolResultBlock {
                    tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: vec![ToolResultContent::Text(message.text())],
                })],
            ),
            MessageRole::Assistant => {
                let mut blocks: Vec<ContentBlock> = content_blocks(&message.content)
                    .into_iter()
                    .filter(|b| !matches!(b, ContentBlock::Text(t) if t.trim().is_empty()))
                    .collect();
                for call in message.tool_calls.iter().flatten() {
                    blocks.push(ContentBlock::ToolUse(ToolUseBlock {
                        tool_use_id: call.id.clone(),
                        name: call.function.name.clone(),
                        input: parse_arguments(&call.function.arguments),
                    }));
                }
                (ConverseRole::Assistant, blocks)
            }
        };

        if blocks.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => out.push(ConverseMessage {
                role,
                content: blocks,
            }),
        }
    }

    out
}

fn content_blocks(content: &MessageContent) -> Vec<ContentBlock> {
    match content {
        MessageContent::Text(text) => vec![ContentBlock::Text(text.clone())],
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => ContentBlock::Text(text.clone()),
                ContentPart::ImageUrl { image_url } => match image_url.parse_data_url() {
                    Some((media_type, data)) => ContentBlock::Image(ImageBlock {
                        format: image_format(&media_type),
                        source: ImageSource { bytes: data },
                    }),
                    None => ContentBlock::Text(format!("[Image: {}]", image_url.url)),
                },
            })
            .collect(),
    }
}

fn image_format(media_type: &str) -> String {
    let subtype = media_type.rsplit('/').next().unwrap_or(media_type);
    match subtype {
        "jpg" => "jpeg".to_string(),
        other => other.to_string(),
    }
}

fn fold_system_into_first_user(messages: &mut [ConverseMessage], system_texts: &[String]) {
    if system_texts.is_empty() {
        return;
    }
    let preamble = system_texts.join("\n");
    if let Some(first_user) = messages.iter_mut().find(|m| m.role == ConverseRole::User) {
        first_user
            .content
            .insert(0, ContentBlock::Text(format!("{preamble}\n\n")));
    }
}

fn tool_spec(tool: &ToolDefinition) -> ConverseTool {
    ConverseTool::ToolSpec(ToolSpec {
        name: tool.function.name.clone(),
        description: tool.function.description.clone(),
        input_schema: InputSchema {
            json: tool
                .function
                .parameters
                .clone()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
        },
    })
}

fn tool_choice(choice: &ToolChoice) -> Option<ConverseToolChoice> {
    match choice {
        ToolChoice::String(s) if s == "auto" => Some(ConverseToolChoice::Auto(Map::new())),
        ToolChoice::String(s) if s == "required" || s == "any" => {
            Some(ConverseToolChoice::Any(Map::new()))
        }
        ToolChoice::String(_) => None,
        ToolChoice::Tool { function, .. } => Some(ConverseToolChoice::Tool(ToolName {
            name: function.name.clone(),
        })),
    }
}

fn additional_fields(request: &GatewayRequest, family: ProviderFamily) -> Option<Value> {
    let mut fields = Map::new();
    match family {
        ProviderFamily::Claude => {
            if let Some(budget) = thinking_budget(request) {
                fields.insert(
                    "thinking".to_string(),
                    json!({"type": "enabled", "budget_tokens": budget}),
                );
            }
            if let Some(top_k) = request.top_k {
                fields.insert("top_k".to_string(), json!(top_k));
            }
        }
        ProviderFamily::Nova => {
            if let Some(top_k) = request.top_k {
                fields.insert("inferenceConfig".to_string(), json!({"topK": top_k}));
            }
        }
        _ => {}
    }
    (!fields.is_empty()).then_some(Value::Object(fields))
}
