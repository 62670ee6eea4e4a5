//! Mistral chat body for raw Mistral invocations.

use super::{effective_max_tokens, normalize_stop, split_system, ConvertOptions};
use gateway_core::{
    ChatMessage, GatewayError, GatewayRequest, MessageRole, ToolChoice, ToolDefinition,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Mistral chat request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MistralChatRequest {
    pub messages: Vec<MistralMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    /// `auto`, `any` or `none`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Non-empty stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Mistral chat message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MistralMessage {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl MistralMessage {
    fn new(role: &'static str, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Build the chat body
pub fn build(
    request: &GatewayRequest,
    options: &ConvertOptions,
) -> Result<MistralChatRequest, GatewayError> {
    let (system_texts, turns) = split_system(&request.messages);

    let mut messages = Vec::with_capacity(turns.len() + 1);
    if !system_texts.is_empty() {
        messages.push(MistralMessage::new("system", system_texts.join("\n")));
    }
    messages.extend(turns.into_iter().map(convert_message));

    let all_tools = request.tools.as_deref().unwrap_or_default();
    let (tools, tool_choice) = match &request.tool_choice {
        None => (all_tools.iter().collect::<Vec<_>>(), None),
        Some(ToolChoice::String(s)) => (
            all_tools.iter().collect(),
            match s.as_str() {
                "auto" => Some("auto"),
                "required" | "any" => Some("any"),
                "none" => Some("none"),
                _ => None,
            },
        ),
        // A named choice narrows the tool list and forces a call
        Some(ToolChoice::Tool { function, .. }) => {
            let selected: Vec<&ToolDefinition> = all_tools
                .iter()
                .filter(|t| t.function.name == function.name)
                .collect();
            if selected.is_empty() {
                return Err(GatewayError::validation(
                    format!("tool_choice names unknown tool '{}'", function.name),
                    Some("tool_choice".to_string()),
                    "invalid_tool_choice",
                ));
            }
            (selected, Some("any"))
        }
    };

    Ok(MistralChatRequest {
        messages,
        tools: tools
            .into_iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.function.name,
                        "description": tool.function.description,
                        "parameters": tool.function.parameters.clone()
                            .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                    }
                })
            })
            .collect(),
        tool_choice,
        max_tokens: effective_max_tokens(request, options),
        temperature: request.temperature,
        top_p: request.top_p,
        stop: normalize_stop(request.stop.as_ref()),
    })
}

fn convert_message(message: &ChatMessage) -> MistralMessage {
    match message.role {
        MessageRole::Assistant => MistralMessage {
            tool_calls: message
                .tool_calls
                .iter()
                .flatten()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "function": {
                            "name": call.function.name,
                            "arguments": call.function.arguments,
                        }
                    })
                })
                .collect(),
            ..MistralMessage::new("assistant", message.text())
        },
        MessageRole::Tool => MistralMessage {
            tool_call_id: message.tool_call_id.clone(),
            ..MistralMessage::new("tool", message.text())
        },
        MessageRole::User | MessageRole::System => MistralMessage::new("user", message.text()),
    }
}
