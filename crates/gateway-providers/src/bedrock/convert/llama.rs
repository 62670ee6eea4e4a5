//! Llama prompt templates for raw invocations.
//!
//! Llama models on Bedrock take a single rendered prompt. Tool definitions
//! are embedded in the system section and the model answers a tool turn
//! with a JSON object `{"name": ..., "parameters": {...}}`, which
//! [`parse_tool_calls`] recovers.
//!
//! The Llama body has no stop-sequence field, so stop sequences travel
//! beside it and the completion is cut at the first match on our side
//! (see [`find_stop`]).

use super::{effective_max_tokens, normalize_stop, split_system, ConvertOptions};
use crate::bedrock::family::LlamaGeneration;
use gateway_core::{ChatMessage, GatewayRequest, MessageRole, ToolCall, ToolDefinition};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
const PYTHON_TAG: &str = "<|python_tag|>";

/// Llama invocation body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlamaPromptRequest {
    /// Rendered prompt
    pub prompt: String,
    /// Output token bound
    pub max_gen_len: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Stop sequences, applied to the completion after generation
    #[serde(skip)]
    pub stop: Option<Vec<String>>,
    /// Template the prompt was rendered with
    #[serde(skip)]
    pub generation: LlamaGeneration,
    /// Whether tool definitions were embedded
    #[serde(skip)]
    pub tool_mode: bool,
}

/// Render the prompt body
#[must_use]
pub fn build(
    request: &GatewayRequest,
    generation: LlamaGeneration,
    options: &ConvertOptions,
) -> LlamaPromptRequest {
    let (system_texts, turns) = split_system(&request.messages);
    let tools = request.tools.as_deref().unwrap_or_default();

    let mut system = system_texts.join("\n");
    if !tools.is_empty() {
        if !system.is_empty() {
            system.push_str("\n\n");
        }
        system.push_str(&tool_instructions(tools));
    }

    let prompt = match generation {
        LlamaGeneration::Llama3 => render_llama3(&system, &turns),
        LlamaGeneration::Llama2 => render_llama2(&system, &turns),
    };

    LlamaPromptRequest {
        prompt,
        max_gen_len: effective_max_tokens(request, options),
        temperature: request.temperature,
        top_p: request.top_p,
        stop: normalize_stop(request.stop.as_ref()),
        generation,
        tool_mode: !tools.is_empty(),
    }
}

fn tool_instructions(tools: &[ToolDefinition]) -> String {
    let definitions: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.function.name,
                    "description": tool.function.description,
                    "parameters": tool.function.parameters,
                }
            })
        })
        .collect();
    let rendered = serde_json::to_string_pretty(&definitions).unwrap_or_default();

    format!(
        "You have access to the following functions. To call a function, respond only \
         with a JSON object of the form {{\"name\": <function name>, \"parameters\": \
         <object of argument names and values>}}. To call several functions, respond \
         with a JSON array of such objects. Do not add any other text to a function \
         call.\n\n{rendered}"
    )
}

fn tool_call_json(call: &ToolCall) -> String {
    json!({
        "name": call.function.name,
        "parameters": super::parse_arguments(&call.function.arguments),
    })
    .to_string()
}

fn assistant_text(message: &ChatMessage) -> String {
    let calls: Vec<String> = message
        .tool_calls
        .iter()
        .flatten()
        .map(tool_call_json)
        .collect();
    match calls.as_slice() {
        [] => message.text(),
        [single] => single.clone(),
        many => format!("[{}]", many.join(",")),
    }
}

fn render_llama3(system: &str, turns: &[&ChatMessage]) -> String {
    let mut prompt = String::from(BEGIN_OF_TEXT);
    let eot = LlamaGeneration::Llama3.end_of_turn();
    let mut push_turn = |role: &str, content: &str| {
        prompt.push_str("<|start_header_id|>");
        prompt.push_str(role);
        prompt.push_str("<|end_header_id|>\n\n");
        prompt.push_str(content);
        prompt.push_str(eot);
    };

    if !system.is_empty() {
        push_turn("system", system);
    }
    for message in turns {
        match message.role {
            MessageRole::Assistant => push_turn("assistant", &assistant_text(message)),
            MessageRole::Tool => push_turn("ipython", &message.text()),
            MessageRole::User | MessageRole::System => push_turn("user", &message.text()),
        }
    }

    prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    prompt
}

fn render_llama2(system: &str, turns: &[&ChatMessage]) -> String {
    let eot = LlamaGeneration::Llama2.end_of_turn();
    let mut prompt = String::new();
    let mut system_pending = !system.is_empty();
    let mut open = false;

    for message in turns {
        match message.role {
            MessageRole::Assistant => {
                if !open {
                    prompt.push_str("<s>[INST]  [/INST]");
                }
                prompt.push(' ');
                prompt.push_str(&assistant_text(message));
                prompt.push(' ');
                prompt.push_str(eot);
                open = false;
            }
            role => {
                let text = match role {
                    MessageRole::Tool => format!(
                        "[Tool result for {}]: {}",
                        message.tool_call_id.as_deref().unwrap_or_default(),
                        message.text()
                    ),
                    _ => message.text(),
                };
                if open {
                    // Back-to-back user turns share one instruction block
                    let end = prompt.len() - " [/INST]".len();
                    prompt.truncate(end);
                    prompt.push('\n');
                } else {
                    prompt.push_str("<s>[INST] ");
                    if system_pending {
                        prompt.push_str("<<SYS>>\n");
                        prompt.push_str(system);
                        prompt.push_str("\n<</SYS>>\n\n");
                        system_pending = false;
                    }
                }
                prompt.push_str(&text);
                prompt.push_str(" [/INST]");
                open = true;
            }
        }
    }

    if system_pending {
        prompt.push_str("<s>[INST] <<SYS>>\n");
        prompt.push_str(system);
        prompt.push_str("\n<</SYS>>\n\n [/INST]");
    }
    prompt
}

/// Byte offset of the earliest stop-sequence match in `text`
#[must_use]
pub fn find_stop(text: &str, stops: &[String]) -> Option<usize> {
    stops
        .iter()
        .filter(|stop| !stop.is_empty())
        .filter_map(|stop| text.find(stop.as_str()))
        .min()
}

/// Recover tool calls from a Llama completion.
///
/// Returns `None` unless the whole completion is a tool-call object or an
/// array of them.
#[must_use]
pub fn parse_tool_calls(text: &str) -> Option<Vec<ToolCall>> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix(PYTHON_TAG).unwrap_or(trimmed).trim();
    let trimmed = trimmed
        .strip_suffix(LlamaGeneration::Llama3.end_of_turn())
        .unwrap_or(trimmed)
        .trim();

    let candidates = match serde_json::from_str::<Value>(trimmed).ok()? {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => return None,
    };

    let calls: Option<Vec<ToolCall>> = candidates
        .iter()
        .map(|candidate| {
            let name = candidate.get("name")?.as_str()?;
            let arguments = candidate
                .get("parameters")
                .or_else(|| candidate.get("arguments"))
                .cloned()
                .unwrap_or_else(|| json!({}));
            Some(ToolCall::function(
                format!("call_{}", Uuid::new_v4().simple()),
                name,
                arguments.to_string(),
            ))
        })
        .collect();
    calls.filter(|c| !c.is_empty())
}
