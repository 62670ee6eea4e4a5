//! Provider reply to uniform response mapping.

use super::convert::llama::{find_stop, parse_tool_calls};
use super::events::invocation_metrics;
use super::invoke::{step, BackendProtocol, ProviderReply};
use gateway_core::{
    Choice, FinishReason, GatewayError, GatewayResponse, ResponseMessage, ToolCall, Usage,
};
use serde_json::Value;

/// Stop reason for a completion cut at a stop sequence on our side
pub(crate) const STOP_SEQUENCE: &str = "stop_sequence";

/// Translate a backend stop reason. Unknown reasons pass through verbatim.
#[must_use]
pub fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" | "stop" | "COMPLETE" | "FINISH" | "endoftext" => {
            FinishReason::Stop
        }
        "max_tokens" | "length" | "MAX_TOKENS" | "LENGTH" | "model_context_window_exceeded" => {
            FinishReason::Length
        }
        "content_filtered" | "guardrail_intervened" | "CONTENT_FILTERED" => {
            FinishReason::ContentFilter
        }
        "tool_use" | "tool_calls" => FinishReason::ToolCalls,
        other => FinishReason::Other(other.to_string()),
    }
}

/// Parts of a non-streaming reply, before they are assembled
#[derive(Debug, Default)]
struct ReplyParts {
    id: Option<String>,
    text: Option<String>,
    reasoning: String,
    tool_calls: Vec<ToolCall>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

/// Build the uniform response. `usage` stays `None` when the backend
/// reported none; the caller decides how to account for it.
pub fn from_provider_reply(
    reply: &ProviderReply,
    model: &str,
) -> Result<GatewayResponse, GatewayError> {
    let mut parts = match reply.protocol {
        BackendProtocol::Converse => converse_parts(&reply.body),
        BackendProtocol::ClaudeMessages => claude_parts(&reply.body),
        BackendProtocol::Llama { tool_mode } => {
            Ok(llama_parts(&reply.body, tool_mode, &reply.stop_sequences))
        }
        BackendProtocol::MistralChat => mistral_parts(&reply.body),
    }
    .map_err(|message| GatewayError::backend(step::DECODE, message, None, false))?;

    if parts.usage.is_none() {
        if let (Some(prompt), Some(completion)) = (reply.input_tokens, reply.output_tokens) {
            parts.usage = Some(Usage::new(prompt, completion));
        }
    }

    let message = ResponseMessage::assistant(parts.text.unwrap_or_default())
        .with_reasoning(parts.reasoning)
        .with_tool_calls(parts.tool_calls);
    let finish_reason = parts.stop_reason.as_deref().map(map_stop_reason);

    let mut builder = GatewayResponse::builder()
        .model(model)
        .choice(Choice::new(message, finish_reason));
    if let Some(id) = parts.id {
        builder = builder.id(id);
    }
    if let Some(usage) = parts.usage {
        builder = builder.usage(usage);
    }
    Ok(builder.build())
}

fn converse_parts(body: &Value) -> Result<ReplyParts, String> {
    let content = body
        .pointer("/output/message/content")
        .and_then(Value::as_array)
        .ok_or("Converse response has no output message")?;

    let mut parts = ReplyParts::default();
    for block in content {
        if let Some(text) = block.get("text").and_then(Value::as_str) {
            parts.text.get_or_insert_with(|| text.to_string());
        } else if let Some(tool) = block.get("toolUse") {
            parts.tool_calls.push(ToolCall::function(
                str_field(tool, "toolUseId"),
                str_field(tool, "name"),
                tool.get("input").map_or_else(|| "{}".to_string(), Value::to_string),
            ));
        } else if let Some(text) = block
            .pointer("/reasoningContent/reasoningText/text")
            .and_then(Value::as_str)
        {
            parts.reasoning.push_str(text);
        }
    }

    parts.stop_reason = body
        .get("stopReason")
        .and_then(Value::as_str)
        .map(str::to_string);
    // A usage block missing either count is no usage at all
    parts.usage = body.get("usage").and_then(|usage| {
        Some(Usage::from_reported(
            as_u32(usage.get("inputTokens"))?,
            as_u32(usage.get("outputTokens"))?,
            as_u32(usage.get("totalTokens")),
        ))
    });
    Ok(parts)
}

fn claude_parts(body: &Value) -> Result<ReplyParts, String> {
    let content = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or("Claude response has no content")?;

    let mut parts = ReplyParts {
        id: body.get("id").and_then(Value::as_str).map(str::to_string),
        ..ReplyParts::default()
    };
    for block in content {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                parts
                    .text
                    .get_or_insert_with(|| str_field(block, "text").to_string());
            }
            Some("tool_use") => parts.tool_calls.push(ToolCall::function(
                str_field(block, "id"),
                str_field(block, "name"),
                block.get("input").map_or_else(|| "{}".to_string(), Value::to_string),
            )),
            Some("thinking") => parts.reasoning.push_str(str_field(block, "thinking")),
            _ => {}
        }
    }

    parts.stop_reason = body
        .get("stop_reason")
        .and_then(Value::as_str)
        .map(str::to_string);
    parts.usage = body.get("usage").and_then(|usage| {
        Some(Usage::new(
            as_u32(usage.get("input_tokens"))?,
            as_u32(usage.get("output_tokens"))?,
        ))
    });
    Ok(parts)
}

fn llama_parts(body: &Value, tool_mode: bool, stops: &[String]) -> ReplyParts {
    let mut generation = str_field(body, "generation");
    let mut parts = ReplyParts {
        stop_reason: body
            .get("stop_reason")
            .and_then(Value::as_str)
            .map(str::to_string),
        ..ReplyParts::default()
    };
    if let Some(cut) = find_stop(generation, stops) {
        generation = &generation[..cut];
        parts.stop_reason = Some(STOP_SEQUENCE.to_string());
    }

    match parse_tool_calls(generation).filter(|_| tool_mode) {
        Some(calls) => {
            parts.tool_calls = calls;
            parts.stop_reason = Some("tool_use".to_string());
        }
        None => parts.text = Some(generation.to_string()),
    }

    parts.usage = invocation_metrics(body).or_else(|| {
        Some(Usage::new(
            body.get("prompt_token_count")?.as_u64()? as u32,
            body.get("generation_token_count")?.as_u64()? as u32,
        ))
    });
    parts
}

fn mistral_parts(body: &Value) -> Result<ReplyParts, String> {
    let choice = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or("Mistral response has no choices")?;
    let message = choice.get("message").unwrap_or(&Value::Null);

    let mut parts = ReplyParts {
        text: message
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string),
        stop_reason: choice
            .get("stop_reason")
            .or_else(|| choice.get("finish_reason"))
            .and_then(Value::as_str)
            .map(str::to_string),
        ..ReplyParts::default()
    };
    for call in message
        .get("tool_calls")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let function = call.get("function").unwrap_or(&Value::Null);
        let arguments = match function.get("arguments") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "{}".to_string(),
        };
        parts.tool_calls.push(ToolCall::function(
            str_field(call, "id"),
            str_field(function, "name"),
            arguments,
        ));
    }
    Ok(parts)
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn as_u32(value: Option<&Value>) -> Option<u32> {
    value.and_then(Value::as_u64).map(|n| n as u32)
}
