//! Test fixtures and sample Bedrock payloads for integration tests

use base64::Engine as _;
use gateway_core::{ChatMessage, GatewayRequest, StreamOptions, ToolDefinition};
use gateway_providers::bedrock::eventstream::{encode_event, encode_exception};
use serde_json::{json, Value};

/// Backend id of the default test model
pub const HAIKU_3: &str = "anthropic.claude-3-haiku-20240307-v1:0";

/// Create a simple chat request for testing
pub fn simple_chat_request(model: &str) -> GatewayRequest {
    GatewayRequest::builder()
        .model(model)
        .message(ChatMessage::user("Hello, how are you?"))
        .build()
        .expect("Failed to build request")
}

/// Create a chat request with a system message
pub fn chat_request_with_system(model: &str, system: &str, user: &str) -> GatewayRequest {
    GatewayRequest::builder()
        .model(model)
        .messages(vec![ChatMessage::system(system), ChatMessage::user(user)])
        .build()
        .expect("Failed to build request")
}

/// Create a streaming chat request
pub fn streaming_chat_request(model: &str, include_usage: bool) -> GatewayRequest {
    let mut request = GatewayRequest::builder()
        .model(model)
        .message(ChatMessage::user("Say hello."))
        .stream(true)
        .build()
        .expect("Failed to build request");
    request.stream_options = Some(StreamOptions {
        include_usage: Some(include_usage),
    });
    request
}

/// Weather lookup tool
pub fn weather_tool() -> ToolDefinition {
    ToolDefinition::function(
        "get_weather",
        "Current weather for a city",
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }),
    )
}

/// Create a chat request that offers the weather tool
pub fn tool_chat_request(model: &str) -> GatewayRequest {
    GatewayRequest::builder()
        .model(model)
        .message(ChatMessage::user("What's the weather in Paris?"))
        .tools(vec![weather_tool()])
        .build()
        .expect("Failed to build request")
}

/// Converse response with text and usage
pub fn converse_response(text: &str, input_tokens: u32, output_tokens: u32) -> Value {
    json!({
        "output": {"message": {"role": "assistant", "content": [{"text": text}]}},
        "stopReason": "end_turn",
        "usage": {
            "inputTokens": input_tokens,
            "outputTokens": output_tokens,
            "totalTokens": input_tokens + output_tokens
        }
    })
}

/// Converse response without a usage block
pub fn converse_response_without_usage(text: &str) -> Value {
    json!({
        "output": {"message": {"role": "assistant", "content": [{"text": text}]}},
        "stopReason": "end_turn"
    })
}

/// Anthropic Messages response calling the weather tool
pub fn claude_tool_use_response() -> Value {
    json!({
        "id": "msg_01XYZ",
        "type": "message",
        "role": "assistant",
        "content": [
            {"type": "text", "text": "Let me check."},
            {
                "type": "tool_use",
                "id": "toolu_01",
                "name": "get_weather",
                "input": {"city": "Paris"}
            }
        ],
        "stop_reason": "tool_use",
        "usage": {"input_tokens": 40, "output_tokens": 18}
    })
}

/// Bedrock JSON error body
pub fn bedrock_error(error_type: &str, message: &str) -> Value {
    json!({"__type": error_type, "message": message})
}

/// Converse stream frames for "Hello world" with usage
pub fn converse_hello_world_frames() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&encode_event("messageStart", br#"{"role":"assistant"}"#));
    body.extend_from_slice(&encode_event(
        "contentBlockDelta",
        br#"{"contentBlockIndex":0,"delta":{"text":"Hello"}}"#,
    ));
    body.extend_from_slice(&encode_event(
        "contentBlockDelta",
        br#"{"contentBlockIndex":0,"delta":{"text":" world"}}"#,
    ));
    body.extend_from_slice(&encode_event("contentBlockStop", br#"{"contentBlockIndex":0}"#));
    body.extend_from_slice(&encode_event("messageStop", br#"{"stopReason":"end_turn"}"#));
    body.extend_from_slice(&encode_event(
        "metadata",
        br#"{"usage":{"inputTokens":10,"outputTokens":5,"totalTokens":15},"metrics":{"latencyMs":120}}"#,
    ));
    body
}

/// Converse stream frames that fail with a throttling exception after one delta
pub fn converse_throttled_frames() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&encode_event("messageStart", br#"{"role":"assistant"}"#));
    body.extend_from_slice(&encode_event(
        "contentBlockDelta",
        br#"{"contentBlockIndex":0,"delta":{"text":"Hel"}}"#,
    ));
    body.extend_from_slice(&encode_exception(
        "throttlingException",
        br#"{"message":"Too many tokens, please wait"}"#,
    ));
    body
}

/// Raw invocation `chunk` frame wrapping a model body
pub fn invoke_chunk_frame(payload: &Value) -> Vec<u8> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(payload.to_string());
    encode_event("chunk", json!({ "bytes": encoded }).to_string().as_bytes()).to_vec()
}

/// Anthropic Messages stream calling the weather tool
pub fn claude_tool_stream_frames() -> Vec<u8> {
    let events = [
        json!({"type": "message_start", "message": {"id": "msg_stream", "usage": {"input_tokens": 25}}}),
        json!({
            "type": "content_block_start",
            "index": 0,
            "content_block": {"type": "tool_use", "id": "toolu_9", "name": "get_weather"}
        }),
        json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "input_json_delta", "partial_json": "{\"city\":"}
        }),
        json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "input_json_delta", "partial_json": "\"Paris\"}"}
        }),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 11}}),
        json!({"type": "message_stop"}),
    ];
    events.iter().flat_map(invoke_chunk_frame).collect()
}
