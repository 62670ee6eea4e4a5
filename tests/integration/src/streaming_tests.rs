//! Streaming completions over the HTTP runtime

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_bedrock::MockBedrock;
use crate::scripted_backend::ScriptedBackend;
use futures::StreamExt;
use gateway_core::{FinishReason, GatewayError, LLMProvider, MessageRole, StreamEvent, Usage};
use gateway_providers::bedrock::eventstream::encode_event;
use gateway_providers::bedrock::invoke::RawEvent;
use gateway_providers::BedrockAdapter;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const US_HAIKU_3: &str = "us.anthropic.claude-3-haiku-20240307-v1:0";
const LLAMA3_8B: &str = "meta.llama3-8b-instruct-v1:0";

#[tokio::test]
async fn test_stream_accumulates_into_sse_frames() {
    init_tracing();
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_stream(US_HAIKU_3, "converse-stream", converse_hello_world_frames())
        .await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let stream = adapter
        .chat_completion_stream(
            &streaming_chat_request("claude-3-haiku", true),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let events = collect_events(stream).await;

    assert_eq!(streamed_text(&events), "Hello world");
    let chunks = chunks(&events);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].delta().unwrap().role, Some(MessageRole::Assistant));
    assert!(chunks.iter().all(|c| c.id == chunks[0].id));
    assert!(chunks.iter().all(|c| c.model == "claude-3-haiku"));

    let last = chunks[2];
    assert_eq!(last.finish_reason(), Some(&FinishReason::Stop));
    assert_eq!(last.usage, Some(Usage::from_reported(10, 5, Some(15))));
    assert!(events.last().unwrap().is_done());
    assert_eq!(events.iter().filter(|e| e.is_done()).count(), 1);

    let body = sse_body(&events);
    assert!(body.starts_with("data: {"));
    assert!(body.ends_with("data: [DONE]\n\n"));
    assert_eq!(bedrock.calls_to(US_HAIKU_3, "count-tokens").await, 0);
}

#[tokio::test]
async fn test_stream_usage_hidden_when_not_requested() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_stream(US_HAIKU_3, "converse-stream", converse_hello_world_frames())
        .await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let stream = adapter
        .chat_completion_stream(
            &streaming_chat_request("claude-3-haiku", false),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let events = collect_events(stream).await;

    let chunks = chunks(&events);
    assert!(chunks.iter().all(|c| c.usage.is_none()));
    assert_eq!(
        chunks.last().unwrap().finish_reason(),
        Some(&FinishReason::Stop)
    );
}

#[tokio::test]
async fn test_stream_without_metadata_counts_usage() {
    let mut frames = Vec::new();
    frames.extend_from_slice(&encode_event("messageStart", br#"{"role":"assistant"}"#));
    frames.extend_from_slice(&encode_event(
        "contentBlockDelta",
        br#"{"contentBlockIndex":0,"delta":{"text":"Hi there"}}"#,
    ));
    frames.extend_from_slice(&encode_event("messageStop", br#"{"stopReason":"max_tokens"}"#));

    let bedrock = MockBedrock::start().await;
    bedrock.mock_stream(LLAMA3_8B, "converse-stream", frames).await;
    bedrock.mock_count_tokens(LLAMA3_8B, 6).await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let stream = adapter
        .chat_completion_stream(
            &streaming_chat_request("llama3-8b-instruct", true),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let events = collect_events(stream).await;

    let last = *chunks(&events).last().unwrap();
    assert_eq!(last.finish_reason(), Some(&FinishReason::Length));
    assert_eq!(last.usage, Some(Usage::new(6, 6)));
    assert_eq!(bedrock.calls_to(LLAMA3_8B, "count-tokens").await, 2);
}

#[tokio::test]
async fn test_stream_with_partial_usage_counts_tokens() {
    let mut frames = Vec::new();
    frames.extend_from_slice(&encode_event("messageStart", br#"{"role":"assistant"}"#));
    frames.extend_from_slice(&encode_event(
        "contentBlockDelta",
        br#"{"contentBlockIndex":0,"delta":{"text":"Hi there"}}"#,
    ));
    frames.extend_from_slice(&encode_event("messageStop", br#"{"stopReason":"end_turn"}"#));
    frames.extend_from_slice(&encode_event(
        "metadata",
        br#"{"usage":{"inputTokens":11},"metrics":{"latencyMs":40}}"#,
    ));

    let bedrock = MockBedrock::start().await;
    bedrock.mock_stream(LLAMA3_8B, "converse-stream", frames).await;
    bedrock.mock_count_tokens(LLAMA3_8B, 7).await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let stream = adapter
        .chat_completion_stream(
            &streaming_chat_request("llama3-8b-instruct", true),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let events = collect_events(stream).await;

    let last = *chunks(&events).last().unwrap();
    assert_eq!(last.finish_reason(), Some(&FinishReason::Stop));
    assert_eq!(last.usage, Some(Usage::new(7, 7)));
    assert_eq!(bedrock.calls_to(LLAMA3_8B, "count-tokens").await, 2);
}

#[tokio::test]
async fn test_claude_tool_call_stream() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_stream(
            US_HAIKU_3,
            "invoke-with-response-stream",
            claude_tool_stream_frames(),
        )
        .await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let mut request = tool_chat_request("claude-3-haiku");
    request.stream = true;
    let stream = adapter
        .chat_completion_stream(&request, CancellationToken::new())
        .await
        .unwrap();
    let events = collect_events(stream).await;
    let chunks = chunks(&events);

    assert!(chunks.iter().all(|c| c.id == "msg_stream"));
    let deltas: Vec<_> = chunks
        .iter()
        .filter_map(|c| c.delta().and_then(|d| d.tool_calls.clone()))
        .flatten()
        .collect();
    assert_eq!(deltas[0].index, 0);
    assert_eq!(deltas[0].id.as_deref(), Some("toolu_9"));
    assert_eq!(deltas[0].function.name.as_deref(), Some("get_weather"));
    let arguments: String = deltas
        .iter()
        .filter_map(|d| d.function.arguments.clone())
        .collect();
    assert_eq!(arguments, r#"{"city":"Paris"}"#);

    let last = *chunks.last().unwrap();
    assert_eq!(last.finish_reason(), Some(&FinishReason::ToolCalls));
    assert_eq!(last.usage, Some(Usage::new(25, 11)));
    assert!(events.last().unwrap().is_done());
}

#[tokio::test]
async fn test_mid_stream_exception_ends_with_error_then_done() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_stream(US_HAIKU_3, "converse-stream", converse_throttled_frames())
        .await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let stream = adapter
        .chat_completion_stream(
            &streaming_chat_request("claude-3-haiku", true),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let events = collect_events(stream).await;

    assert_eq!(streamed_text(&events), "Hel");
    let n = events.len();
    assert!(events[n - 1].is_done());
    let StreamEvent::Error(body) = &events[n - 2] else {
        panic!("expected an error event, got {:?}", events[n - 2]);
    };
    assert_eq!(body["error"]["code"], "stream_error");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("Too many tokens"), "{message}");

    // Mid-stream failures do not count against region health
    assert!(adapter.health_tracker().health_of("us").is_healthy);
}

#[tokio::test]
async fn test_stream_open_error_is_returned_directly() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_error(
            US_HAIKU_3,
            "converse-stream",
            403,
            serde_json::json!({"Message": "The security token included in the request is invalid."}),
        )
        .await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let result = adapter
        .chat_completion_stream(
            &streaming_chat_request("claude-3-haiku", true),
            CancellationToken::new(),
        )
        .await;
    let Err(err) = result else {
        panic!("expected the stream to fail to open");
    };
    assert_eq!(err.error_code(), "authentication_error");
    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn test_cancel_while_opening_returns_promptly() {
    let bedrock = MockBedrock::start().await;
    Mock::given(method("POST"))
        .and(path(MockBedrock::operation_path(US_HAIKU_3, "converse-stream")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(converse_hello_world_frames())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&bedrock.server)
        .await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = adapter
        .chat_completion_stream(&streaming_chat_request("claude-3-haiku", true), cancel)
        .await;

    assert!(matches!(result, Err(GatewayError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_cancelled_stream_emits_nothing_more() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_stream(US_HAIKU_3, "converse-stream", converse_hello_world_frames())
        .await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let cancel = CancellationToken::new();
    let stream = adapter
        .chat_completion_stream(&streaming_chat_request("claude-3-haiku", true), cancel.clone())
        .await
        .unwrap();
    cancel.cancel();

    let events = collect_events(stream).await;
    assert!(events.iter().all(|e| !e.is_done()));
    assert!(events.iter().all(|e| !matches!(e, StreamEvent::Error(_))));
}

#[tokio::test]
async fn test_cancel_mid_stream_closes_backend_once() {
    let backend = Arc::new(ScriptedBackend::held_open(vec![
        RawEvent::new("messageStart", json!({"role": "assistant"})),
        RawEvent::new(
            "contentBlockDelta",
            json!({"contentBlockIndex": 0, "delta": {"text": "Once upon"}}),
        ),
    ]));
    let closes = backend.closes();
    let adapter = BedrockAdapter::new(test_config("http://localhost:1"), backend.clone());

    let cancel = CancellationToken::new();
    let mut stream = adapter
        .chat_completion_stream(&streaming_chat_request("nova-lite", true), cancel.clone())
        .await
        .unwrap();

    let first = stream.next().await.unwrap();
    assert_eq!(
        first.as_chunk().and_then(|c| c.delta()).and_then(|d| d.content.clone()),
        Some("Once upon".to_string())
    );

    cancel.cancel();
    let rest: Vec<StreamEvent> = tokio::time::timeout(Duration::from_secs(5), stream.collect())
        .await
        .expect("cancelled stream must end");
    assert!(rest.is_empty());
    assert_eq!(closes.closed(), 1);
    assert!(backend
        .calls()
        .iter()
        .all(|(operation, _)| operation != "count-tokens"));
}

#[tokio::test]
async fn test_scripted_reasoning_stream() {
    let backend = Arc::new(
        ScriptedBackend::streaming(vec![
            RawEvent::new("messageStart", json!({"role": "assistant"})),
            RawEvent::new(
                "contentBlockDelta",
                json!({"contentBlockIndex": 0, "delta": {"reasoningContent": {"text": "Thinking..."}}}),
            ),
            RawEvent::new(
                "contentBlockDelta",
                json!({"contentBlockIndex": 1, "delta": {"text": "42"}}),
            ),
            RawEvent::new("messageStop", json!({"stopReason": "end_turn"})),
        ])
        .with_counted_tokens(3),
    );
    let closes = backend.closes();
    let adapter = BedrockAdapter::new(test_config("http://localhost:1"), backend.clone());

    let stream = adapter
        .chat_completion_stream(
            &streaming_chat_request("deepseek-r1", true),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let events = collect_events(stream).await;
    let chunks = chunks(&events);

    assert_eq!(
        chunks[0].delta().unwrap().reasoning_content.as_deref(),
        Some("Thinking...")
    );
    assert_eq!(streamed_text(&events), "42");
    let last = *chunks.last().unwrap();
    assert_eq!(last.finish_reason(), Some(&FinishReason::Stop));
    assert_eq!(last.usage, Some(Usage::new(3, 3)));
    assert!(events.last().unwrap().is_done());
    assert_eq!(closes.closed(), 1);
    assert_eq!(
        backend.calls()[0],
        ("converse-stream".to_string(), "us.deepseek.r1-v1:0".to_string())
    );
}
