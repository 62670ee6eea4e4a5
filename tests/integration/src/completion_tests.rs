//! Non-streaming completions over the HTTP runtime

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_bedrock::MockBedrock;
use gateway_core::{FinishReason, GatewayRequest, LLMProvider, Usage};
use pretty_assertions::assert_eq;
use serde_json::json;

const US_HAIKU_3: &str = "us.anthropic.claude-3-haiku-20240307-v1:0";
const LLAMA3_8B: &str = "meta.llama3-8b-instruct-v1:0";
const US_LLAMA31_70B: &str = "us.meta.llama3-1-70b-instruct-v1:0";

#[tokio::test]
async fn test_converse_completion_round_trip() {
    init_tracing();
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_converse(US_HAIKU_3, converse_response("Paris.", 14, 2))
        .await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let request = chat_request_with_system(
        "claude-3-haiku",
        "Answer in one word.",
        "What is the capital of France?",
    );
    let response = adapter.chat_completion(&request).await.unwrap();

    assert_eq!(response.model, "claude-3-haiku");
    assert_eq!(response.object, "chat.completion");
    assert_eq!(response.content(), Some("Paris."));
    assert_eq!(response.finish_reason(), Some(&FinishReason::Stop));
    assert_eq!(response.usage, Some(Usage::from_reported(14, 2, Some(16))));

    let bodies = bedrock.bodies_for(US_HAIKU_3, "converse").await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["system"][0]["text"], "Answer in one word.");
    assert_eq!(bodies[0]["messages"][0]["role"], "user");
    assert_eq!(
        bodies[0]["messages"][0]["content"][0]["text"],
        "What is the capital of France?"
    );
}

#[tokio::test]
async fn test_claude_tools_use_messages_api() {
    let bedrock = MockBedrock::start().await;
    bedrock.mock_invoke(US_HAIKU_3, claude_tool_use_response()).await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let response = adapter
        .chat_completion(&tool_chat_request("claude-3-haiku"))
        .await
        .unwrap();

    assert_eq!(response.id, "msg_01XYZ");
    assert_eq!(response.finish_reason(), Some(&FinishReason::ToolCalls));
    let calls = response.choices[0].message.tool_calls.clone().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "toolu_01");
    assert_eq!(calls[0].function.name, "get_weather");
    let args: serde_json::Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
    assert_eq!(args, json!({"city": "Paris"}));
    assert_eq!(response.usage, Some(Usage::new(40, 18)));

    let bodies = bedrock.bodies_for(US_HAIKU_3, "invoke").await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["anthropic_version"], "bedrock-2023-05-31");
    assert_eq!(bodies[0]["tools"][0]["name"], "get_weather");
    assert!(bodies[0]["tools"][0]["input_schema"].is_object());
    assert_eq!(bedrock.calls_to(US_HAIKU_3, "converse").await, 0);
}

#[tokio::test]
async fn test_llama_tool_completion_honours_stop() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_invoke(
            US_LLAMA31_70B,
            json!({
                "generation": "It is sunny in Paris.\nEND\nAnything else?",
                "prompt_token_count": 120,
                "generation_token_count": 14,
                "stop_reason": "stop"
            }),
        )
        .await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let mut request = tool_chat_request("llama3-1-70b-instruct");
    request.stop = Some("END".into());
    let response = adapter.chat_completion(&request).await.unwrap();

    assert_eq!(response.content(), Some("It is sunny in Paris.\n"));
    assert_eq!(response.finish_reason(), Some(&FinishReason::Stop));
    assert_eq!(response.usage, Some(Usage::new(120, 14)));

    let bodies = bedrock.bodies_for(US_LLAMA31_70B, "invoke").await;
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0]["prompt"].as_str().unwrap().contains("get_weather"));
    assert!(bodies[0].get("stop").is_none());
}

#[tokio::test]
async fn test_missing_usage_is_counted() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_converse(LLAMA3_8B, converse_response_without_usage("Hi!"))
        .await;
    bedrock.mock_count_tokens(LLAMA3_8B, 9).await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let response = adapter
        .chat_completion(&simple_chat_request("llama3-8b-instruct"))
        .await
        .unwrap();

    assert_eq!(response.content(), Some("Hi!"));
    assert_eq!(response.usage, Some(Usage::new(9, 9)));

    let counted = bedrock.bodies_for(LLAMA3_8B, "count-tokens").await;
    assert_eq!(counted.len(), 2);
    assert_eq!(
        counted[0]["input"]["converse"]["messages"][0]["content"][0]["text"],
        "Hello, how are you?"
    );
    assert_eq!(
        counted[1]["input"]["converse"]["messages"][0]["content"][0]["text"],
        "Hi!"
    );
}

#[tokio::test]
async fn test_unsupported_parameters_never_reach_bedrock() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_json_expect(
            "amazon.titan-text-express-v1",
            "converse",
            converse_response("unused", 1, 1),
            0,
        )
        .await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let mut request = tool_chat_request("titan-text-express");
    request.logprobs = Some(true);

    let err = adapter.chat_completion(&request).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.error_code(), "unsupported_parameter");
    let message = err.to_string();
    assert!(message.contains("tools"), "{message}");
    assert!(message.contains("logprobs"), "{message}");
    assert!(bedrock.requests().await.is_empty());
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_dispatch() {
    let bedrock = MockBedrock::start().await;
    let adapter = adapter_for(test_config(&bedrock.url()));

    let request: GatewayRequest = serde_json::from_value(json!({
        "model": "claude-3-haiku",
        "messages": []
    }))
    .unwrap();

    let err = adapter.chat_completion(&request).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.to_error_body()["error"]["type"], "invalid_request_error");
    assert!(bedrock.requests().await.is_empty());
}

#[tokio::test]
async fn test_non_chat_model_is_unsupported_operation() {
    let bedrock = MockBedrock::start().await;
    let adapter = adapter_for(test_config(&bedrock.url()));

    let err = adapter
        .chat_completion(&simple_chat_request("titan-embed-text-v2"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "unsupported_model_operation");
    assert!(bedrock.requests().await.is_empty());
}

#[tokio::test]
async fn test_backend_error_maps_to_error_body() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_error(
            US_HAIKU_3,
            "converse",
            400,
            bedrock_error(
                "ValidationException",
                "messages: text content blocks must be non-empty",
            ),
        )
        .await;

    let adapter = adapter_for(test_config(&bedrock.url()));
    let err = adapter
        .chat_completion(&simple_chat_request("claude-3-haiku"))
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
    let body = err.to_error_body();
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("text content blocks must be non-empty"), "{message}");
}

#[tokio::test]
async fn test_models_lists_registry() {
    let bedrock = MockBedrock::start().await;
    let adapter = adapter_for(test_config(&bedrock.url()));

    let models = adapter.models();
    assert!(models.iter().any(|m| m.id == "claude-3-haiku"));
    assert!(models.iter().any(|m| m.id == "nova-pro"));
}
