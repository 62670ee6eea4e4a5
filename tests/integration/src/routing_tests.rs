//! Cross-region routing and region health over the HTTP runtime

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_bedrock::MockBedrock;
use gateway_core::{HealthStatus, LLMProvider};
use gateway_providers::BedrockConfig;
use gateway_routing::{CrossRegionResolver, Geography, ModelProfiles, Qualification};
use std::time::Duration;

const US_HAIKU_3: &str = "us.anthropic.claude-3-haiku-20240307-v1:0";
const EU_HAIKU_3: &str = "eu.anthropic.claude-3-haiku-20240307-v1:0";
const GLOBAL_HAIKU_3: &str = "global.anthropic.claude-3-haiku-20240307-v1:0";

#[tokio::test]
async fn test_unhealthy_profile_falls_back_to_base_id() {
    init_tracing();
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_error(
            US_HAIKU_3,
            "converse",
            503,
            bedrock_error("ServiceUnavailableException", "Service unavailable"),
        )
        .await;
    bedrock
        .mock_converse(HAIKU_3, converse_response("from base", 5, 2))
        .await;

    let adapter = adapter_with_threshold(test_config(&bedrock.url()), 4);
    let request = simple_chat_request("claude-3-haiku");

    for _ in 0..4 {
        let err = adapter.chat_completion(&request).await.unwrap_err();
        assert!(err.is_retryable());
    }
    assert!(!adapter.health_tracker().health_of("us").is_healthy);
    assert_eq!(adapter.health_tracker().health_of("us").error_count, 4);

    let response = adapter.chat_completion(&request).await.unwrap();
    assert_eq!(response.content(), Some("from base"));
    assert_eq!(bedrock.calls_to(US_HAIKU_3, "converse").await, 4);
    assert_eq!(bedrock.calls_to(HAIKU_3, "converse").await, 1);
    assert!(adapter.health_tracker().health_of("us-east-1").is_healthy);
}

#[tokio::test]
async fn test_client_errors_do_not_mark_region_unhealthy() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_error(
            US_HAIKU_3,
            "converse",
            400,
            bedrock_error("ValidationException", "Malformed input request"),
        )
        .await;

    let adapter = adapter_with_threshold(test_config(&bedrock.url()), 2);
    let request = simple_chat_request("claude-3-haiku");
    for _ in 0..3 {
        assert!(adapter.chat_completion(&request).await.is_err());
    }

    assert!(adapter.health_tracker().health_of("us").is_healthy);
    assert_eq!(bedrock.calls_to(US_HAIKU_3, "converse").await, 3);
    assert_eq!(adapter.health_check().await, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_converse(US_HAIKU_3, converse_response("ok", 1, 1))
        .await;

    let adapter = adapter_with_threshold(test_config(&bedrock.url()), 4);
    let tracker = adapter.health_tracker();
    tracker.record_failure("us", Duration::from_millis(10), "timeout");
    tracker.record_failure("us", Duration::from_millis(10), "timeout");

    adapter
        .chat_completion(&simple_chat_request("claude-3-haiku"))
        .await
        .unwrap();

    let health = tracker.health_of("us");
    assert!(health.is_healthy);
    assert_eq!(health.error_count, 0);
}

#[tokio::test]
async fn test_caller_region_picks_geography() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_converse(EU_HAIKU_3, converse_response("bonjour", 3, 1))
        .await;

    let config = BedrockConfig::builder()
        .region("eu-west-1")
        .access_key_id("AKIDEXAMPLE")
        .secret_access_key("secret")
        .endpoint_url(bedrock.url())
        .build();
    let adapter = adapter_for(config);

    let response = adapter
        .chat_completion(&simple_chat_request("claude-3-haiku"))
        .await
        .unwrap();
    assert_eq!(response.content(), Some("bonjour"));
    assert_eq!(bedrock.calls_to(EU_HAIKU_3, "converse").await, 1);
}

#[tokio::test]
async fn test_cross_region_disabled_uses_base_id() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_converse(HAIKU_3, converse_response("direct", 3, 1))
        .await;

    let mut config = test_config(&bedrock.url());
    config.cross_region = false;
    let adapter = adapter_for(config);

    let response = adapter
        .chat_completion(&simple_chat_request("claude-3-haiku"))
        .await
        .unwrap();
    assert_eq!(response.content(), Some("direct"));
    assert_eq!(bedrock.calls_to(US_HAIKU_3, "converse").await, 0);
}

#[tokio::test]
async fn test_unhealthy_global_profile_falls_back_to_geography() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_error(
            GLOBAL_HAIKU_3,
            "converse",
            500,
            bedrock_error("InternalServerException", "Internal failure"),
        )
        .await;
    bedrock
        .mock_converse(US_HAIKU_3, converse_response("from us", 4, 2))
        .await;

    let resolver = CrossRegionResolver::empty()
        .with_profile(
            HAIKU_3,
            ModelProfiles::geographies(&[Geography::Us]).with_global(),
        )
        .with_global_region("us-east-1");
    assert_eq!(
        resolver.resolve(HAIKU_3, "us-east-1").qualification,
        Qualification::Global
    );
    let adapter = adapter_with_threshold(test_config(&bedrock.url()), 2).with_resolver(resolver);
    let request = simple_chat_request("claude-3-haiku");

    for _ in 0..2 {
        assert!(adapter.chat_completion(&request).await.is_err());
    }
    assert!(!adapter.health_tracker().health_of("global").is_healthy);

    let response = adapter.chat_completion(&request).await.unwrap();
    assert_eq!(response.content(), Some("from us"));
    assert_eq!(bedrock.calls_to(GLOBAL_HAIKU_3, "converse").await, 2);
    assert_eq!(bedrock.calls_to(US_HAIKU_3, "converse").await, 1);
    assert_eq!(bedrock.calls_to(HAIKU_3, "converse").await, 0);
}
