//! Configuration files feeding the adapter

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_bedrock::MockBedrock;
use gateway_config::{load_with_overlay, EnvOverlay, GatewayConfig};
use gateway_core::LLMProvider;
use gateway_providers::{BedrockAdapter, BedrockConfig, HttpBedrockRuntime};
use gateway_resilience::{RegionHealthConfig, RegionHealthTracker};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create config file");
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Adapter wired the way the binary wires it
fn adapter_from(config: &GatewayConfig) -> BedrockAdapter {
    let settings = &config.bedrock;
    let mut builder = BedrockConfig::builder()
        .region(&settings.region)
        .timeout(settings.timeout)
        .default_max_tokens(settings.default_max_tokens)
        .cross_region(settings.cross_region)
        .health_aware(settings.health_aware);
    if let Some(key) = &settings.access_key_id {
        builder = builder.access_key_id(key);
    }
    if let Some(secret) = &settings.secret_access_key {
        use secrecy::ExposeSecret;
        builder = builder.secret_access_key(secret.expose_secret().as_str());
    }
    if let Some(url) = &settings.endpoint_url {
        builder = builder.endpoint_url(url);
    }
    let bedrock = builder.build();

    let runtime = HttpBedrockRuntime::new(&bedrock).unwrap();
    let health = RegionHealthTracker::new(RegionHealthConfig {
        failure_threshold: config.health.failure_threshold,
        latency_smoothing: config.health.latency_smoothing,
    });
    BedrockAdapter::new(bedrock, Arc::new(runtime)).with_health_tracker(Arc::new(health))
}

#[tokio::test]
async fn test_yaml_config_drives_adapter() {
    init_tracing();
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_converse(HAIKU_3, converse_response("configured", 4, 1))
        .await;

    let file = write_config(
        ".yaml",
        &format!(
            r#"
bedrock:
  region: us-east-1
  endpoint_url: "{}"
  timeout: 5s
  default_max_tokens: 256
  cross_region: false
health:
  failure_threshold: 2
logging:
  level: debug
  format: json
"#,
            bedrock.url()
        ),
    );
    let overlay = EnvOverlay::from_pairs([
        ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
        ("AWS_SECRET_ACCESS_KEY", "secret"),
    ]);
    let config = load_with_overlay(Some(file.path()), &overlay).unwrap();
    assert_eq!(config.bedrock.timeout, Duration::from_secs(5));
    assert_eq!(config.health.failure_threshold, 2);

    let adapter = adapter_from(&config);
    let response = adapter
        .chat_completion(&simple_chat_request("claude-3-haiku"))
        .await
        .unwrap();
    assert_eq!(response.content(), Some("configured"));

    let bodies = bedrock.bodies_for(HAIKU_3, "converse").await;
    assert_eq!(bodies[0]["inferenceConfig"]["maxTokens"], 256);
}

#[tokio::test]
async fn test_toml_config_with_env_region_override() {
    let bedrock = MockBedrock::start().await;
    bedrock
        .mock_converse(
            "eu.anthropic.claude-3-haiku-20240307-v1:0",
            converse_response("hallo", 2, 1),
        )
        .await;

    let file = write_config(
        ".toml",
        &format!(
            r#"
[bedrock]
region = "us-east-1"
endpoint_url = "{}"
access_key_id = "AKIDEXAMPLE"
secret_access_key = "secret"
"#,
            bedrock.url()
        ),
    );
    let overlay = EnvOverlay::from_pairs([("BEDROCK_REGION", "eu-central-1")]);
    let config = load_with_overlay(Some(file.path()), &overlay).unwrap();
    assert_eq!(config.bedrock.region, "eu-central-1");

    let adapter = adapter_from(&config);
    let response = adapter
        .chat_completion(&simple_chat_request("claude-3-haiku"))
        .await
        .unwrap();
    assert_eq!(response.content(), Some("hallo"));
}

#[test]
fn test_invalid_endpoint_is_rejected() {
    let file = write_config(
        ".yaml",
        "bedrock:\n  endpoint_url: \"not a url\"\n",
    );
    let err = load_with_overlay(Some(file.path()), &EnvOverlay::default()).unwrap_err();
    assert!(err.to_string().contains("endpoint_url"), "{err}");
}
