//! Test helper utilities for integration tests

use futures::StreamExt;
use gateway_core::{ChatChunk, ChatEventStream, StreamEvent};
use gateway_providers::{BedrockAdapter, BedrockConfig, HttpBedrockRuntime};
use gateway_resilience::{RegionHealthConfig, RegionHealthTracker};
use gateway_telemetry::{init_logging, LoggingConfig};
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;

/// Initialize tracing for tests (only once). `TEST_LOG` holds the level.
static TRACING: Lazy<()> = Lazy::new(|| {
    if let Ok(level) = std::env::var("TEST_LOG") {
        let _ = init_logging(&LoggingConfig::new(level));
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Adapter configuration pointing at a mock endpoint
pub fn test_config(endpoint: &str) -> BedrockConfig {
    BedrockConfig::builder()
        .region("us-east-1")
        .access_key_id("AKIDEXAMPLE")
        .secret_access_key("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
        .endpoint_url(endpoint)
        .timeout(Duration::from_secs(5))
        .build()
}

/// Adapter over the HTTP runtime
pub fn adapter_for(config: BedrockConfig) -> BedrockAdapter {
    let runtime = HttpBedrockRuntime::new(&config).expect("Failed to create runtime");
    BedrockAdapter::new(config, Arc::new(runtime))
}

/// Adapter with a health tracker using the given failure threshold
pub fn adapter_with_threshold(config: BedrockConfig, failure_threshold: u32) -> BedrockAdapter {
    let health = RegionHealthTracker::new(RegionHealthConfig {
        failure_threshold,
        ..RegionHealthConfig::default()
    });
    adapter_for(config).with_health_tracker(Arc::new(health))
}

/// Drain a stream into a list of events
pub async fn collect_events(stream: ChatEventStream) -> Vec<StreamEvent> {
    stream.collect().await
}

/// Chunks of a collected stream, in order
pub fn chunks(events: &[StreamEvent]) -> Vec<&ChatChunk> {
    events.iter().filter_map(StreamEvent::as_chunk).collect()
}

/// Concatenated text content of a collected stream
pub fn streamed_text(events: &[StreamEvent]) -> String {
    chunks(events)
        .iter()
        .filter_map(|c| c.delta().and_then(|d| d.content.clone()))
        .collect()
}

/// Render a collected stream as the SSE body a client would receive
pub fn sse_body(events: &[StreamEvent]) -> String {
    events.iter().map(StreamEvent::to_sse).collect()
}
