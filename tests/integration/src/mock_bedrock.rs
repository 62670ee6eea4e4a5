//! Mock Bedrock runtime endpoint for integration testing
//!
//! Wraps a wiremock server that answers the runtime operations
//! (`converse`, `converse-stream`, `invoke`, `invoke-with-response-stream`,
//! `count-tokens`) under `/model/{id}/...`.

use serde_json::{json, Value};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const EVENT_STREAM: &str = "application/vnd.amazon.eventstream";

/// Mock Bedrock runtime server
pub struct MockBedrock {
    /// Underlying wiremock server
    pub server: MockServer,
}

impl MockBedrock {
    /// Start a new mock server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to use as `endpoint_url`
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Path of an operation for a model id, percent-encoded as sent on the wire
    pub fn operation_path(model_id: &str, operation: &str) -> String {
        format!("/model/{}/{operation}", model_id.replace(':', "%3A"))
    }

    /// Answer a JSON operation with a body
    pub async fn mock_json(&self, model_id: &str, operation: &str, body: Value) {
        Mock::given(method("POST"))
            .and(path(Self::operation_path(model_id, operation)))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer a JSON operation, expecting an exact number of calls
    pub async fn mock_json_expect(&self, model_id: &str, operation: &str, body: Value, calls: u64) {
        Mock::given(method("POST"))
            .and(path(Self::operation_path(model_id, operation)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Answer `converse`
    pub async fn mock_converse(&self, model_id: &str, body: Value) {
        self.mock_json(model_id, "converse", body).await;
    }

    /// Answer `invoke`
    pub async fn mock_invoke(&self, model_id: &str, body: Value) {
        self.mock_json(model_id, "invoke", body).await;
    }

    /// Answer `count-tokens` with a fixed count
    pub async fn mock_count_tokens(&self, model_id: &str, input_tokens: u32) {
        self.mock_json(
            model_id,
            "count-tokens",
            json!({ "inputTokens": input_tokens }),
        )
        .await;
    }

    /// Answer a streaming operation with pre-encoded event-stream frames
    pub async fn mock_stream(&self, model_id: &str, operation: &str, frames: Vec<u8>) {
        Mock::given(method("POST"))
            .and(path(Self::operation_path(model_id, operation)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", EVENT_STREAM)
                    .set_body_bytes(frames),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer an operation with an HTTP error
    pub async fn mock_error(&self, model_id: &str, operation: &str, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(Self::operation_path(model_id, operation)))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// JSON bodies received for an operation path
    pub async fn bodies_for(&self, model_id: &str, operation: &str) -> Vec<Value> {
        let wanted = Self::operation_path(model_id, operation);
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.url.path() == wanted)
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }

    /// Number of requests received for an operation path
    pub async fn calls_to(&self, model_id: &str, operation: &str) -> usize {
        let wanted = Self::operation_path(model_id, operation);
        self.requests()
            .await
            .iter()
            .filter(|r| r.url.path() == wanted)
            .count()
    }
}
