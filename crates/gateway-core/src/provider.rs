//! Provider trait implemented by backend adapters.

use crate::error::GatewayError;
use crate::request::GatewayRequest;
use crate::response::GatewayResponse;
use crate::streaming::StreamEvent;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Provider kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// AWS Bedrock
    Bedrock,
}

/// Coarse provider health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Serving normally
    Healthy,
    /// Serving with some regions failing
    Degraded,
    /// Not serving
    Unhealthy,
}

/// Model advertised by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Public model name
    pub id: String,
    /// Backend model id the name resolves to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<String>,
    /// Provider family label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

impl ModelInfo {
    /// Create a model entry
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            backend_id: None,
            family: None,
        }
    }

    /// Set the backend id
    #[must_use]
    pub fn with_backend_id(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = Some(backend_id.into());
        self
    }

    /// Set the family label
    #[must_use]
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }
}

/// Outbound stream of a streamed completion
pub type ChatEventStream = BoxStream<'static, StreamEvent>;

/// A backend that serves uniform chat completions
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Provider instance id
    fn id(&self) -> &str;

    /// Provider kind
    fn provider_type(&self) -> ProviderType;

    /// Run a non-streaming completion
    async fn chat_completion(
        &self,
        request: &GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError>;

    /// Open a streamed completion.
    ///
    /// Errors before the backend stream is open are returned directly.
    /// Errors after that arrive as a terminal [`StreamEvent::Error`] followed
    /// by [`StreamEvent::Done`]. Cancelling `cancel` ends the stream without
    /// further events.
    async fn chat_completion_stream(
        &self,
        request: &GatewayRequest,
        cancel: CancellationToken,
    ) -> Result<ChatEventStream, GatewayError>;

    /// Current health
    async fn health_check(&self) -> HealthStatus;

    /// Models this provider can serve
    fn models(&self) -> Vec<ModelInfo>;
}
