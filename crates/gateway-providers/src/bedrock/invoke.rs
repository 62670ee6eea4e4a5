//! Backend invoker.
//!
//! [`BedrockRuntime`] is the seam between the adapter and the network. The
//! HTTP implementation lives in [`super::client`]; tests plug in scripted
//! runtimes. [`BackendInvoker`] picks the call shape for a
//! [`ProviderRequest`] and turns runtime failures into gateway errors that
//! name the failing step. It never retries.

use super::convert::{CallShape, ProviderRequest};
use async_trait::async_trait;
use futures::stream::BoxStream;
use gateway_core::GatewayError;
use gateway_telemetry::provider_span;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, Instrument};

/// Step names reported in backend errors
pub mod step {
    /// Non-streaming Converse call
    pub const CONVERSE: &str = "converse";
    /// Non-streaming raw invocation
    pub const INVOKE: &str = "invoke";
    /// Opening a response stream
    pub const STREAM_OPEN: &str = "stream-open";
    /// Reading from an open stream
    pub const STREAM_READ: &str = "stream-read";
    /// Decoding a stream event
    pub const DECODE: &str = "decode";
    /// Token counting
    pub const COUNT_TOKENS: &str = "count-tokens";
}

/// Runtime failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// Connection, timeout or body read failure
    Transport,
    /// Backend asked us to slow down
    Throttled,
    /// Backend rejected or failed the call
    Service,
    /// Credentials rejected
    Authentication,
    /// Response could not be decoded
    Decode,
}

/// Error returned by a [`BedrockRuntime`]
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RuntimeError {
    /// Failure class
    pub kind: RuntimeErrorKind,
    /// Backend or transport message
    pub message: String,
    /// HTTP status, if one was received
    pub status: Option<u16>,
}

impl RuntimeError {
    /// Create a runtime error
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            kind,
            message: message.into(),
            status,
        }
    }

    /// Transport failure
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Transport, message, None)
    }

    /// Decode failure
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Decode, message, None)
    }

    /// Service failure with a status
    pub fn service(message: impl Into<String>, status: u16) -> Self {
        Self::new(RuntimeErrorKind::Service, message, Some(status))
    }

    /// Whether the same call may succeed if repeated
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            RuntimeErrorKind::Transport | RuntimeErrorKind::Throttled => true,
            RuntimeErrorKind::Service => self.status.is_some_and(|s| s >= 500),
            RuntimeErrorKind::Authentication | RuntimeErrorKind::Decode => false,
        }
    }

    /// Gateway error for the failing step
    #[must_use]
    pub fn into_gateway_error(self, step: &str) -> GatewayError {
        match self.kind {
            RuntimeErrorKind::Authentication => GatewayError::authentication(self.message),
            RuntimeErrorKind::Throttled => GatewayError::backend(step, self.message, Some(429), true),
            _ => {
                let retryable = self.is_retryable();
                GatewayError::backend(step, self.message, self.status, retryable)
            }
        }
    }
}

/// One decoded backend stream event
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Event type: a Converse event name, or `chunk` for raw invocations
    pub event_type: String,
    /// JSON payload; for `chunk` events, the decoded model body
    pub payload: Value,
}

impl RawEvent {
    /// Create a raw event
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// Backend event stream
pub type RawEventStream = BoxStream<'static, Result<RawEvent, RuntimeError>>;

/// Non-streaming call output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeOutput {
    /// Response body
    pub body: Value,
    /// Prompt tokens reported out of band (invocation headers)
    pub input_tokens: Option<u32>,
    /// Completion tokens reported out of band
    pub output_tokens: Option<u32>,
}

impl InvokeOutput {
    /// Output with a body only
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }
}

/// Bedrock runtime operations
#[async_trait]
pub trait BedrockRuntime: Send + Sync {
    /// Unified turn-based call
    async fn converse(&self, model_id: &str, body: &Value) -> Result<InvokeOutput, RuntimeError>;

    /// Unified turn-based call, streamed
    async fn converse_stream(
        &self,
        model_id: &str,
        body: &Value,
    ) -> Result<RawEventStream, RuntimeError>;

    /// Raw model invocation
    async fn invoke_model(&self, model_id: &str, body: &Value)
        -> Result<InvokeOutput, RuntimeError>;

    /// Raw model invocation, streamed
    async fn invoke_model_stream(
        &self,
        model_id: &str,
        body: &Value,
    ) -> Result<RawEventStream, RuntimeError>;

    /// Count input tokens of a Converse-shaped input
    async fn count_tokens(&self, model_id: &str, body: &Value) -> Result<u32, RuntimeError>;
}

/// Wire protocol of a reply or stream, fixed by the request variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendProtocol {
    /// Converse responses and events
    Converse,
    /// Anthropic Messages bodies and events
    ClaudeMessages,
    /// Llama generation bodies
    Llama {
        /// Tools were embedded in the prompt
        tool_mode: bool,
    },
    /// Mistral chat bodies
    MistralChat,
}

impl From<&ProviderRequest> for BackendProtocol {
    fn from(request: &ProviderRequest) -> Self {
        match request {
            ProviderRequest::Converse(_) => Self::Converse,
            ProviderRequest::ClaudeMessages(_) => Self::ClaudeMessages,
            ProviderRequest::LlamaPrompt(r) => Self::Llama {
                tool_mode: r.tool_mode,
            },
            ProviderRequest::MistralChat(_) => Self::MistralChat,
        }
    }
}

/// Backend reply to a non-streaming call
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    /// How to read `body`
    pub protocol: BackendProtocol,
    /// Response body
    pub body: Value,
    /// Prompt tokens from invocation headers
    pub input_tokens: Option<u32>,
    /// Completion tokens from invocation headers
    pub output_tokens: Option<u32>,
    /// Stop sequences to cut the completion at
    pub stop_sequences: Vec<String>,
}

/// Dispatches provider requests to a runtime
#[derive(Clone)]
pub struct BackendInvoker {
    runtime: Arc<dyn BedrockRuntime>,
}

impl fmt::Debug for BackendInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendInvoker").finish_non_exhaustive()
    }
}

impl BackendInvoker {
    /// Invoker over a runtime
    pub fn new(runtime: Arc<dyn BedrockRuntime>) -> Self {
        Self { runtime }
    }

    /// Non-streaming call
    pub async fn invoke(
        &self,
        model_id: &str,
        request: &ProviderRequest,
    ) -> Result<ProviderReply, GatewayError> {
        let body = request.to_body()?;
        let shape = request.call_shape();
        debug!(model_id, ?shape, "Invoking Bedrock");

        let (output, step) = match shape {
            CallShape::Converse => (
                self.runtime
                    .converse(model_id, &body)
                    .instrument(provider_span!(step::CONVERSE, model_id))
                    .await,
                step::CONVERSE,
            ),
            CallShape::InvokeModel => (
                self.runtime
                    .invoke_model(model_id, &body)
                    .instrument(provider_span!(step::INVOKE, model_id))
                    .await,
                step::INVOKE,
            ),
        };
        let output = output.map_err(|e| e.into_gateway_error(step))?;

        Ok(ProviderReply {
            protocol: BackendProtocol::from(request),
            body: output.body,
            input_tokens: output.input_tokens,
            output_tokens: output.output_tokens,
            stop_sequences: request.local_stop_sequences().to_vec(),
        })
    }

    /// Open a response stream
    pub async fn invoke_stream(
        &self,
        model_id: &str,
        request: &ProviderRequest,
    ) -> Result<RawEventStream, GatewayError> {
        let body = request.to_body()?;
        let shape = request.call_shape();
        debug!(model_id, ?shape, "Opening Bedrock stream");

        let span = provider_span!(step::STREAM_OPEN, model_id);
        let opened = match shape {
            CallShape::Converse => {
                self.runtime
                    .converse_stream(model_id, &body)
                    .instrument(span)
                    .await
            }
            CallShape::InvokeModel => {
                self.runtime
                    .invoke_model_stream(model_id, &body)
                    .instrument(span)
                    .await
            }
        };
        opened.map_err(|e| e.into_gateway_error(step::STREAM_OPEN))
    }

    /// Count prompt tokens
    pub async fn count_tokens(&self, model_id: &str, body: &Value) -> Result<u32, GatewayError> {
        self.runtime
            .count_tokens(model_id, body)
            .await
            .map_err(|e| e.into_gateway_error(step::COUNT_TOKENS))
    }
}
