//! HTTP implementation of [`BedrockRuntime`].

use super::eventstream::{EventMessage, EventStreamDecoder};
use super::invoke::{
    BedrockRuntime, InvokeOutput, RawEvent, RawEventStream, RuntimeError, RuntimeErrorKind,
};
use super::sigv4::{uri_encode, SigV4Signer, BEDROCK_SERVICE};
use super::BedrockConfig;
use async_trait::async_trait;
use base64::Engine as _;
use futures::StreamExt;
use gateway_core::GatewayError;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};
use url::Url;

const INPUT_TOKENS_HEADER: &str = "x-amzn-bedrock-input-token-count";
const OUTPUT_TOKENS_HEADER: &str = "x-amzn-bedrock-output-token-count";
const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";
const JSON: &str = "application/json";
const EVENT_STREAM: &str = "application/vnd.amazon.eventstream";

/// reqwest + SigV4 Bedrock runtime client
pub struct HttpBedrockRuntime {
    client: Client,
    signer: SigV4Signer,
    base_url: String,
}

impl fmt::Debug for HttpBedrockRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBedrockRuntime")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpBedrockRuntime {
    /// Create a client from configuration. Static credentials are required.
    pub fn new(config: &BedrockConfig) -> Result<Self, GatewayError> {
        let access_key_id = config
            .access_key_id
            .clone()
            .ok_or_else(|| GatewayError::configuration("AWS access key ID not configured"))?;
        let secret_access_key = config
            .secret_access_key
            .clone()
            .ok_or_else(|| GatewayError::configuration("AWS secret access key not configured"))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            signer: SigV4Signer::new(
                access_key_id,
                secret_access_key,
                config.session_token.clone(),
                config.region.clone(),
                BEDROCK_SERVICE,
            ),
            base_url: config.base_url(),
        })
    }

    /// URL of a model operation
    fn operation_url(&self, model_id: &str, operation: &str) -> Result<Url, RuntimeError> {
        let raw = format!("{}/model/{}/{operation}", self.base_url, uri_encode(model_id));
        Url::parse(&raw).map_err(|e| RuntimeError::transport(format!("Invalid URL {raw}: {e}")))
    }

    async fn post(
        &self,
        model_id: &str,
        operation: &str,
        body: &Value,
        accept: &str,
    ) -> Result<Response, RuntimeError> {
        let url = self.operation_url(model_id, operation)?;
        let body = serde_json::to_vec(body)
            .map_err(|e| RuntimeError::decode(format!("Failed to serialize request: {e}")))?;

        let mut headers = BTreeMap::from([
            ("content-type".to_string(), JSON.to_string()),
            ("accept".to_string(), accept.to_string()),
        ]);
        self.signer
            .sign("POST", &url, &body, &mut headers, chrono::Utc::now())
            .map_err(|e| {
                RuntimeError::new(
                    RuntimeErrorKind::Authentication,
                    format!("Failed to sign request: {e}"),
                    None,
                )
            })?;

        let mut builder = self.client.post(url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(model_id, operation, "Sending request to Bedrock");
        let response = builder
            .body(body)
            .send()
            .await
            .map_err(|e| RuntimeError::transport(format!("Request failed: {e}")))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();
        warn!(model_id, operation, status, "Bedrock returned an error");
        Err(classify_http_error(status, &headers, &text))
    }

    async fn json_call(
        &self,
        model_id: &str,
        operation: &str,
        body: &Value,
    ) -> Result<InvokeOutput, RuntimeError> {
        let response = self.post(model_id, operation, body, JSON).await?;
        let input_tokens = header_u32(response.headers(), INPUT_TOKENS_HEADER);
        let output_tokens = header_u32(response.headers(), OUTPUT_TOKENS_HEADER);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RuntimeError::transport(format!("Failed to read response: {e}")))?;
        let body = serde_json::from_slice(&bytes)
            .map_err(|e| RuntimeError::decode(format!("Failed to parse response: {e}")))?;

        Ok(InvokeOutput {
            body,
            input_tokens,
            output_tokens,
        })
    }
}

#[async_trait]
impl BedrockRuntime for HttpBedrockRuntime {
    async fn converse(&self, model_id: &str, body: &Value) -> Result<InvokeOutput, RuntimeError> {
        self.json_call(model_id, "converse", body).await
    }

    async fn converse_stream(
        &self,
        model_id: &str,
        body: &Value,
    ) -> Result<RawEventStream, RuntimeError> {
        let response = self
            .post(model_id, "converse-stream", body, EVENT_STREAM)
            .await?;
        Ok(event_stream(response))
    }

    async fn invoke_model(
        &self,
        model_id: &str,
        body: &Value,
    ) -> Result<InvokeOutput, RuntimeError> {
        self.json_call(model_id, "invoke", body).await
    }

    async fn invoke_model_stream(
        &self,
        model_id: &str,
        body: &Value,
    ) -> Result<RawEventStream, RuntimeError> {
        let response = self
            .post(model_id, "invoke-with-response-stream", body, EVENT_STREAM)
            .await?;
        Ok(event_stream(response))
    }

    async fn count_tokens(&self, model_id: &str, body: &Value) -> Result<u32, RuntimeError> {
        let output = self.json_call(model_id, "count-tokens", body).await?;
        output
            .body
            .get("inputTokens")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .ok_or_else(|| RuntimeError::decode("count-tokens response has no inputTokens"))
    }
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn event_stream(response: Response) -> RawEventStream {
    let mut body = response.bytes_stream();
    Box::pin(async_stream::stream! {
        let mut decoder = EventStreamDecoder::new();
        loop {
            loop {
                match decoder.next_message() {
                    Ok(Some(message)) => {
                        let event = to_raw_event(&message);
                        let failed = event.is_err();
                        yield event;
                        if failed {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(RuntimeError::decode(e.to_string()));
                        return;
                    }
                }
            }

            match body.next().await {
                Some(Ok(bytes)) => decoder.push(&bytes),
                Some(Err(e)) => {
                    yield Err(RuntimeError::transport(format!("Stream read failed: {e}")));
                    return;
                }
                None => {
                    if decoder.buffered() > 0 {
                        yield Err(RuntimeError::decode("Stream ended inside an event"));
                    }
                    return;
                }
            }
        }
    })
}

/// Convert one framed message into a raw event or a runtime error
pub(crate) fn to_raw_event(message: &EventMessage) -> Result<RawEvent, RuntimeError> {
    let payload: Value = if message.payload.is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_slice(&message.payload)
            .map_err(|e| RuntimeError::decode(format!("Invalid event payload: {e}")))?
    };

    match message.message_type() {
        Some("exception" | "error") => {
            let exception = message
                .exception_type()
                .or_else(|| message.header_str(":error-code"))
                .unwrap_or("UnknownException");
            Err(classify_stream_exception(exception, &payload))
        }
        _ => {
            let event_type = message.event_type().unwrap_or_default();
            if event_type == "chunk" {
                return decode_chunk(&payload).map(|body| RawEvent::new("chunk", body));
            }
            Ok(RawEvent::new(event_type, payload))
        }
    }
}

/// Raw invocation chunks carry the model body as base64 under `bytes`
fn decode_chunk(payload: &Value) -> Result<Value, RuntimeError> {
    let encoded = payload
        .get("bytes")
        .and_then(Value::as_str)
        .ok_or_else(|| RuntimeError::decode("chunk event has no bytes"))?;
    let raw = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| RuntimeError::decode(format!("Invalid chunk encoding: {e}")))?;
    serde_json::from_slice(&raw)
        .map_err(|e| RuntimeError::decode(format!("Invalid chunk body: {e}")))
}

fn extract_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .or_else(|| body.get("Message").and_then(Value::as_str))
        .or_else(|| body.get("errorMessage").and_then(Value::as_str))
        .or_else(|| body.get("error").and_then(|e| e.get("message")).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Map an HTTP error response to a runtime error
pub(crate) fn classify_http_error(status: u16, headers: &HeaderMap, text: &str) -> RuntimeError {
    let json = serde_json::from_str::<Value>(text).unwrap_or(Value::Null);
    let message = extract_message(&json).unwrap_or_else(|| {
        if text.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            text.trim().to_string()
        }
    });
    let error_type = json
        .get("__type")
        .and_then(Value::as_str)
        .or_else(|| headers.get(ERROR_TYPE_HEADER).and_then(|v| v.to_str().ok()))
        .unwrap_or_default()
        .to_ascii_lowercase();

    let kind = if status == 429
        || error_type.contains("throttl")
        || message.to_ascii_lowercase().contains("throttl")
    {
        RuntimeErrorKind::Throttled
    } else if status == 401 || status == 403 {
        RuntimeErrorKind::Authentication
    } else {
        RuntimeErrorKind::Service
    };
    RuntimeError::new(kind, message, Some(status))
}

fn classify_stream_exception(exception: &str, payload: &Value) -> RuntimeError {
    let message = extract_message(payload).unwrap_or_else(|| exception.to_string());
    let lowered = exception.to_ascii_lowercase();
    let (kind, status) = if lowered.contains("throttl") {
        (RuntimeErrorKind::Throttled, Some(429))
    } else if lowered.contains("validation") {
        (RuntimeErrorKind::Service, Some(400))
    } else if lowered.contains("unavailable") {
        (RuntimeErrorKind::Service, Some(503))
    } else if lowered.contains("internal") || lowered.contains("modelstream") {
        (RuntimeErrorKind::Service, Some(500))
    } else {
        (RuntimeErrorKind::Service, None)
    };
    RuntimeError::new(kind, format!("{exception}: {message}"), status)
}
