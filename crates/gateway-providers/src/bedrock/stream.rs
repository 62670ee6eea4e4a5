//! Backend event stream to uniform chunk stream.
//!
//! [`StreamConverter`] holds the per-stream state: the response id, the
//! text and reasoning buffers, tool-call indices, the finish reason and
//! usage. [`convert_stream`] drives it from a raw backend stream, checking
//! cancellation at every wait.

use super::events::{BackendEvent, EventDecoder};
use super::invoke::{step, RawEventStream};
use super::response::map_stop_reason;
use super::usage::UsageAccountant;
use async_stream::stream;
use futures::StreamExt;
use gateway_core::{
    ChatChunk, ChatEventStream, ChatMessage, ChunkChoice, ChunkDelta, FinishReason,
    FunctionCallDelta, GatewayError, MessageRole, StreamEvent, ToolCallDelta, Usage,
};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-stream accumulation state
#[derive(Debug)]
pub struct StreamConverter {
    model: String,
    include_usage: bool,
    id: Option<String>,
    created: i64,
    role_sent: bool,
    text: String,
    reasoning: String,
    tool_arguments: String,
    tool_indices: HashMap<u32, u32>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl StreamConverter {
    /// Converter for a model name as the client sent it
    pub fn new(model: impl Into<String>, include_usage: bool) -> Self {
        Self {
            model: model.into(),
            include_usage,
            id: None,
            created: chrono::Utc::now().timestamp(),
            role_sent: false,
            text: String::new(),
            reasoning: String::new(),
            tool_arguments: String::new(),
            tool_indices: HashMap::new(),
            finish_reason: None,
            usage: None,
        }
    }

    /// Response id, allocated on the first event that needs one
    pub fn id(&mut self) -> &str {
        self.id
            .get_or_insert_with(|| format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Accumulated answer text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Accumulated reasoning text
    #[must_use]
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Usage seen so far
    #[must_use]
    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// Translated finish reason, once the message stopped
    #[must_use]
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    /// Whether the client asked for usage on the stream
    #[must_use]
    pub fn include_usage(&self) -> bool {
        self.include_usage
    }

    /// Everything the model generated, for token counting
    #[must_use]
    pub fn completion_text(&self) -> String {
        format!("{}{}", self.text, self.tool_arguments)
    }

    /// Usage from an out-of-band count
    pub fn set_usage(&mut self, usage: Usage) {
        self.usage = Some(usage);
    }

    /// Apply one event; returns the chunk it produces, if any
    pub fn on_event(&mut self, event: BackendEvent) -> Option<ChatChunk> {
        match event {
            BackendEvent::MessageStart { id } => {
                if self.id.is_none() {
                    self.id = id.filter(|id| !id.is_empty());
                }
                self.id();
                None
            }
            BackendEvent::TextDelta(text) => {
                if text.is_empty() {
                    return None;
                }
                self.text.push_str(&text);
                self.delta_chunk(ChunkDelta {
                    content: Some(text),
                    ..ChunkDelta::default()
                })
            }
            BackendEvent::ReasoningDelta(text) => {
                if text.is_empty() {
                    return None;
                }
                self.reasoning.push_str(&text);
                self.delta_chunk(ChunkDelta {
                    reasoning_content: Some(text),
                    ..ChunkDelta::default()
                })
            }
            BackendEvent::ToolUseStart {
                block_index,
                id,
                name,
            } => {
                let next = self.tool_indices.len() as u32;
                let index = *self.tool_indices.entry(block_index).or_insert(next);
                self.delta_chunk(ChunkDelta {
                    tool_calls: Some(vec![ToolCallDelta {
                        index,
                        id: Some(id),
                        tool_type: Some("function".to_string()),
                        function: FunctionCallDelta {
                            name: Some(name),
                            arguments: Some(String::new()),
                        },
                    }]),
                    ..ChunkDelta::default()
                })
            }
            BackendEvent::ToolUseDelta {
                block_index,
                partial_json,
            } => {
                if partial_json.is_empty() {
                    return None;
                }
                let Some(&index) = self.tool_indices.get(&block_index) else {
                    debug!(block_index, "Tool delta without a started tool call");
                    return None;
                };
                self.tool_arguments.push_str(&partial_json);
                self.delta_chunk(ChunkDelta {
                    tool_calls: Some(vec![ToolCallDelta {
                        index,
                        id: None,
                        tool_type: None,
                        function: FunctionCallDelta {
                            name: None,
                            arguments: Some(partial_json),
                        },
                    }]),
                    ..ChunkDelta::default()
                })
            }
            BackendEvent::ContentBlockStop { .. } => None,
            BackendEvent::MessageStop { stop_reason } => {
                self.finish_reason = Some(map_stop_reason(&stop_reason));
                None
            }
            BackendEvent::Metadata { usage } => {
                self.usage = Some(usage);
                None
            }
        }
    }

    /// The closing chunk: empty delta, finish reason and, when requested,
    /// usage. Without a finish reason only a usage chunk can be produced.
    pub fn finish_chunk(&mut self) -> Option<ChatChunk> {
        let usage = self.usage.filter(|_| self.include_usage);
        let finish_reason = self.finish_reason.clone();
        if finish_reason.is_none() && usage.is_none() {
            return None;
        }

        let mut builder = self.chunk_builder();
        if finish_reason.is_some() {
            builder = builder.choice(ChunkChoice::new(ChunkDelta::default(), finish_reason));
        }
        if let Some(usage) = usage {
            builder = builder.usage(usage);
        }
        Some(builder.build())
    }

    fn delta_chunk(&mut self, mut delta: ChunkDelta) -> Option<ChatChunk> {
        if delta.is_empty() {
            return None;
        }
        if !self.role_sent {
            self.role_sent = true;
            delta.role = Some(MessageRole::Assistant);
        }
        Some(
            self.chunk_builder()
                .choice(ChunkChoice::new(delta, None))
                .build(),
        )
    }

    fn chunk_builder(&mut self) -> gateway_core::streaming::ChatChunkBuilder {
        let id = self.id().to_string();
        ChatChunk::builder()
            .id(id)
            .created(self.created)
            .model(self.model.clone())
    }
}

/// What the stream needs to count tokens when the backend reports none
#[derive(Debug, Clone)]
pub struct StreamAccounting {
    /// Token counter
    pub accountant: UsageAccountant,
    /// Backend model id to count against
    pub model_id: String,
    /// Prompt messages
    pub messages: Vec<ChatMessage>,
}

/// Drive `converter` from a raw backend stream.
///
/// The outbound stream ends with exactly one [`StreamEvent::Done`], after
/// a terminal [`StreamEvent::Error`] when the backend stream broke. When
/// `cancel` fires the stream ends at once with nothing further, and the
/// backend stream is dropped.
pub fn convert_stream(
    raw: RawEventStream,
    decoder: impl Into<EventDecoder>,
    mut converter: StreamConverter,
    accounting: Option<StreamAccounting>,
    cancel: CancellationToken,
) -> ChatEventStream {
    let mut decoder = decoder.into();
    Box::pin(stream! {
        let mut raw = raw;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                next = raw.next() => Some(next),
            };
            let Some(next) = next else {
                debug!("Stream cancelled by caller");
                return;
            };
            let Some(next) = next else {
                break;
            };

            let raw_event = match next {
                Ok(raw_event) => raw_event,
                Err(e) => {
                    warn!(step = step::STREAM_READ, error = %e, "Backend stream failed");
                    yield StreamEvent::Error(
                        GatewayError::stream(step::STREAM_READ, e.message).to_error_body(),
                    );
                    yield StreamEvent::Done;
                    return;
                }
            };

            match decoder.decode(&raw_event) {
                Ok(events) => {
                    for event in events {
                        if let Some(chunk) = converter.on_event(event) {
                            yield StreamEvent::Chunk(chunk);
                        }
                    }
                }
                Err(message) => {
                    warn!(step = step::DECODE, error = %message, "Undecodable backend event");
                    yield StreamEvent::Error(
                        GatewayError::stream(step::DECODE, message).to_error_body(),
                    );
                    yield StreamEvent::Done;
                    return;
                }
            }
        }
        drop(raw);

        for event in decoder.finish() {
            if let Some(chunk) = converter.on_event(event) {
                yield StreamEvent::Chunk(chunk);
            }
        }

        if converter.usage().is_none() && converter.include_usage() {
            if let Some(accounting) = accounting {
                let completion = converter.completion_text();
                let counted = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    counted = accounting.accountant.usage_for(
                        &accounting.model_id,
                        &accounting.messages,
                        &completion,
                    ) => Some(counted),
                };
                match counted {
                    None => return,
                    Some(Ok(usage)) => converter.set_usage(usage),
                    Some(Err(e)) => {
                        warn!(error = %e, "Token accounting failed at end of stream");
                        yield StreamEvent::Error(e.to_error_body());
                        yield StreamEvent::Done;
                        return;
                    }
                }
            }
        }

        if converter.finish_reason().is_none() {
            debug!("Backend stream closed without a stop event");
        }
        if let Some(chunk) = converter.finish_chunk() {
            yield StreamEvent::Chunk(chunk);
        }
        yield StreamEvent::Done;
    })
}
