//! Backend stream events.
//!
//! Each wire protocol streams differently. [`EventDecoder`] normalizes the
//! raw events of one protocol into [`BackendEvent`]s, which the stream
//! converter turns into uniform chunks.

use super::convert::llama::{find_stop, parse_tool_calls};
use super::convert::ProviderRequest;
use super::invoke::{BackendProtocol, RawEvent};
use super::response::STOP_SEQUENCE;
use gateway_core::Usage;
use serde_json::Value;
use std::collections::HashSet;

/// Protocol-independent stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// The assistant message began
    MessageStart {
        /// Backend message id, if the protocol reports one
        id: Option<String>,
    },
    /// Answer text
    TextDelta(String),
    /// Reasoning text
    ReasoningDelta(String),
    /// A tool call began
    ToolUseStart {
        /// Content block the call lives in
        block_index: u32,
        /// Tool call id
        id: String,
        /// Tool name
        name: String,
    },
    /// A fragment of tool-call arguments
    ToolUseDelta {
        /// Content block the call lives in
        block_index: u32,
        /// JSON fragment
        partial_json: String,
    },
    /// A content block ended
    ContentBlockStop {
        /// Content block index
        block_index: u32,
    },
    /// The message ended
    MessageStop {
        /// Backend stop reason, untranslated
        stop_reason: String,
    },
    /// Token usage
    Metadata {
        /// Reported usage
        usage: Usage,
    },
}

/// Stateful per-stream decoder
#[derive(Debug)]
pub struct EventDecoder {
    protocol: BackendProtocol,
    started: bool,
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    stop_sequences: Vec<String>,
    /// Set once a stop sequence matched; later text is dropped
    halted: bool,
    buffer: String,
    /// Bytes of `buffer` already emitted
    emitted: usize,
    seen_tool_ids: HashSet<String>,
}

impl From<BackendProtocol> for EventDecoder {
    fn from(protocol: BackendProtocol) -> Self {
        Self::new(protocol)
    }
}

impl EventDecoder {
    /// Decoder for a protocol
    #[must_use]
    pub fn new(protocol: BackendProtocol) -> Self {
        Self {
            protocol,
            started: false,
            prompt_tokens: None,
            completion_tokens: None,
            stop_sequences: Vec::new(),
            halted: false,
            buffer: String::new(),
            emitted: 0,
            seen_tool_ids: HashSet::new(),
        }
    }

    /// Decoder for a request's reply stream
    #[must_use]
    pub fn for_request(request: &ProviderRequest) -> Self {
        Self::new(BackendProtocol::from(request))
            .with_stop_sequences(request.local_stop_sequences().to_vec())
    }

    /// Cut the streamed text at the first of `stops`
    #[must_use]
    pub fn with_stop_sequences(mut self, stops: Vec<String>) -> Self {
        self.stop_sequences = stops.into_iter().filter(|s| !s.is_empty()).collect();
        self
    }

    /// Decode one raw event. Unknown event types decode to nothing.
    pub fn decode(&mut self, event: &RawEvent) -> Result<Vec<BackendEvent>, String> {
        match self.protocol {
            BackendProtocol::Converse => decode_converse(event),
            BackendProtocol::ClaudeMessages => self.decode_claude(&event.payload),
            BackendProtocol::MistralChat => self.decode_mistral(&event.payload),
            BackendProtocol::Llama { tool_mode } => self.decode_llama(&event.payload, tool_mode),
        }
    }

    /// Events still held back when the backend stream ends
    pub fn finish(&mut self) -> Vec<BackendEvent> {
        match self.protocol {
            BackendProtocol::Llama { tool_mode: true } if !self.buffer.is_empty() => {
                self.flush_llama_tool_buffer(None)
            }
            BackendProtocol::Llama { tool_mode: false } if self.emitted < self.buffer.len() => {
                let rest = self.buffer[self.emitted..].to_string();
                self.emitted = self.buffer.len();
                vec![BackendEvent::TextDelta(rest)]
            }
            _ => Vec::new(),
        }
    }

    fn start_once(&mut self, id: Option<String>, out: &mut Vec<BackendEvent>) {
        if !self.started {
            self.started = true;
            out.push(BackendEvent::MessageStart { id });
        }
    }

    fn decode_claude(&mut self, payload: &Value) -> Result<Vec<BackendEvent>, String> {
        let mut out = Vec::new();
        match str_field(payload, "type") {
            Some("message_start") => {
                let message = payload.get("message");
                let id = message
                    .and_then(|m| m.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                self.prompt_tokens = message
                    .and_then(|m| m.pointer("/usage/input_tokens"))
                    .and_then(as_u32);
                self.start_once(id, &mut out);
            }
            Some("content_block_start") => {
                let index = index_field(payload, "index")?;
                let block = payload.get("content_block").unwrap_or(&Value::Null);
                match str_field(block, "type") {
                    Some("tool_use") => out.push(BackendEvent::ToolUseStart {
                        block_index: index,
                        id: str_field(block, "id").unwrap_or_default().to_string(),
                        name: str_field(block, "name").unwrap_or_default().to_string(),
                    }),
                    Some("text") => {
                        if let Some(text) = str_field(block, "text").filter(|t| !t.is_empty()) {
                            out.push(BackendEvent::TextDelta(text.to_string()));
                        }
                    }
                    _ => {}
                }
            }
            Some("content_block_delta") => {
                let index = index_field(payload, "index")?;
                let delta = payload
                    .get("delta")
                    .ok_or("content_block_delta without delta")?;
                match str_field(delta, "type") {
                    Some("text_delta") => out.push(BackendEvent::TextDelta(
                        str_field(delta, "text").unwrap_or_default().to_string(),
                    )),
                    Some("input_json_delta") => out.push(BackendEvent::ToolUseDelta {
                        block_index: index,
                        partial_json: str_field(delta, "partial_json")
                            .unwrap_or_default()
                            .to_string(),
                    }),
                    Some("thinking_delta") => out.push(BackendEvent::ReasoningDelta(
                        str_field(delta, "thinking").unwrap_or_default().to_string(),
                    )),
                    _ => {}
                }
            }
            Some("content_block_stop") => out.push(BackendEvent::ContentBlockStop {
                block_index: index_field(payload, "index")?,
            }),
            Some("message_delta") => {
                if let Some(tokens) = payload.pointer("/usage/output_tokens").and_then(as_u32) {
                    self.completion_tokens = Some(tokens);
                }
                if let Some(reason) = payload.pointer("/delta/stop_reason").and_then(Value::as_str)
                {
                    out.push(BackendEvent::MessageStop {
                        stop_reason: reason.to_string(),
                    });
                }
            }
            Some("message_stop") => {
                let usage = invocation_metrics(payload).or_else(|| {
                    Some(Usage::new(self.prompt_tokens?, self.completion_tokens?))
                });
                if let Some(usage) = usage {
                    out.push(BackendEvent::Metadata { usage });
                }
            }
            _ => {}
        }
        Ok(out)
    }

    fn decode_mistral(&mut self, payload: &Value) -> Result<Vec<BackendEvent>, String> {
        let mut out = Vec::new();
        self.start_once(None, &mut out);

        let choices = payload
            .get("choices")
            .and_then(Value::as_array)
            .ok_or("Mistral chunk without choices")?;
        if let Some(choice) = choices.first() {
            let message = choice
                .get("message")
                .or_else(|| choice.get("delta"))
                .unwrap_or(&Value::Null);
            if let Some(text) = str_field(message, "content").filter(|t| !t.is_empty()) {
                out.push(BackendEvent::TextDelta(text.to_string()));
            }
            for call in message
                .get("tool_calls")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let id = str_field(call, "id").unwrap_or_default().to_string();
                if !self.seen_tool_ids.insert(id.clone()) {
                    continue;
                }
                let block_index = self.seen_tool_ids.len() as u32 - 1;
                let function = call.get("function").unwrap_or(&Value::Null);
                let arguments = match function.get("arguments") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                out.push(BackendEvent::ToolUseStart {
                    block_index,
                    id,
                    name: str_field(function, "name").unwrap_or_default().to_string(),
                });
                out.push(BackendEvent::ToolUseDelta {
                    block_index,
                    partial_json: arguments,
                });
                out.push(BackendEvent::ContentBlockStop { block_index });
            }
            if let Some(reason) = choice
                .get("stop_reason")
                .or_else(|| choice.get("finish_reason"))
                .and_then(Value::as_str)
            {
                out.push(BackendEvent::MessageStop {
                    stop_reason: reason.to_string(),
                });
            }
        }

        if let Some(usage) = invocation_metrics(payload) {
            out.push(BackendEvent::Metadata { usage });
        }
        Ok(out)
    }

    fn decode_llama(&mut self, payload: &Value, tool_mode: bool) -> Result<Vec<BackendEvent>, String> {
        let mut out = Vec::new();
        self.start_once(None, &mut out);

        if let Some(tokens) = payload.get("prompt_token_count").and_then(as_u32) {
            self.prompt_tokens = Some(tokens);
        }
        if let Some(tokens) = payload.get("generation_token_count").and_then(as_u32) {
            self.completion_tokens = Some(tokens);
        }

        let generation = str_field(payload, "generation").unwrap_or_default();
        let stop = str_field(payload, "stop_reason").map(str::to_string);

        let finished = stop.is_some();
        if self.halted {
            // Text after a matched stop sequence is discarded
        } else if tool_mode {
            // Tool calls are only recognizable once the whole completion is in
            self.buffer.push_str(generation);
            if let Some(cut) = find_stop(&self.buffer, &self.stop_sequences) {
                self.buffer.truncate(cut);
                self.halted = true;
                out.extend(self.flush_llama_tool_buffer(Some(STOP_SEQUENCE.to_string())));
            } else if stop.is_some() {
                out.extend(self.flush_llama_tool_buffer(stop));
            }
        } else if self.stop_sequences.is_empty() {
            if !generation.is_empty() {
                out.push(BackendEvent::TextDelta(generation.to_string()));
            }
            if let Some(stop_reason) = stop {
                out.push(BackendEvent::MessageStop { stop_reason });
            }
        } else {
            self.buffer.push_str(generation);
            self.decode_llama_text_with_stops(stop, &mut out);
        }

        let usage = invocation_metrics(payload).or_else(|| {
            if finished {
                Some(Usage::new(self.prompt_tokens?, self.completion_tokens?))
            } else {
                None
            }
        });
        if let Some(usage) = usage {
            out.push(BackendEvent::Metadata { usage });
        }
        Ok(out)
    }

    /// Emit buffered text up to a stop-sequence match. Without a match, a
    /// tail that could still begin a stop sequence is held back.
    fn decode_llama_text_with_stops(
        &mut self,
        stop: Option<String>,
        out: &mut Vec<BackendEvent>,
    ) {
        let (end, stop_reason) = match find_stop(&self.buffer, &self.stop_sequences) {
            Some(cut) => {
                self.halted = true;
                self.buffer.truncate(cut);
                (cut, Some(STOP_SEQUENCE.to_string()))
            }
            None if stop.is_some() => (self.buffer.len(), stop),
            None => {
                let longest = self.stop_sequences.iter().map(String::len).max().unwrap_or(0);
                let mut end = self.buffer.len().saturating_sub(longest.saturating_sub(1));
                while !self.buffer.is_char_boundary(end) {
                    end -= 1;
                }
                (end, None)
            }
        };

        if end > self.emitted {
            out.push(BackendEvent::TextDelta(self.buffer[self.emitted..end].to_string()));
            self.emitted = end;
        }
        if let Some(stop_reason) = stop_reason {
            out.push(BackendEvent::MessageStop { stop_reason });
        }
    }

    fn flush_llama_tool_buffer(&mut self, stop: Option<String>) -> Vec<BackendEvent> {
        let mut out = Vec::new();
        let buffered = std::mem::take(&mut self.buffer);
        match parse_tool_calls(&buffered) {
            Some(calls) => {
                for (i, call) in calls.into_iter().enumerate() {
                    let block_index = i as u32;
                    out.push(BackendEvent::ToolUseStart {
                        block_index,
                        id: call.id,
                        name: call.function.name,
                    });
                    out.push(BackendEvent::ToolUseDelta {
                        block_index,
                        partial_json: call.function.arguments,
                    });
                    out.push(BackendEvent::ContentBlockStop { block_index });
                }
                out.push(BackendEvent::MessageStop {
                    stop_reason: "tool_use".to_string(),
                });
            }
            None => {
                if !buffered.is_empty() {
                    out.push(BackendEvent::TextDelta(buffered));
                }
                if let Some(stop_reason) = stop {
                    out.push(BackendEvent::MessageStop { stop_reason });
                }
            }
        }
        out
    }
}

fn decode_converse(event: &RawEvent) -> Result<Vec<BackendEvent>, String> {
    let payload = &event.payload;
    let event = match event.event_type.as_str() {
        "messageStart" => BackendEvent::MessageStart { id: None },
        "contentBlockStart" => {
            let block_index = index_field(payload, "contentBlockIndex")?;
            match payload.pointer("/start/toolUse") {
                Some(tool) => BackendEvent::ToolUseStart {
                    block_index,
                    id: str_field(tool, "toolUseId").unwrap_or_default().to_string(),
                    name: str_field(tool, "name").unwrap_or_default().to_string(),
                },
                None => return Ok(Vec::new()),
            }
        }
        "contentBlockDelta" => {
            let block_index = index_field(payload, "contentBlockIndex")?;
            let delta = payload
                .get("delta")
                .ok_or("contentBlockDelta without delta")?;
            if let Some(text) = str_field(delta, "text") {
                BackendEvent::TextDelta(text.to_string())
            } else if let Some(input) = delta.pointer("/toolUse/input").and_then(Value::as_str) {
                BackendEvent::ToolUseDelta {
                    block_index,
                    partial_json: input.to_string(),
                }
            } else if let Some(text) = delta.pointer("/reasoningContent/text").and_then(Value::as_str)
            {
                BackendEvent::ReasoningDelta(text.to_string())
            } else {
                return Ok(Vec::new());
            }
        }
        "contentBlockStop" => BackendEvent::ContentBlockStop {
            block_index: index_field(payload, "contentBlockIndex")?,
        },
        "messageStop" => BackendEvent::MessageStop {
            stop_reason: str_field(payload, "stopReason")
                .ok_or("messageStop without stopReason")?
                .to_string(),
        },
        "metadata" => {
            // Usage missing either count is left for the accountant
            let usage = payload.get("usage").and_then(|usage| {
                Some(Usage::from_reported(
                    usage.get("inputTokens").and_then(as_u32)?,
                    usage.get("outputTokens").and_then(as_u32)?,
                    usage.get("totalTokens").and_then(as_u32),
                ))
            });
            match usage {
                Some(usage) => BackendEvent::Metadata { usage },
                None => return Ok(Vec::new()),
            }
        }
        _ => return Ok(Vec::new()),
    };
    Ok(vec![event])
}

/// Usage from `amazon-bedrock-invocationMetrics`, sent on the last chunk
/// of raw invocation streams
pub(crate) fn invocation_metrics(payload: &Value) -> Option<Usage> {
    let metrics = payload.get("amazon-bedrock-invocationMetrics")?;
    Some(Usage::new(
        metrics.get("inputTokenCount").and_then(as_u32)?,
        metrics.get("outputTokenCount").and_then(as_u32)?,
    ))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().map(|n| n as u32)
}

fn index_field(value: &Value, key: &str) -> Result<u32, String> {
    value
        .get(key)
        .and_then(as_u32)
        .ok_or_else(|| format!("event without {key}"))
}
