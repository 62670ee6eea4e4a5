//! In-memory Bedrock runtime with scripted stream events
//!
//! Streams can be left open after their scripted events so tests can
//! observe cancellation and backend-stream closure deterministically.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use gateway_providers::bedrock::invoke::{InvokeOutput, RawEvent, RawEventStream, RuntimeError};
use gateway_providers::BedrockRuntime;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counts how many times the backend stream handle was dropped
#[derive(Debug, Default, Clone)]
pub struct CloseCounter(Arc<AtomicUsize>);

impl CloseCounter {
    /// Times the stream was closed
    pub fn closed(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

struct CloseGuard(CloseCounter);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        (self.0).0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted runtime
#[derive(Default)]
pub struct ScriptedBackend {
    events: Mutex<Vec<RawEvent>>,
    hold_open: bool,
    reply: Mutex<Option<Value>>,
    counted_tokens: u32,
    closes: CloseCounter,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    /// Stream that yields `events` and then ends
    pub fn streaming(events: Vec<RawEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Self::default()
        }
    }

    /// Stream that yields `events` and then never ends
    pub fn held_open(events: Vec<RawEvent>) -> Self {
        Self {
            hold_open: true,
            ..Self::streaming(events)
        }
    }

    /// Non-streaming reply body
    pub fn replying(body: Value) -> Self {
        Self {
            reply: Mutex::new(Some(body)),
            ..Self::default()
        }
    }

    /// Answer every count-tokens call with `tokens`
    #[must_use]
    pub fn with_counted_tokens(mut self, tokens: u32) -> Self {
        self.counted_tokens = tokens;
        self
    }

    /// Stream close counter
    pub fn closes(&self) -> CloseCounter {
        self.closes.clone()
    }

    /// (operation, model id) of every call so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &str, model_id: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((operation.to_string(), model_id.to_string()));
    }

    fn stream(&self) -> RawEventStream {
        let events: Vec<Result<RawEvent, RuntimeError>> =
            self.events.lock().unwrap().drain(..).map(Ok).collect();
        let guard = CloseGuard(self.closes.clone());
        let scripted = stream::iter(events);
        let tail = if self.hold_open {
            stream::pending::<Result<RawEvent, RuntimeError>>().boxed()
        } else {
            stream::empty::<Result<RawEvent, RuntimeError>>().boxed()
        };
        scripted
            .chain(tail)
            .map(move |event| {
                let _keep = &guard;
                event
            })
            .boxed()
    }

    fn output(&self) -> Result<InvokeOutput, RuntimeError> {
        self.reply
            .lock()
            .unwrap()
            .clone()
            .map(InvokeOutput::new)
            .ok_or_else(|| RuntimeError::service("no scripted reply", 500))
    }
}

#[async_trait]
impl BedrockRuntime for ScriptedBackend {
    async fn converse(&self, model_id: &str, _body: &Value) -> Result<InvokeOutput, RuntimeError> {
        self.record("converse", model_id);
        self.output()
    }

    async fn converse_stream(
        &self,
        model_id: &str,
        _body: &Value,
    ) -> Result<RawEventStream, RuntimeError> {
        self.record("converse-stream", model_id);
        Ok(self.stream())
    }

    async fn invoke_model(
        &self,
        model_id: &str,
        _body: &Value,
    ) -> Result<InvokeOutput, RuntimeError> {
        self.record("invoke", model_id);
        self.output()
    }

    async fn invoke_model_stream(
        &self,
        model_id: &str,
        _body: &Value,
    ) -> Result<RawEventStream, RuntimeError> {
        self.record("invoke-with-response-stream", model_id);
        Ok(self.stream())
    }

    async fn count_tokens(&self, model_id: &str, _body: &Value) -> Result<u32, RuntimeError> {
        self.record("count-tokens", model_id);
        Ok(self.counted_tokens)
    }
}
