//! Token accounting through the backend's native counter.
//!
//! Only used when the main call reported no usage. A failed count is
//! returned to the caller; there is no local estimate.

use super::convert::converse::{convert_messages, SystemBlock};
use super::convert::split_system;
use super::invoke::BackendInvoker;
use gateway_core::{ChatMessage, GatewayError, Usage};
use serde_json::{json, Value};
use std::fmt;
use tracing::debug;

/// Counts tokens with the backend `count-tokens` call
#[derive(Clone)]
pub struct UsageAccountant {
    invoker: BackendInvoker,
}

impl fmt::Debug for UsageAccountant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsageAccountant").finish_non_exhaustive()
    }
}

impl UsageAccountant {
    /// Accountant counting through `invoker`
    pub fn new(invoker: BackendInvoker) -> Self {
        Self { invoker }
    }

    /// Exact token count of a message list
    pub async fn count_tokens(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
    ) -> Result<u32, GatewayError> {
        let body = count_body(messages)?;
        let tokens = self
            .invoker
            .count_tokens(model_id, &body)
            .await
            .map_err(|e| GatewayError::accounting(e.to_string()))?;
        debug!(model_id, tokens, "Counted tokens");
        Ok(tokens)
    }

    /// Usage of a completed turn. The completion is counted as a single
    /// message; an empty completion counts as zero without a backend call.
    pub async fn usage_for(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        completion: &str,
    ) -> Result<Usage, GatewayError> {
        let prompt_tokens = self.count_tokens(model_id, messages).await?;
        let completion_tokens = if completion.is_empty() {
            0
        } else {
            self.count_tokens(model_id, &[ChatMessage::user(completion)])
                .await?
        };
        Ok(Usage::new(prompt_tokens, completion_tokens))
    }
}

/// `{"input": {"converse": {...}}}` body of the count call
fn count_body(messages: &[ChatMessage]) -> Result<Value, GatewayError> {
    let (system, turns) = split_system(messages);
    let system: Vec<SystemBlock> = system.into_iter().map(SystemBlock::Text).collect();
    let turns = convert_messages(&turns);
    if turns.is_empty() {
        return Err(GatewayError::accounting("no messages to count"));
    }

    let mut converse = json!({ "messages": turns });
    if !system.is_empty() {
        converse["system"] = serde_json::to_value(system)
            .map_err(|e| GatewayError::accounting(e.to_string()))?;
    }
    Ok(json!({ "input": { "converse": converse } }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bedrock::invoke::{BedrockRuntime, InvokeOutput, RawEventStream, RuntimeError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingRuntime {
        bodies: Mutex<Vec<Value>>,
        fail: bool,
    }

    #[async_trait]
    impl BedrockRuntime for CountingRuntime {
        async fn converse(&self, _: &str, _: &Value) -> Result<InvokeOutput, RuntimeError> {
            Err(RuntimeError::transport("unused"))
        }

        async fn converse_stream(&self, _: &str, _: &Value) -> Result<RawEventStream, RuntimeError> {
            Err(RuntimeError::transport("unused"))
        }

        async fn invoke_model(&self, _: &str, _: &Value) -> Result<InvokeOutput, RuntimeError> {
            Err(RuntimeError::transport("unused"))
        }

        async fn invoke_model_stream(
            &self,
            _: &str,
            _: &Value,
        ) -> Result<RawEventStream, RuntimeError> {
            Err(RuntimeError::transport("unused"))
        }

        async fn count_tokens(&self, _: &str, body: &Value) -> Result<u32, RuntimeError> {
            if self.fail {
                return Err(RuntimeError::service("count unavailable", 503));
            }
            let mut bodies = self.bodies.lock();
            bodies.push(body.clone());
            Ok(10 * bodies.len() as u32)
        }
    }

    #[tokio::test]
    async fn test_usage_counts_prompt_and_completion() {
        let runtime = Arc::new(CountingRuntime::default());
        let accountant = UsageAccountant::new(BackendInvoker::new(runtime.clone()));
        let messages = vec![ChatMessage::system("Be brief."), ChatMessage::user("Hi")];

        let usage = accountant
            .usage_for("meta.llama3-8b-instruct-v1:0", &messages, "Hello!")
            .await
            .unwrap();

        assert_eq!(usage, Usage::new(10, 20));
        let bodies = runtime.bodies.lock();
        assert_eq!(bodies[0]["input"]["converse"]["system"][0]["text"], "Be brief.");
        assert_eq!(bodies[0]["input"]["converse"]["messages"][0]["role"], "user");
        assert_eq!(
            bodies[1]["input"]["converse"]["messages"][0]["content"][0]["text"],
            "Hello!"
        );
    }

    #[tokio::test]
    async fn test_empty_completion_skips_second_call() {
        let runtime = Arc::new(CountingRuntime::default());
        let accountant = UsageAccountant::new(BackendInvoker::new(runtime.clone()));

        let usage = accountant
            .usage_for("m", &[ChatMessage::user("Hi")], "")
            .await
            .unwrap();

        assert_eq!(usage, Usage::new(10, 0));
        assert_eq!(runtime.bodies.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_count_failure_is_accounting_error() {
        let accountant = UsageAccountant::new(BackendInvoker::new(Arc::new(CountingRuntime {
            fail: true,
            ..CountingRuntime::default()
        })));

        let err = accountant
            .usage_for("m", &[ChatMessage::user("Hi")], "x")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Accounting { .. }));
        assert_eq!(err.error_code(), "accounting_error");
        assert!(err.to_string().contains("count unavailable"), "{err}");
    }
}
