//! Error taxonomy for the gateway.
//!
//! Every failure the adapter core can produce falls into one of three
//! caller-visible classes:
//!
//! - **client** errors (unknown model, unsupported parameter, malformed
//!   request) are never retried and are surfaced verbatim with a stable code;
//! - **backend** errors (call failed, stream aborted) carry the name of the
//!   step that failed; retrying is the caller's decision;
//! - **accounting** errors (token counting failed) are surfaced instead of
//!   being replaced by an estimate.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Result alias used throughout the gateway crates
pub type GatewayResult<T> = Result<T, GatewayError>;

/// A single request parameter the target model cannot honour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedParam {
    /// Request field name as the client sent it (e.g. `tools`)
    pub name: String,
    /// Human-readable reason
    pub reason: String,
}

impl UnsupportedParam {
    /// Create a new violation record
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Coarse error class, used for retry and billing decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller must fix the request
    Client,
    /// Backend call or stream failed
    Backend,
    /// Token accounting failed
    Accounting,
    /// Misconfiguration or bug inside the gateway
    Internal,
}

/// Gateway error type
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Requested model is not registered
    #[error("Model not found: {model}")]
    ModelNotFound {
        /// Model name as requested
        model: String,
    },

    /// One or more request parameters are unsupported by the target model
    #[error("{}", render_violations(.violations))]
    UnsupportedParameter {
        /// Every offending parameter, in request-field order
        violations: Vec<UnsupportedParam>,
    },

    /// The model exists but cannot serve this kind of request
    #[error("Model '{model}' does not support {operation}")]
    UnsupportedOperation {
        /// Model name
        model: String,
        /// Operation that was attempted (e.g. "chat completions")
        operation: String,
    },

    /// Malformed request
    #[error("Validation error: {message}")]
    Validation {
        /// Error message
        message: String,
        /// Offending field, if known
        field: Option<String>,
        /// Stable machine-readable code
        code: String,
    },

    /// A backend call failed
    #[error("Bedrock {step} failed: {message}")]
    Backend {
        /// Step that failed (`converse`, `invoke`, `stream-open`, ...)
        step: String,
        /// Backend or transport message
        message: String,
        /// HTTP status returned by the backend, if any
        status: Option<u16>,
        /// Whether the caller may retry
        retryable: bool,
    },

    /// The backend event stream broke after it was opened
    #[error("Stream aborted during {step}: {message}")]
    Stream {
        /// Step that failed (`stream-read`, `decode`, ...)
        step: String,
        /// Error message
        message: String,
    },

    /// Token counting failed
    #[error("Token accounting failed: {message}")]
    Accounting {
        /// Error message
        message: String,
    },

    /// Backend rejected our credentials
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error message
        message: String,
    },

    /// Invalid gateway configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Internal gateway error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

fn render_violations(violations: &[UnsupportedParam]) -> String {
    match violations {
        [] => "Unsupported parameter".to_string(),
        [single] => format!("Unsupported parameter '{}': {}", single.name, single.reason),
        many => {
            let items = many
                .iter()
                .enumerate()
                .map(|(i, v)| format!("{}. '{}': {}", i + 1, v.name, v.reason))
                .collect::<Vec<_>>()
                .join("; ");
            format!("Unsupported parameters ({}): {items}", many.len())
        }
    }
}

impl GatewayError {
    /// Create a model-not-found error
    pub fn model_not_found(model: impl Into<String>) -> Self {
        Self::ModelNotFound {
            model: model.into(),
        }
    }

    /// Create an unsupported-parameter error from the full violation list
    pub fn unsupported_parameters(violations: Vec<UnsupportedParam>) -> Self {
        Self::UnsupportedParameter { violations }
    }

    /// Create an unsupported-operation error
    pub fn unsupported_operation(model: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            model: model.into(),
            operation: operation.into(),
        }
    }

    /// Create a validation error
    pub fn validation(
        message: impl Into<String>,
        field: Option<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field,
            code: code.into(),
        }
    }

    /// Create a backend error for the given step
    pub fn backend(
        step: impl Into<String>,
        message: impl Into<String>,
        status: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Backend {
            step: step.into(),
            message: message.into(),
            status,
            retryable,
        }
    }

    /// Create a stream error for the given step
    pub fn stream(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stream {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Create an accounting error
    pub fn accounting(message: impl Into<String>) -> Self {
        Self::Accounting {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Taxonomy class of this error
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ModelNotFound { .. }
            | Self::UnsupportedParameter { .. }
            | Self::UnsupportedOperation { .. }
            | Self::Validation { .. }
            | Self::Cancelled => ErrorCategory::Client,
            Self::Backend { .. } | Self::Stream { .. } | Self::Authentication { .. } => {
                ErrorCategory::Backend
            }
            Self::Accounting { .. } => ErrorCategory::Accounting,
            Self::Configuration { .. } | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// HTTP-equivalent status code
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ModelNotFound { .. } => 404,
            Self::UnsupportedParameter { .. }
            | Self::UnsupportedOperation { .. }
            | Self::Validation { .. } => 400,
            Self::Cancelled => 499,
            Self::Authentication { .. } => 401,
            Self::Backend { status, .. } => match status {
                Some(429) => 429,
                Some(s) if *s >= 500 => 502,
                Some(s) if *s >= 400 => *s,
                _ => 502,
            },
            Self::Stream { .. } => 502,
            Self::Accounting { .. } | Self::Configuration { .. } | Self::Internal { .. } => 500,
        }
    }

    /// Stable machine-readable error code
    #[must_use]
    pub fn error_code(&self) -> &str {
        match self {
            Self::ModelNotFound { .. } => "model_not_found",
            Self::UnsupportedParameter { .. } => "unsupported_parameter",
            Self::UnsupportedOperation { .. } => "unsupported_model_operation",
            Self::Validation { code, .. } => code,
            Self::Backend { .. } => "backend_error",
            Self::Stream { .. } => "stream_error",
            Self::Accounting { .. } => "accounting_error",
            Self::Authentication { .. } => "authentication_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Cancelled => "request_cancelled",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// OpenAI-style error `type` string
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Client => "invalid_request_error",
            ErrorCategory::Backend => "upstream_error",
            ErrorCategory::Accounting | ErrorCategory::Internal => "server_error",
        }
    }

    /// Whether the caller may retry the same request
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Parameter the error refers to, if any
    #[must_use]
    pub fn param(&self) -> Option<String> {
        match self {
            Self::Validation { field, .. } => field.clone(),
            Self::UnsupportedParameter { violations } if violations.len() == 1 => {
                violations.first().map(|v| v.name.clone())
            }
            _ => None,
        }
    }

    /// Render the OpenAI-compatible error body
    #[must_use]
    pub fn to_error_body(&self) -> serde_json::Value {
        json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": self.error_code(),
                "param": self.param(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_violation_message() {
        let err = GatewayError::unsupported_parameters(vec![UnsupportedParam::new(
            "tools",
            "tool calling is not supported by the Titan model family",
        )]);

        assert_eq!(
            err.to_string(),
            "Unsupported parameter 'tools': tool calling is not supported by the Titan model family"
        );
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "unsupported_parameter");
        assert_eq!(err.param().as_deref(), Some("tools"));
        assert_eq!(err.category(), ErrorCategory::Client);
    }

    #[test]
    fn test_multiple_violations_are_itemized() {
        let err = GatewayError::unsupported_parameters(vec![
            UnsupportedParam::new("tools", "no tools"),
            UnsupportedParam::new("logprobs", "no logprobs"),
        ]);

        let message = err.to_string();
        assert!(message.starts_with("Unsupported parameters (2):"));
        assert!(message.contains("1. 'tools': no tools"));
        assert!(message.contains("2. 'logprobs': no logprobs"));
        assert_eq!(err.param(), None);
    }

    #[test]
    fn test_client_errors_never_retryable() {
        assert!(!GatewayError::model_not_found("x").is_retryable());
        assert!(!GatewayError::validation("bad", None, "invalid_request_error").is_retryable());
        assert!(GatewayError::backend("converse", "throttled", Some(429), true).is_retryable());
    }

    #[test]
    fn test_backend_status_mapping() {
        assert_eq!(
            GatewayError::backend("invoke", "boom", Some(503), true).status_code(),
            502
        );
        assert_eq!(
            GatewayError::backend("invoke", "slow down", Some(429), true).status_code(),
            429
        );
        assert_eq!(
            GatewayError::backend("invoke", "bad body", Some(400), false).status_code(),
            400
        );
        assert_eq!(GatewayError::backend("invoke", "io", None, true).status_code(), 502);
    }

    #[test]
    fn test_backend_error_keeps_step() {
        let err = GatewayError::backend("stream-open", "connection reset", None, true);
        assert_eq!(err.to_string(), "Bedrock stream-open failed: connection reset");
        assert_eq!(err.category(), ErrorCategory::Backend);
    }

    #[test]
    fn test_error_body_shape() {
        let body = GatewayError::model_not_found("gpt-9").to_error_body();
        assert_eq!(body["error"]["code"], "model_not_found");
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["message"], "Model not found: gpt-9");
    }

    #[test]
    fn test_accounting_category() {
        let err = GatewayError::accounting("count-tokens unavailable");
        assert_eq!(err.category(), ErrorCategory::Accounting);
        assert_eq!(err.status_code(), 500);
        assert!(!err.is_retryable());
    }
}
