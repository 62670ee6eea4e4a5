//! Validated domain newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GatewayError;

/// Error produced when a newtype rejects its input
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct TypeValidationError {
    /// Field that failed validation
    pub field: &'static str,
    /// What was wrong
    pub message: String,
}

impl From<TypeValidationError> for GatewayError {
    fn from(err: TypeValidationError) -> Self {
        let code = format!("invalid_{}", err.field);
        Self::validation(err.to_string(), Some(err.field.to_string()), code)
    }
}

/// Unique request identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random identifier
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-empty model identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelId(String);

impl ModelId {
    const MAX_LEN: usize = 2048;

    /// Validate and wrap a model identifier
    pub fn new(id: &str) -> Result<Self, TypeValidationError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(TypeValidationError {
                field: "model",
                message: "model cannot be empty".to_string(),
            });
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(TypeValidationError {
                field: "model",
                message: format!("model exceeds {} characters", Self::MAX_LEN),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow as string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sampling temperature in `0.0..=2.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f32);

impl Temperature {
    /// Validate a temperature
    pub fn new(value: f32) -> Result<Self, TypeValidationError> {
        if (0.0..=2.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TypeValidationError {
                field: "temperature",
                message: format!("must be between 0.0 and 2.0, got {value}"),
            })
        }
    }

    /// Inner value
    #[must_use]
    pub fn value(self) -> f32 {
        self.0
    }
}

/// Nucleus sampling parameter in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopP(f32);

impl TopP {
    /// Validate a top_p value
    pub fn new(value: f32) -> Result<Self, TypeValidationError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TypeValidationError {
                field: "top_p",
                message: format!("must be between 0.0 and 1.0, got {value}"),
            })
        }
    }

    /// Inner value
    #[must_use]
    pub fn value(self) -> f32 {
        self.0
    }
}

/// Top-k sampling parameter, at least 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopK(u32);

impl TopK {
    /// Validate a top_k value
    pub fn new(value: u32) -> Result<Self, TypeValidationError> {
        if value == 0 {
            return Err(TypeValidationError {
                field: "top_k",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self(value))
    }

    /// Inner value
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}
