//! Configuration schema.

use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bedrock backend settings
    #[validate(nested)]
    pub bedrock: BedrockSettings,

    /// Region health tracking
    #[validate(nested)]
    pub health: HealthSettings,

    /// Streaming behaviour
    pub streaming: StreamingSettings,

    /// Log output
    #[validate(nested)]
    pub logging: LoggingSettings,
}

/// Bedrock backend settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct BedrockSettings {
    /// Region the gateway runs in
    #[validate(length(min = 1, message = "region must not be empty"))]
    pub region: String,

    /// AWS access key ID
    pub access_key_id: Option<String>,

    /// AWS secret access key
    pub secret_access_key: Option<SecretString>,

    /// AWS session token for temporary credentials
    pub session_token: Option<SecretString>,

    /// Runtime endpoint override (VPC endpoints, local mocks)
    #[validate(url)]
    pub endpoint_url: Option<String>,

    /// Per-call timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// `max_tokens` used when a request sends none
    #[validate(range(min = 1))]
    pub default_max_tokens: u32,

    /// Qualify model ids with cross-region inference profiles
    pub cross_region: bool,

    /// Skip profiles whose route is unhealthy
    pub health_aware: bool,
}

impl Default for BedrockSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint_url: None,
            timeout: Duration::from_secs(300),
            default_max_tokens: 4096,
            cross_region: true,
            health_aware: true,
        }
    }
}

/// Region health tracking
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct HealthSettings {
    /// Consecutive failures before a route is marked unhealthy
    #[validate(range(min = 1))]
    pub failure_threshold: u32,

    /// Weight of the newest latency sample in the moving average
    #[validate(range(min = 0.0, max = 1.0))]
    pub latency_smoothing: f64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 4,
            latency_smoothing: 0.3,
        }
    }
}

/// Streaming behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Report usage on the final chunk when the request does not say
    pub include_usage: bool,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            include_usage: true,
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Log output
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level or `EnvFilter` directive
    #[validate(custom(function = "validate_level"))]
    pub level: String,

    /// Line format
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

fn validate_level(level: &str) -> Result<(), ValidationError> {
    if level.trim().is_empty() {
        return Err(ValidationError::new("empty_log_level"));
    }
    Ok(())
}
