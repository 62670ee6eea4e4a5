//! # AWS Bedrock adapter
//!
//! Serves OpenAI-style chat completions from Bedrock model families.
//!
//! A request flows through these stages:
//!
//! 1. [`registry::ModelRegistry`] resolves the public model name to a backend
//!    id and a [`ProviderFamily`].
//! 2. [`capabilities::CapabilityRegistry`] rejects optional fields the model
//!    cannot honour, listing every violation at once.
//! 3. [`convert`] builds exactly one provider-native request.
//! 4. The cross-region resolver qualifies the backend id and
//!    [`invoke::BackendInvoker`] calls the runtime.
//! 5. [`response`] or [`stream::StreamConverter`] maps the reply back to the
//!    uniform shape; [`usage::UsageAccountant`] fills in missing token counts.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gateway_providers::bedrock::{BedrockAdapter, BedrockConfig, HttpBedrockRuntime};
//! use std::sync::Arc;
//!
//! let config = BedrockConfig::builder()
//!     .region("us-east-1")
//!     .access_key_id("AKIA...")
//!     .secret_access_key("...")
//!     .build();
//!
//! let runtime = Arc::new(HttpBedrockRuntime::new(&config)?);
//! let adapter = BedrockAdapter::new(config, runtime);
//! ```

pub mod adapter;
pub mod capabilities;
pub mod client;
pub mod convert;
pub mod eventstream;
pub mod events;
pub mod family;
pub mod invoke;
pub mod registry;
pub mod response;
pub mod sigv4;
pub mod stream;
pub mod usage;

pub use adapter::BedrockAdapter;
pub use capabilities::{CapabilityMatrix, CapabilityRegistry};
pub use client::HttpBedrockRuntime;
pub use family::{LlamaGeneration, ProviderFamily, ToolTransport};
pub use invoke::{BackendInvoker, BedrockRuntime, RawEvent, RawEventStream, RuntimeError};
pub use registry::{ModelEntry, ModelRegistry};
pub use usage::UsageAccountant;

use secrecy::SecretString;
use std::time::Duration;

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// AWS Bedrock configuration
#[derive(Debug, Clone)]
pub struct BedrockConfig {
    /// Provider instance ID
    pub id: String,
    /// AWS region the caller runs in (e.g., "us-east-1")
    pub region: String,
    /// AWS access key ID
    pub access_key_id: Option<String>,
    /// AWS secret access key
    pub secret_access_key: Option<SecretString>,
    /// AWS session token (temporary credentials)
    pub session_token: Option<SecretString>,
    /// Custom endpoint URL (testing, VPC endpoints)
    pub endpoint_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// `max_tokens` used when the caller sends none
    pub default_max_tokens: u32,
    /// Qualify model ids with inference-profile prefixes
    pub cross_region: bool,
    /// Skip unhealthy inference profiles
    pub health_aware: bool,
}

impl BedrockConfig {
    /// Create a new builder
    pub fn builder() -> BedrockConfigBuilder {
        BedrockConfigBuilder::default()
    }

    /// Bedrock runtime endpoint
    pub fn base_url(&self) -> String {
        self.endpoint_url.clone().map_or_else(
            || format!("https://bedrock-runtime.{}.amazonaws.com", self.region),
            |url| url.trim_end_matches('/').to_string(),
        )
    }
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for `BedrockConfig`
#[derive(Debug, Default)]
pub struct BedrockConfigBuilder {
    id: Option<String>,
    region: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<SecretString>,
    session_token: Option<SecretString>,
    endpoint_url: Option<String>,
    timeout: Option<Duration>,
    default_max_tokens: Option<u32>,
    cross_region: Option<bool>,
    health_aware: Option<bool>,
}

impl BedrockConfigBuilder {
    /// Set the provider instance ID
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the AWS region
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the AWS access key ID
    pub fn access_key_id(mut self, key: impl Into<String>) -> Self {
        self.access_key_id = Some(key.into());
        self
    }

    /// Set the AWS secret access key
    pub fn secret_access_key(mut self, secret: impl Into<String>) -> Self {
        self.secret_access_key = Some(SecretString::new(secret.into()));
        self
    }

    /// Set the AWS session token
    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(SecretString::new(token.into()));
        self
    }

    /// Set custom endpoint URL
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Set request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the fallback `max_tokens`
    pub fn default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = Some(max_tokens);
        self
    }

    /// Enable or disable cross-region inference profiles
    pub fn cross_region(mut self, enabled: bool) -> Self {
        self.cross_region = Some(enabled);
        self
    }

    /// Enable or disable health-aware profile selection
    pub fn health_aware(mut self, enabled: bool) -> Self {
        self.health_aware = Some(enabled);
        self
    }

    /// Build the configuration
    pub fn build(self) -> BedrockConfig {
        BedrockConfig {
            id: self.id.unwrap_or_else(|| "bedrock".to_string()),
            region: self.region.unwrap_or_else(|| "us-east-1".to_string()),
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            session_token: self.session_token,
            endpoint_url: self.endpoint_url,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            default_max_tokens: self
                .default_max_tokens
                .filter(|v| *v > 0)
                .unwrap_or(convert::DEFAULT_MAX_TOKENS),
            cross_region: self.cross_region.unwrap_or(true),
            health_aware: self.health_aware.unwrap_or(true),
        }
    }
}
