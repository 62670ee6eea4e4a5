//! # Gateway Config
//!
//! Configuration for the Bedrock gateway.
//!
//! Settings are read from a YAML or TOML file (chosen by extension), then
//! overlaid with environment variables, then validated:
//!
//! ```rust,ignore
//! let config = gateway_config::load_config(Some(Path::new("gateway.yaml")))?;
//! println!("region: {}", config.bedrock.region);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod settings;

pub use error::ConfigError;
pub use loader::{load_config, load_with_overlay, ConfigFormat, EnvOverlay};
pub use settings::{
    BedrockSettings, GatewayConfig, HealthSettings, LogFormat, LoggingSettings, StreamingSettings,
};
