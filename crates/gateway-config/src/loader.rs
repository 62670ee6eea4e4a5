//! File loading and environment overlay.

use crate::error::ConfigError;
use crate::settings::{GatewayConfig, LogFormat};
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;
use validator::Validate;

/// Variables the overlay reads. `BEDROCK_REGION` wins over `AWS_REGION`.
const ENV_VARS: &[&str] = &[
    "BEDROCK_REGION",
    "AWS_REGION",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "BEDROCK_ENDPOINT_URL",
    "GATEWAY_LOG_LEVEL",
    "GATEWAY_LOG_FORMAT",
];

/// Config file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.toml`
    Toml,
}

impl ConfigFormat {
    /// Format from a file extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    /// Parse a document of this format
    pub fn parse(self, contents: &str, path: &Path) -> Result<GatewayConfig, ConfigError> {
        let parsed = match self {
            Self::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }
}

/// Environment variables applied on top of the file
#[derive(Debug, Clone, Default)]
pub struct EnvOverlay {
    vars: HashMap<String, String>,
}

impl EnvOverlay {
    /// Snapshot of the process environment
    #[must_use]
    pub fn from_process() -> Self {
        Self::from_pairs(
            ENV_VARS
                .iter()
                .filter_map(|name| std::env::var(name).ok().map(|value| (*name, value))),
        )
    }

    /// Overlay from explicit pairs; empty values are ignored
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();
        Self { vars }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Apply to a configuration
    pub fn apply(&self, config: &mut GatewayConfig) -> Result<(), ConfigError> {
        if let Some(region) = self.get("BEDROCK_REGION").or_else(|| self.get("AWS_REGION")) {
            config.bedrock.region = region.to_string();
        }
        if let Some(key) = self.get("AWS_ACCESS_KEY_ID") {
            config.bedrock.access_key_id = Some(key.to_string());
        }
        if let Some(secret) = self.get("AWS_SECRET_ACCESS_KEY") {
            config.bedrock.secret_access_key = Some(SecretString::new(secret.to_string()));
        }
        if let Some(token) = self.get("AWS_SESSION_TOKEN") {
            config.bedrock.session_token = Some(SecretString::new(token.to_string()));
        }
        if let Some(url) = self.get("BEDROCK_ENDPOINT_URL") {
            config.bedrock.endpoint_url = Some(url.to_string());
        }
        if let Some(level) = self.get("GATEWAY_LOG_LEVEL") {
            config.logging.level = level.to_string();
        }
        if let Some(format) = self.get("GATEWAY_LOG_FORMAT") {
            config.logging.format =
                format
                    .parse::<LogFormat>()
                    .map_err(|message| ConfigError::Env {
                        var: "GATEWAY_LOG_FORMAT".to_string(),
                        message,
                    })?;
        }
        Ok(())
    }
}

/// Read `path` (if given), overlay the process environment, and validate
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    load_with_overlay(path, &EnvOverlay::from_process())
}

/// [`load_config`] with an explicit overlay
pub fn load_with_overlay(
    path: Option<&Path>,
    overlay: &EnvOverlay,
) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => GatewayConfig::default(),
    };
    overlay.apply(&mut config)?;
    config.validate()?;

    debug!(
        region = %config.bedrock.region,
        cross_region = config.bedrock.cross_region,
        health_aware = config.bedrock.health_aware,
        "Configuration loaded"
    );
    Ok(config)
}

fn read_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    format.parse(&contents, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use std::time::Duration;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_yaml_file() {
        let file = write_temp(
            ".yaml",
            r"
bedrock:
  region: eu-west-1
  timeout: 45s
  default_max_tokens: 1024
  health_aware: false
health:
  failure_threshold: 2
logging:
  format: json
",
        );

        let config = load_with_overlay(Some(file.path()), &EnvOverlay::default()).unwrap();
        assert_eq!(config.bedrock.region, "eu-west-1");
        assert_eq!(config.bedrock.timeout, Duration::from_secs(45));
        assert_eq!(config.bedrock.default_max_tokens, 1024);
        assert!(!config.bedrock.health_aware);
        assert!(config.bedrock.cross_region);
        assert_eq!(config.health.failure_threshold, 2);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_toml_file() {
        let file = write_temp(
            ".toml",
            r#"
[bedrock]
region = "ap-northeast-1"
endpoint_url = "http://localhost:4566"
timeout = "2m"

[streaming]
include_usage = false
"#,
        );

        let config = load_with_overlay(Some(file.path()), &EnvOverlay::default()).unwrap();
        assert_eq!(config.bedrock.region, "ap-northeast-1");
        assert_eq!(config.bedrock.endpoint_url.as_deref(), Some("http://localhost:4566"));
        assert_eq!(config.bedrock.timeout, Duration::from_secs(120));
        assert!(!config.streaming.include_usage);
    }

    #[test]
    fn test_env_overlay_wins() {
        let file = write_temp(".yml", "bedrock:\n  region: us-west-2\n");
        let overlay = EnvOverlay::from_pairs([
            ("AWS_REGION", "eu-central-1"),
            ("BEDROCK_REGION", "us-east-2"),
            ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_SESSION_TOKEN", ""),
            ("GATEWAY_LOG_LEVEL", "debug,hyper=warn"),
        ]);

        let config = load_with_overlay(Some(file.path()), &overlay).unwrap();
        assert_eq!(config.bedrock.region, "us-east-2");
        assert_eq!(config.bedrock.access_key_id.as_deref(), Some("AKIDEXAMPLE"));
        assert_eq!(
            config
                .bedrock
                .secret_access_key
                .as_ref()
                .map(|s| s.expose_secret().as_str()),
            Some("secret")
        );
        assert!(config.bedrock.session_token.is_none());
        assert_eq!(config.logging.level, "debug,hyper=warn");
    }

    #[test]
    fn test_no_file_uses_defaults() {
        let config = load_with_overlay(None, &EnvOverlay::default()).unwrap();
        assert_eq!(config.bedrock.region, "us-east-1");
    }

    #[test]
    fn test_errors() {
        let err = load_with_overlay(Some(Path::new("gateway.json")), &EnvOverlay::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));

        let err = load_with_overlay(Some(Path::new("/nonexistent/gateway.yaml")), &EnvOverlay::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let file = write_temp(".yaml", "bedrock: [not, a, map]\n");
        let err = load_with_overlay(Some(file.path()), &EnvOverlay::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let file = write_temp(".yaml", "health:\n  failure_threshold: 0\n");
        let err = load_with_overlay(Some(file.path()), &EnvOverlay::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let overlay = EnvOverlay::from_pairs([("GATEWAY_LOG_FORMAT", "xml")]);
        let err = load_with_overlay(None, &overlay).unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref var, .. } if var == "GATEWAY_LOG_FORMAT"));
    }
}
