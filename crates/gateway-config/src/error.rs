//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to produce a usable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The extension names no supported format
    #[error("Unsupported config format for {path} (expected .yaml, .yml or .toml)")]
    UnsupportedFormat {
        /// File path
        path: PathBuf,
    },

    /// The file is not valid YAML or TOML for the schema
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// An environment variable holds an unusable value
    #[error("Invalid value for {var}: {message}")]
    Env {
        /// Variable name
        var: String,
        /// What is wrong with it
        message: String,
    },

    /// A field failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
