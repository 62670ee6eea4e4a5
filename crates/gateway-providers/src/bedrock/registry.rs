//! Model registry: public model names and resource ids to provider families.
//!
//! Lookup runs in three steps:
//!
//! 1. exact match against the static name table (public names and the
//!    backend ids they point at)
//! 2. the ordered pattern list below, first match wins
//! 3. `model_not_found`
//!
//! Patterns are substrings so they also match resource ARNs and
//! region-qualified ids. Non-chat markers are tested first so that
//! `amazon.titan-embed-*` is an embedding model, not a Titan text model.

use super::family::ProviderFamily;
use gateway_core::{GatewayError, ModelInfo};
use std::collections::HashMap;

/// Registry entry for a resolved model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    /// Name as the client sent it
    pub public_name: String,
    /// Bedrock model id (or ARN) to invoke
    pub backend_id: String,
    /// Provider family
    pub family: ProviderFamily,
}

/// Ordered resource-identifier patterns
const FAMILY_PATTERNS: &[(&str, ProviderFamily)] = &[
    ("embed", ProviderFamily::Embedding),
    ("image", ProviderFamily::ImageGeneration),
    ("canvas", ProviderFamily::ImageGeneration),
    ("stability.", ProviderFamily::ImageGeneration),
    ("anthropic.", ProviderFamily::Claude),
    ("amazon.nova", ProviderFamily::Nova),
    ("deepseek", ProviderFamily::DeepSeek),
    ("meta.llama", ProviderFamily::Llama),
    ("mistral.", ProviderFamily::Mistral),
    ("cohere.command", ProviderFamily::Cohere),
    ("ai21.", ProviderFamily::Ai21),
    ("amazon.titan-text", ProviderFamily::Titan),
];

/// `(public name, backend id, family)`
const DEFAULT_MODELS: &[(&str, &str, ProviderFamily)] = &[
    // Anthropic
    ("claude-3-haiku", "anthropic.claude-3-haiku-20240307-v1:0", ProviderFamily::Claude),
    ("claude-3-sonnet", "anthropic.claude-3-sonnet-20240229-v1:0", ProviderFamily::Claude),
    ("claude-3-opus", "anthropic.claude-3-opus-20240229-v1:0", ProviderFamily::Claude),
    ("claude-3-5-haiku", "anthropic.claude-3-5-haiku-20241022-v1:0", ProviderFamily::Claude),
    ("claude-3-5-sonnet", "anthropic.claude-3-5-sonnet-20241022-v2:0", ProviderFamily::Claude),
    ("claude-3-5-sonnet-20240620", "anthropic.claude-3-5-sonnet-20240620-v1:0", ProviderFamily::Claude),
    ("claude-3-7-sonnet", "anthropic.claude-3-7-sonnet-20250219-v1:0", ProviderFamily::Claude),
    ("claude-sonnet-4", "anthropic.claude-sonnet-4-20250514-v1:0", ProviderFamily::Claude),
    ("claude-opus-4", "anthropic.claude-opus-4-20250514-v1:0", ProviderFamily::Claude),
    ("claude-opus-4-1", "anthropic.claude-opus-4-1-20250805-v1:0", ProviderFamily::Claude),
    ("claude-sonnet-4-5", "anthropic.claude-sonnet-4-5-20250929-v1:0", ProviderFamily::Claude),
    ("claude-haiku-4-5", "anthropic.claude-haiku-4-5-20251001-v1:0", ProviderFamily::Claude),
    // Amazon
    ("nova-micro", "amazon.nova-micro-v1:0", ProviderFamily::Nova),
    ("nova-lite", "amazon.nova-lite-v1:0", ProviderFamily::Nova),
    ("nova-pro", "amazon.nova-pro-v1:0", ProviderFamily::Nova),
    ("nova-premier", "amazon.nova-premier-v1:0", ProviderFamily::Nova),
    ("titan-text-express", "amazon.titan-text-express-v1", ProviderFamily::Titan),
    ("titan-text-lite", "amazon.titan-text-lite-v1", ProviderFamily::Titan),
    ("titan-text-premier", "amazon.titan-text-premier-v1:0", ProviderFamily::Titan),
    ("titan-embed-text-v2", "amazon.titan-embed-text-v2:0", ProviderFamily::Embedding),
    ("titan-image-generator-v2", "amazon.titan-image-generator-v2:0", ProviderFamily::ImageGeneration),
    ("nova-canvas", "amazon.nova-canvas-v1:0", ProviderFamily::ImageGeneration),
    // Meta
    ("llama2-13b-chat", "meta.llama2-13b-chat-v1", ProviderFamily::Llama),
    ("llama2-70b-chat", "meta.llama2-70b-chat-v1", ProviderFamily::Llama),
    ("llama3-8b-instruct", "meta.llama3-8b-instruct-v1:0", ProviderFamily::Llama),
    ("llama3-70b-instruct", "meta.llama3-70b-instruct-v1:0", ProviderFamily::Llama),
    ("llama3-1-8b-instruct", "meta.llama3-1-8b-instruct-v1:0", ProviderFamily::Llama),
    ("llama3-1-70b-instruct", "meta.llama3-1-70b-instruct-v1:0", ProviderFamily::Llama),
    ("llama3-1-405b-instruct", "meta.llama3-1-405b-instruct-v1:0", ProviderFamily::Llama),
    ("llama3-2-1b-instruct", "meta.llama3-2-1b-instruct-v1:0", ProviderFamily::Llama),
    ("llama3-2-3b-instruct", "meta.llama3-2-3b-instruct-v1:0", ProviderFamily::Llama),
    ("llama3-2-11b-instruct", "meta.llama3-2-11b-instruct-v1:0", ProviderFamily::Llama),
    ("llama3-2-90b-instruct", "meta.llama3-2-90b-instruct-v1:0", ProviderFamily::Llama),
    ("llama3-3-70b-instruct", "meta.llama3-3-70b-instruct-v1:0", ProviderFamily::Llama),
    ("llama4-scout-17b-instruct", "meta.llama4-scout-17b-instruct-v1:0", ProviderFamily::Llama),
    ("llama4-maverick-17b-instruct", "meta.llama4-maverick-17b-instruct-v1:0", ProviderFamily::Llama),
    // Mistral
    ("mistral-7b-instruct", "mistral.mistral-7b-instruct-v0:2", ProviderFamily::Mistral),
    ("mixtral-8x7b-instruct", "mistral.mixtral-8x7b-instruct-v0:1", ProviderFamily::Mistral),
    ("mistral-large", "mistral.mistral-large-2407-v1:0", ProviderFamily::Mistral),
    ("mistral-small", "mistral.mistral-small-2402-v1:0", ProviderFamily::Mistral),
    ("pixtral-large", "mistral.pixtral-large-2502-v1:0", ProviderFamily::Mistral),
    // DeepSeek
    ("deepseek-r1", "deepseek.r1-v1:0", ProviderFamily::DeepSeek),
    // Cohere
    ("command-r", "cohere.command-r-v1:0", ProviderFamily::Cohere),
    ("command-r-plus", "cohere.command-r-plus-v1:0", ProviderFamily::Cohere),
    // AI21
    ("jamba-1-5-mini", "ai21.jamba-1-5-mini-v1:0", ProviderFamily::Ai21),
    ("jamba-1-5-large", "ai21.jamba-1-5-large-v1:0", ProviderFamily::Ai21),
];

/// Immutable name-to-family table, built once at startup
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: HashMap<String, (String, ProviderFamily)>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        let mut registry = Self {
            entries: HashMap::with_capacity(DEFAULT_MODELS.len() * 2),
        };
        for (name, backend_id, family) in DEFAULT_MODELS {
            registry.insert(name, backend_id, *family);
            registry.insert(backend_id, backend_id, *family);
        }
        registry
    }
}

impl ModelRegistry {
    /// Registry with the built-in model table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an alias. An existing name is replaced, keeping one family per name.
    #[must_use]
    pub fn with_alias(
        mut self,
        name: impl Into<String>,
        backend_id: impl Into<String>,
        family: ProviderFamily,
    ) -> Self {
        self.insert(&name.into(), &backend_id.into(), family);
        self
    }

    fn insert(&mut self, name: &str, backend_id: &str, family: ProviderFamily) {
        self.entries
            .insert(name.to_string(), (backend_id.to_string(), family));
    }

    /// Family for an identifier by pattern, without consulting the name table
    #[must_use]
    pub fn family_by_pattern(model_id: &str) -> Option<ProviderFamily> {
        let lowered = model_id.to_ascii_lowercase();
        FAMILY_PATTERNS
            .iter()
            .find(|(pattern, _)| lowered.contains(pattern))
            .map(|(_, family)| *family)
    }

    /// Resolve a model name, backend id, or ARN
    pub fn resolve(&self, model: &str) -> Result<ModelEntry, GatewayError> {
        let name = model.trim();
        if let Some((backend_id, family)) = self.entries.get(name) {
            return Ok(ModelEntry {
                public_name: name.to_string(),
                backend_id: backend_id.clone(),
                family: *family,
            });
        }

        Self::family_by_pattern(name)
            .map(|family| ModelEntry {
                public_name: name.to_string(),
                backend_id: name.to_string(),
                family,
            })
            .ok_or_else(|| GatewayError::model_not_found(name))
    }

    /// Public chat model names with their backend ids
    #[must_use]
    pub fn models(&self) -> Vec<ModelInfo> {
        let mut models: Vec<ModelInfo> = self
            .entries
            .iter()
            .filter(|(name, (backend_id, family))| family.is_chat() && *name != backend_id)
            .map(|(name, (backend_id, family))| {
                ModelInfo::new(name.clone())
                    .with_backend_id(backend_id.clone())
                    .with_family(family.as_str())
            })
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        models
    }
}
