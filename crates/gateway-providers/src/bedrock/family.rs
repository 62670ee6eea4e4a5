//! Bedrock provider families and their per-family facts.

use std::fmt;

/// Group of Bedrock models sharing one wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    /// Anthropic Claude models
    Claude,
    /// Amazon Nova models
    Nova,
    /// Amazon Titan text models
    Titan,
    /// Meta Llama models
    Llama,
    /// Mistral models
    Mistral,
    /// DeepSeek models
    DeepSeek,
    /// Cohere Command models
    Cohere,
    /// AI21 Jamba models
    Ai21,
    /// Embedding-only models
    Embedding,
    /// Image-generation models
    ImageGeneration,
}

/// How a family carries tool definitions to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolTransport {
    /// The unified Converse API carries tools
    Converse,
    /// Tools require a raw model invocation with a family-specific body
    InvokeModel,
    /// The family cannot call tools
    Unsupported,
}

impl ProviderFamily {
    /// Display name used in logs and error messages
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::Nova => "Nova",
            Self::Titan => "Titan",
            Self::Llama => "Llama",
            Self::Mistral => "Mistral",
            Self::DeepSeek => "DeepSeek",
            Self::Cohere => "Cohere",
            Self::Ai21 => "AI21",
            Self::Embedding => "Embedding",
            Self::ImageGeneration => "ImageGeneration",
        }
    }

    /// Whether the family serves chat completions
    #[must_use]
    pub fn is_chat(self) -> bool {
        !matches!(self, Self::Embedding | Self::ImageGeneration)
    }

    /// Call shape used when the request carries tools
    #[must_use]
    pub fn tool_transport(self) -> ToolTransport {
        match self {
            Self::Claude | Self::Mistral | Self::Llama => ToolTransport::InvokeModel,
            Self::Nova | Self::Cohere => ToolTransport::Converse,
            Self::Titan
            | Self::DeepSeek
            | Self::Ai21
            | Self::Embedding
            | Self::ImageGeneration => ToolTransport::Unsupported,
        }
    }

    /// Whether Converse accepts a separate system slot for this family
    #[must_use]
    pub fn supports_system_slot(self) -> bool {
        !matches!(self, Self::Titan)
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Llama prompt-template generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlamaGeneration {
    /// Llama 2: `[INST]` turns, end-of-turn `</s>`
    Llama2,
    /// Llama 3 and later: header tokens, end-of-turn `<|eot_id|>`
    Llama3,
}

impl LlamaGeneration {
    /// Select the template from the model id
    #[must_use]
    pub fn from_model_id(model_id: &str) -> Self {
        if model_id.to_ascii_lowercase().contains("llama2") {
            Self::Llama2
        } else {
            Self::Llama3
        }
    }

    /// End-of-turn delimiter
    #[must_use]
    pub fn end_of_turn(self) -> &'static str {
        match self {
            Self::Llama2 => "</s>",
            Self::Llama3 => "<|eot_id|>",
        }
    }
}
