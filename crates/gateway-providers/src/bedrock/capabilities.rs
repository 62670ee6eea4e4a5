//! Capability registry and request validator.
//!
//! Each provider family has a fixed feature matrix. Model-name heuristics
//! override it for embedding and image-generation models, and for Claude
//! models that accept extended thinking.

use super::family::ProviderFamily;
use super::registry::ModelRegistry;
use gateway_core::{GatewayRequest, UnsupportedParam};

/// Optional request features a model supports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityMatrix {
    /// `tools` and `tool_choice`
    pub supports_tools: bool,
    /// Legacy `functions`
    pub supports_functions: bool,
    /// `logprobs` and `top_logprobs`
    pub supports_logprobs: bool,
    /// Structured `response_format`
    pub supports_response_format: bool,
    /// `reasoning_effort`
    pub supports_reasoning_effort: bool,
    /// Non-text `modalities`
    pub supports_modalities: bool,
    /// `audio`
    pub supports_audio: bool,
    /// `web_search_options`
    pub supports_web_search: bool,
    /// `thinking`
    pub supports_thinking: bool,
    /// `logit_bias`
    pub supports_logit_bias: bool,
    /// `service_tier`
    pub supports_service_tier: bool,
    /// `parallel_tool_calls`
    pub supports_parallel_tool_calls: bool,
    /// `stop`
    pub supports_stop: bool,
    /// Image generation endpoint
    pub supports_image_generation: bool,
    /// Embedding endpoint
    pub supports_embedding: bool,
    /// `max_completion_tokens` as a distinct field
    pub supports_max_completion_tokens: bool,
}

impl CapabilityMatrix {
    /// Everything off
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Baseline matrix of a family
    #[must_use]
    pub fn for_family(family: ProviderFamily) -> Self {
        let chat = Self {
            supports_stop: true,
            ..Self::none()
        };
        match family {
            ProviderFamily::Claude => Self {
                supports_tools: true,
                supports_parallel_tool_calls: true,
                ..chat
            },
            ProviderFamily::Nova
            | ProviderFamily::Cohere
            | ProviderFamily::Mistral
            | ProviderFamily::Llama => Self {
                supports_tools: true,
                ..chat
            },
            ProviderFamily::Titan | ProviderFamily::DeepSeek | ProviderFamily::Ai21 => chat,
            ProviderFamily::Embedding => Self {
                supports_embedding: true,
                ..Self::none()
            },
            ProviderFamily::ImageGeneration => Self {
                supports_image_generation: true,
                ..Self::none()
            },
        }
    }
}

/// Claude generations that accept extended thinking
const THINKING_MARKERS: &[&str] = &[
    "claude-3-7",
    "claude-sonnet-4",
    "claude-opus-4",
    "claude-haiku-4",
];

/// Process-wide capability lookup
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    models: ModelRegistry,
}

impl CapabilityRegistry {
    /// Capability registry over a model registry
    #[must_use]
    pub fn new(models: ModelRegistry) -> Self {
        Self { models }
    }

    /// Capabilities of a model. Never fails: unknown models get an all-false
    /// matrix unless a name heuristic applies.
    #[must_use]
    pub fn capabilities_for(&self, model_name: &str) -> CapabilityMatrix {
        let (backend_id, family) = match self.models.resolve(model_name) {
            Ok(entry) => (entry.backend_id, Some(entry.family)),
            Err(_) => (model_name.to_string(), None),
        };
        let lowered = backend_id.to_ascii_lowercase();

        if lowered.contains("embed") {
            return CapabilityMatrix::for_family(ProviderFamily::Embedding);
        }
        if lowered.contains("image") || lowered.contains("canvas") {
            return CapabilityMatrix::for_family(ProviderFamily::ImageGeneration);
        }

        let mut matrix = family.map_or_else(CapabilityMatrix::none, CapabilityMatrix::for_family);
        if family == Some(ProviderFamily::Claude)
            && THINKING_MARKERS.iter().any(|marker| lowered.contains(marker))
        {
            matrix.supports_thinking = true;
            matrix.supports_reasoning_effort = true;
        }
        matrix
    }

    /// Every optional field the request sets that the model cannot honour
    #[must_use]
    pub fn validate(&self, request: &GatewayRequest, model_name: &str) -> Vec<UnsupportedParam> {
        let caps = self.capabilities_for(model_name);
        let family = self
            .models
            .resolve(model_name)
            .map_or_else(|_| format!("model '{model_name}'"), |e| {
                format!("the {} model family", e.family)
            });
        let mut violations = Vec::new();
        let mut check = |set: bool, supported: bool, name: &str, feature: &str| {
            if set && !supported {
                violations.push(UnsupportedParam::new(
                    name,
                    format!("{feature} is not supported by {family}"),
                ));
            }
        };

        check(request.has_tools(), caps.supports_tools, "tools", "tool calling");
        check(
            request.tool_choice.is_some(),
            caps.supports_tools,
            "tool_choice",
            "tool choice",
        );
        check(
            request.functions.as_ref().is_some_and(|f| !f.is_empty()),
            caps.supports_functions,
            "functions",
            "legacy function calling",
        );
        check(
            request.logprobs == Some(true),
            caps.supports_logprobs,
            "logprobs",
            "log probabilities",
        );
        check(
            request.top_logprobs.is_some(),
            caps.supports_logprobs,
            "top_logprobs",
            "log probabilities",
        );
        check(
            request
                .response_format
                .as_ref()
                .is_some_and(|f| f.is_structured()),
            caps.supports_response_format,
            "response_format",
            "structured response format",
        );
        check(
            request.reasoning_effort.is_some(),
            caps.supports_reasoning_effort,
            "reasoning_effort",
            "reasoning effort",
        );
        check(
            request
                .modalities
                .as_ref()
                .is_some_and(|m| m.iter().any(|x| x != "text")),
            caps.supports_modalities,
            "modalities",
            "non-text output modalities",
        );
        check(request.audio.is_some(), caps.supports_audio, "audio", "audio output");
        check(
            request.web_search_options.is_some(),
            caps.supports_web_search,
            "web_search_options",
            "web search",
        );
        check(
            request.thinking.as_ref().is_some_and(|t| t.is_enabled()),
            caps.supports_thinking,
            "thinking",
            "extended thinking",
        );
        check(
            request.logit_bias.as_ref().is_some_and(|b| !b.is_empty()),
            caps.supports_logit_bias,
            "logit_bias",
            "logit bias",
        );
        check(
            request.service_tier.is_some(),
            caps.supports_service_tier,
            "service_tier",
            "service tier selection",
        );
        check(
            request.parallel_tool_calls.is_some(),
            caps.supports_parallel_tool_calls,
            "parallel_tool_calls",
            "parallel tool call control",
        );
        check(
            request.stop.as_ref().and_then(|s| s.normalized()).is_some(),
            caps.supports_stop,
            "stop",
            "stop sequences",
        );
        check(
            request.max_completion_tokens.is_some(),
            caps.supports_max_completion_tokens,
            "max_completion_tokens",
            "max_completion_tokens (use max_tokens)",
        );

        violations
    }
}

/// Move `max_completion_tokens` into `max_tokens` when the model only knows
/// the latter. Returns `None` when no substitution is needed.
#[must_use]
pub fn substitute_max_completion_tokens(
    request: &GatewayRequest,
    caps: &CapabilityMatrix,
) -> Option<GatewayRequest> {
    let value = request.max_completion_tokens?;
    if caps.supports_max_completion_tokens {
        return None;
    }
    let mut substituted = request.clone();
    substituted.max_completion_tokens = None;
    if substituted.max_tokens.is_none() {
        substituted.max_tokens = Some(value);
    }
    Some(substituted)
}
