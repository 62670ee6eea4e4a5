//! Bedrock implementation of [`LLMProvider`].

use super::capabilities::{substitute_max_completion_tokens, CapabilityRegistry};
use super::convert::{to_provider_request, ConvertOptions, ProviderRequest};
use super::events::EventDecoder;
use super::invoke::{BackendInvoker, BedrockRuntime};
use super::registry::{ModelEntry, ModelRegistry};
use super::response::from_provider_reply;
use super::stream::{convert_stream, StreamAccounting, StreamConverter};
use super::usage::UsageAccountant;
use super::BedrockConfig;
use async_trait::async_trait;
use gateway_core::{
    ChatEventStream, GatewayError, GatewayRequest, GatewayResponse, HealthStatus, LLMProvider,
    ModelInfo, ProviderType,
};
use gateway_resilience::{HealthView, RegionHealthTracker};
use gateway_routing::{CrossRegionResolver, ResolvedModel};
use gateway_telemetry::llm_request_span;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

/// Everything decided before the backend is called
#[derive(Debug)]
struct Dispatch<'a> {
    request: Cow<'a, GatewayRequest>,
    entry: ModelEntry,
    provider_request: ProviderRequest,
    route: ResolvedModel,
}

/// Serves uniform chat completions from AWS Bedrock
pub struct BedrockAdapter {
    config: BedrockConfig,
    registry: ModelRegistry,
    capabilities: CapabilityRegistry,
    resolver: CrossRegionResolver,
    health: Arc<RegionHealthTracker>,
    invoker: BackendInvoker,
    accountant: UsageAccountant,
    options: ConvertOptions,
}

impl fmt::Debug for BedrockAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BedrockAdapter")
            .field("id", &self.config.id)
            .field("region", &self.config.region)
            .field("cross_region", &self.config.cross_region)
            .field("health_aware", &self.config.health_aware)
            .finish_non_exhaustive()
    }
}

impl BedrockAdapter {
    /// Adapter with the built-in model and profile tables
    pub fn new(config: BedrockConfig, runtime: Arc<dyn BedrockRuntime>) -> Self {
        let registry = ModelRegistry::new();
        let invoker = BackendInvoker::new(runtime);
        let options = ConvertOptions {
            default_max_tokens: config.default_max_tokens,
        };
        Self {
            capabilities: CapabilityRegistry::new(registry.clone()),
            registry,
            resolver: CrossRegionResolver::new(),
            health: Arc::new(RegionHealthTracker::with_defaults()),
            invoker: invoker.clone(),
            accountant: UsageAccountant::new(invoker),
            options,
            config,
        }
    }

    /// Replace the model registry
    #[must_use]
    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.capabilities = CapabilityRegistry::new(registry.clone());
        self.registry = registry;
        self
    }

    /// Replace the cross-region resolver
    #[must_use]
    pub fn with_resolver(mut self, resolver: CrossRegionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Share a region health tracker
    #[must_use]
    pub fn with_health_tracker(mut self, health: Arc<RegionHealthTracker>) -> Self {
        self.health = health;
        self
    }

    /// Region health tracker fed by this adapter
    #[must_use]
    pub fn health_tracker(&self) -> &Arc<RegionHealthTracker> {
        &self.health
    }

    /// Model registry
    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn prepare<'a>(&self, request: &'a GatewayRequest) -> Result<Dispatch<'a>, GatewayError> {
        request.validate()?;

        let entry = self.registry.resolve(&request.model)?;
        if !entry.family.is_chat() {
            return Err(GatewayError::unsupported_operation(
                &request.model,
                "chat completions",
            ));
        }

        let caps = self.capabilities.capabilities_for(&request.model);
        let request = match substitute_max_completion_tokens(request, &caps) {
            Some(substituted) => Cow::Owned(substituted),
            None => Cow::Borrowed(request),
        };

        let violations = self.capabilities.validate(&request, &request.model);
        if !violations.is_empty() {
            debug!(
                model = %request.model,
                count = violations.len(),
                "Rejecting unsupported parameters"
            );
            return Err(GatewayError::unsupported_parameters(violations));
        }

        let provider_request = to_provider_request(&request, &entry, &self.options)?;
        let route = self.route(&entry.backend_id);

        Ok(Dispatch {
            request,
            entry,
            provider_request,
            route,
        })
    }

    fn route(&self, backend_id: &str) -> ResolvedModel {
        if !self.config.cross_region {
            return CrossRegionResolver::empty().resolve(backend_id, &self.config.region);
        }
        let view = self
            .config
            .health_aware
            .then_some(self.health.as_ref() as &dyn HealthView);
        self.resolver
            .resolve_with_fallback(backend_id, &self.config.region, view)
    }

    /// Successes always count; failures only when the region may be at fault
    fn record_outcome(&self, route_key: &str, latency: Duration, error: Option<&GatewayError>) {
        match error {
            None => self.health.record_success(route_key, latency),
            Some(e) if e.is_retryable() => {
                self.health.record_failure(route_key, latency, &e.to_string());
            }
            Some(_) => {}
        }
    }
}

/// Generated text plus tool arguments, for token counting
fn completion_text(response: &GatewayResponse) -> String {
    let Some(choice) = response.choices.first() else {
        return String::new();
    };
    let mut text = choice.message.content.clone().unwrap_or_default();
    for call in choice.message.tool_calls.iter().flatten() {
        text.push_str(&call.function.arguments);
    }
    text
}

#[async_trait]
impl LLMProvider for BedrockAdapter {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Bedrock
    }

    async fn chat_completion(
        &self,
        request: &GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let dispatch = self.prepare(request)?;
        let span = llm_request_span!(request.id, request.model, dispatch.entry.family, false);

        async move {
            let started = Instant::now();
            let reply = self
                .invoker
                .invoke(&dispatch.route.model_id, &dispatch.provider_request)
                .await;
            self.record_outcome(&dispatch.route.route_key, started.elapsed(), reply.as_ref().err());
            if let Err(e) = &reply {
                warn!(error = %e, "Bedrock call failed");
            }
            let reply = reply?;

            let mut response = from_provider_reply(&reply, &request.model)?;
            if response.usage.is_none() {
                debug!("No usage in reply, counting tokens");
                let usage = self
                    .accountant
                    .usage_for(
                        &dispatch.entry.backend_id,
                        &dispatch.request.messages,
                        &completion_text(&response),
                    )
                    .await?;
                response.usage = Some(usage);
            }

            debug!(
                finish_reason = ?response.finish_reason(),
                latency_ms = started.elapsed().as_millis() as u64,
                "Bedrock call completed"
            );
            Ok(response)
        }
        .instrument(span)
        .await
    }

    async fn chat_completion_stream(
        &self,
        request: &GatewayRequest,
        cancel: CancellationToken,
    ) -> Result<ChatEventStream, GatewayError> {
        let dispatch = self.prepare(request)?;
        let span = llm_request_span!(request.id, request.model, dispatch.entry.family, true);

        async move {
            let started = Instant::now();
            let opened = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(GatewayError::Cancelled),
                opened = self
                    .invoker
                    .invoke_stream(&dispatch.route.model_id, &dispatch.provider_request) => opened,
            };
            self.record_outcome(&dispatch.route.route_key, started.elapsed(), opened.as_ref().err());
            if let Err(e) = &opened {
                warn!(error = %e, "Bedrock stream failed to open");
            }
            let raw = opened?;

            let include_usage = request.include_stream_usage();
            let accounting = include_usage.then(|| StreamAccounting {
                accountant: self.accountant.clone(),
                model_id: dispatch.entry.backend_id.clone(),
                messages: dispatch.request.messages.clone(),
            });
            debug!("Bedrock stream opened");

            Ok(convert_stream(
                raw,
                EventDecoder::for_request(&dispatch.provider_request),
                StreamConverter::new(request.model.clone(), include_usage),
                accounting,
                cancel,
            ))
        }
        .instrument(span)
        .await
    }

    async fn health_check(&self) -> HealthStatus {
        self.health.overall_status()
    }

    fn models(&self) -> Vec<ModelInfo> {
        self.registry.models()
    }
}
