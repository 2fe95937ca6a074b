//! Provider gateway - resolution, retry, and failover
//!
//! The gateway owns the provider registry and turns one agent invocation
//! into at most one successful completion:
//!
//! - **single-provider mode** pins every call to the current provider; a
//!   failure is terminal for the step, no failover.
//! - **multi-provider mode** walks an ordered candidate list (preferred
//!   provider first, then the remaining active providers in configuration
//!   order). Transient failures are retried with bounded
//!   backoff before advancing; auth/content-policy failures advance
//!   immediately.
//!
//! # Module structure
//!
//! - `mod.rs`: gateway struct, config, invoke loop
//! - `candidates`: candidate list resolution

mod candidates;

#[cfg(test)]
mod tests;

pub use candidates::Candidate;

use crate::completion::CompletionRequest;
use crate::error::{CandidateFailure, Error, Result};
use crate::message::ChatMessage;
use crate::provider::ChatProvider;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::TokenUsage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Provider resolution policy for one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderMode {
    /// Always use the named provider; failure is terminal for the step
    Single {
        /// Current provider code
        provider: String,
    },
    /// Ordered candidate failover, scoped to the active providers
    Multi {
        /// Provider codes eligible as candidates, in configuration order;
        /// registered providers outside this list are never attempted
        active: Vec<String>,
    },
}

/// Everything the gateway needs to know about the calling agent
#[derive(Debug, Clone)]
pub struct AgentBinding {
    /// Agent role tag, used only for logging
    pub role_tag: String,
    /// Persona prompt, sent as the system turn
    pub system_prompt: String,
    /// Preferred provider code
    pub provider: String,
    /// Requested model code
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Generation ceiling
    pub max_tokens: u32,
}

/// Successful gateway invocation
#[derive(Debug, Clone)]
pub struct GatewayReply {
    /// Generated text
    pub text: String,
    /// Authoritative token usage from the provider
    pub usage: TokenUsage,
    /// Authoritative cost in cents from the provider
    pub cost_cents: u32,
    /// Provider that served the call
    pub provider_used: String,
    /// Model that served the call
    pub model_used: String,
}

/// Gateway tunables
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Fixed per-call timeout bounding every attempt
    pub call_timeout: Duration,
    /// Retry policy applied per candidate
    pub retry: RetryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Create a new config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the per-candidate retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Provider gateway
pub struct ProviderGateway {
    /// Registered providers, looked up by the mode's candidate list
    pub(crate) providers: Vec<(String, Arc<dyn ChatProvider>)>,
    pub(crate) config: GatewayConfig,
}

impl Default for ProviderGateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

impl ProviderGateway {
    /// Create an empty gateway
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            providers: Vec::new(),
            config,
        }
    }

    /// Register a provider. Failover order comes from the mode's active
    /// list, not from registration order; re-registering a name replaces
    /// it in place.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn ChatProvider>) {
        let name = name.into();
        debug!(provider = %name, "registering chat provider");
        if let Some(slot) = self.providers.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = provider;
        } else {
            self.providers.push((name, provider));
        }
    }

    /// Get a provider by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ChatProvider>> {
        self.providers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.clone())
    }

    /// Check if a provider is registered
    #[must_use]
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.iter().any(|(n, _)| n == name)
    }

    /// Registered provider names
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Pre-flight cost estimate for one step, in cents.
    ///
    /// Resolved against the primary candidate's pricing; the authoritative
    /// figure still comes from the completion response.
    pub fn estimate_cost_cents(&self, binding: &AgentBinding, mode: &ProviderMode) -> Result<u32> {
        let candidates = self.candidates(binding, mode)?;
        let primary = candidates
            .first()
            .ok_or_else(|| Error::NotConfigured(binding.provider.clone()))?;
        Ok(primary
            .provider
            .estimate_cost_cents(&primary.model, binding.max_tokens))
    }

    /// Invoke a provider for one agent step.
    ///
    /// `context` is the ordered prior conversation; the binding's persona
    /// prompt is prepended as the system turn.
    #[instrument(skip(self, binding, context), fields(agent = %binding.role_tag))]
    pub async fn invoke(
        &self,
        binding: &AgentBinding,
        context: &[ChatMessage],
        mode: &ProviderMode,
    ) -> Result<GatewayReply> {
        let candidates = self.candidates(binding, mode)?;
        let single = matches!(mode, ProviderMode::Single { .. });
        let mut attempts: Vec<CandidateFailure> = Vec::new();

        for candidate in candidates {
            match self.attempt_candidate(binding, context, &candidate).await {
                Ok(reply) => {
                    info!(
                        provider = %reply.provider_used,
                        model = %reply.model_used,
                        cost_cents = reply.cost_cents,
                        "provider call succeeded"
                    );
                    return Ok(reply);
                }
                Err(e) => {
                    warn!(
                        provider = %candidate.name,
                        error = %e,
                        "candidate failed"
                    );
                    if single {
                        // No failover in single-provider mode
                        return Err(e);
                    }
                    attempts.push(CandidateFailure {
                        provider: candidate.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Err(Error::AllCandidatesExhausted { attempts })
    }

    /// Run one candidate through retry and the per-call timeout
    async fn attempt_candidate(
        &self,
        binding: &AgentBinding,
        context: &[ChatMessage],
        candidate: &Candidate,
    ) -> Result<GatewayReply> {
        let request = CompletionRequest::new(&candidate.model)
            .with_message(ChatMessage::system(&binding.system_prompt))
            .with_messages(context.iter().cloned())
            .with_max_tokens(binding.max_tokens)
            .with_temperature(binding.temperature);

        let timeout = self.config.call_timeout;
        let provider = candidate.provider.clone();

        let response = retry_with_backoff(
            &self.config.retry,
            || {
                let request = request.clone();
                let provider = provider.clone();
                async move {
                    match tokio::time::timeout(timeout, provider.complete(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout(timeout.as_millis() as u64)),
                    }
                }
            },
            |e: &Error| e.is_transient() && !e.is_candidate_fatal(),
        )
        .await
        .map_err(|e| e.last_error)?;

        let usage = response.usage.unwrap_or_default();
        let cost_cents = match response.cost_cents {
            Some(cents) => cents,
            None => {
                warn!(provider = %candidate.name, "provider reported no cost, recording zero");
                0
            }
        };

        Ok(GatewayReply {
            text: response.content,
            usage,
            cost_cents,
            provider_used: candidate.name.clone(),
            model_used: response.model,
        })
    }
}
