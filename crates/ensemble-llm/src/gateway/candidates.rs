//! Candidate list resolution
//!
//! Turns the agent binding plus the current provider mode into the ordered
//! list of (provider, model) pairs the invoke loop will attempt.

use super::{AgentBinding, ProviderGateway, ProviderMode};
use crate::error::{Error, Result};
use crate::provider::ChatProvider;
use std::sync::Arc;
use tracing::debug;

/// One resolved (provider, model) attempt slot
#[derive(Clone)]
pub struct Candidate {
    /// Provider code
    pub name: String,
    /// Provider handle
    pub provider: Arc<dyn ChatProvider>,
    /// Model the provider will serve this request with
    pub model: String,
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("name", &self.name)
            .field("model", &self.model)
            .finish()
    }
}

impl ProviderGateway {
    /// Build the ordered candidate list for one invocation.
    ///
    /// Single mode: exactly the current provider, paired with the agent's
    /// model if offered, else that provider's closest compatible model.
    ///
    /// Multi mode: the agent's preferred provider first, then every other
    /// provider in the active list that is registered and resolves a
    /// compatible model, in configuration order. Providers outside the
    /// active list are never attempted.
    pub(crate) fn candidates(
        &self,
        binding: &AgentBinding,
        mode: &ProviderMode,
    ) -> Result<Vec<Candidate>> {
        match mode {
            ProviderMode::Single { provider } => {
                let handle = self
                    .get(provider)
                    .ok_or_else(|| Error::NotConfigured(provider.clone()))?;
                let model =
                    handle
                        .resolve_model(&binding.model)
                        .ok_or_else(|| Error::NoCompatibleModel {
                            provider: provider.clone(),
                            model: binding.model.clone(),
                        })?;
                Ok(vec![Candidate {
                    name: provider.clone(),
                    provider: handle,
                    model,
                }])
            }
            ProviderMode::Multi { active } => {
                let mut list = Vec::new();

                if active.iter().any(|name| *name == binding.provider) {
                    if let Some(handle) = self.get(&binding.provider) {
                        if let Some(model) = handle.resolve_model(&binding.model) {
                            list.push(Candidate {
                                name: binding.provider.clone(),
                                provider: handle,
                                model,
                            });
                        }
                    }
                }

                for name in active {
                    if *name == binding.provider {
                        continue;
                    }
                    let Some(handle) = self.get(name) else {
                        continue;
                    };
                    if let Some(model) = handle.resolve_model(&binding.model) {
                        list.push(Candidate {
                            name: name.clone(),
                            provider: handle,
                            model,
                        });
                    }
                }

                if list.is_empty() {
                    return Err(Error::NotConfigured(binding.provider.clone()));
                }

                debug!(
                    agent = %binding.role_tag,
                    candidates = ?list.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                    "resolved candidate list"
                );
                Ok(list)
            }
        }
    }
}
