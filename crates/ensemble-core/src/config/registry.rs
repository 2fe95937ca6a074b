//! Configuration registry with atomic snapshot swap
//!
//! Reads never block and never observe a half-written state: the snapshot
//! is an immutable `Arc` swapped as a whole. A run captures one snapshot
//! up front and keeps it for its full duration, so a concurrent mode
//! toggle affects only subsequent runs.

use super::types::{AgentDef, Catalog, FlowDef, ProviderDef, SceneAnalyzerDef};
use crate::error::{Error, Result};
use arc_swap::ArcSwap;
use ensemble_llm::ProviderMode;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One immutable view of the catalog plus the mode flag
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    agents: Vec<AgentDef>,
    flows: HashMap<String, FlowDef>,
    flow_order: Vec<String>,
    providers: Vec<ProviderDef>,
    analyzers: Vec<SceneAnalyzerDef>,
    default_flow: String,
    single_provider_mode: bool,
    current_provider: String,
}

impl ConfigSnapshot {
    fn from_catalog(catalog: &Catalog) -> Result<Self> {
        catalog.validate()?;

        let mut agents: Vec<AgentDef> = catalog
            .agents
            .iter()
            .filter(|a| a.enabled)
            .cloned()
            .collect();
        agents.sort_by_key(|a| a.order);

        let flow_order: Vec<String> = catalog.flows.iter().map(|f| f.name.clone()).collect();
        let flows: HashMap<String, FlowDef> = catalog
            .flows
            .iter()
            .map(|f| (f.name.clone(), f.clone()))
            .collect();

        let current_provider = catalog
            .effective_current_provider()
            .ok_or_else(|| Error::Config("no active provider configured".into()))?;

        Ok(Self {
            agents,
            flows,
            flow_order,
            providers: catalog.providers.clone(),
            analyzers: catalog.scene_analyzers.clone(),
            default_flow: catalog.default_flow.clone(),
            single_provider_mode: catalog.single_provider_mode,
            current_provider,
        })
    }

    /// Enabled agents, sorted by order
    #[must_use]
    pub fn agents(&self) -> &[AgentDef] {
        &self.agents
    }

    /// Look up an enabled agent by role tag
    #[must_use]
    pub fn agent(&self, role_tag: &str) -> Option<&AgentDef> {
        self.agents.iter().find(|a| a.role_tag == role_tag)
    }

    /// Look up a flow by name
    #[must_use]
    pub fn flow(&self, name: &str) -> Option<&FlowDef> {
        self.flows.get(name)
    }

    /// All flows, in catalog order
    #[must_use]
    pub fn flows(&self) -> Vec<&FlowDef> {
        self.flow_order
            .iter()
            .filter_map(|name| self.flows.get(name))
            .collect()
    }

    /// Known flow names, in catalog order
    #[must_use]
    pub fn flow_names(&self) -> Vec<String> {
        self.flow_order.clone()
    }

    /// Name of the statically configured default flow
    #[must_use]
    pub fn default_flow_name(&self) -> &str {
        &self.default_flow
    }

    /// The active analyzer marked default, if any
    #[must_use]
    pub fn default_analyzer(&self) -> Option<&SceneAnalyzerDef> {
        self.analyzers.iter().find(|a| a.is_active && a.is_default)
    }

    /// Configured providers
    #[must_use]
    pub fn providers(&self) -> &[ProviderDef] {
        &self.providers
    }

    /// Whether provider resolution is pinned to the current provider
    #[must_use]
    pub fn is_single_provider_mode(&self) -> bool {
        self.single_provider_mode
    }

    /// Provider used in single-provider mode
    #[must_use]
    pub fn current_provider(&self) -> &ProviderDef {
        // current_provider is validated against the provider list at build
        self.providers
            .iter()
            .find(|p| p.code == self.current_provider)
            .unwrap_or(&self.providers[0])
    }

    /// Gateway resolution policy implied by the mode flag.
    ///
    /// Multi mode carries the active provider codes in catalog order;
    /// inactive providers are invisible to candidate resolution.
    #[must_use]
    pub fn provider_mode(&self) -> ProviderMode {
        if self.single_provider_mode {
            ProviderMode::Single {
                provider: self.current_provider.clone(),
            }
        } else {
            ProviderMode::Multi {
                active: self
                    .providers
                    .iter()
                    .filter(|p| p.active)
                    .map(|p| p.code.clone())
                    .collect(),
            }
        }
    }
}

/// Process-wide configuration service
///
/// Explicit init via [`ConfigRegistry::load`] or
/// [`ConfigRegistry::from_catalog`]; the mode toggle is the only mutation
/// and replaces the snapshot atomically.
#[derive(Debug)]
pub struct ConfigRegistry {
    inner: ArcSwap<ConfigSnapshot>,
}

impl ConfigRegistry {
    /// Build a registry from an in-memory catalog
    pub fn from_catalog(catalog: &Catalog) -> Result<Self> {
        let snapshot = ConfigSnapshot::from_catalog(catalog)?;
        Ok(Self {
            inner: ArcSwap::from_pointee(snapshot),
        })
    }

    /// Load a registry from a TOML catalog file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let catalog = Catalog::load(path)?;
        Self::from_catalog(&catalog)
    }

    /// Current immutable snapshot; in-flight runs hold their own
    #[must_use]
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.inner.load_full()
    }

    /// Enabled agents, sorted by order
    #[must_use]
    pub fn all_agents(&self) -> Vec<AgentDef> {
        self.snapshot().agents().to_vec()
    }

    /// All flows, in catalog order
    #[must_use]
    pub fn all_flows(&self) -> Vec<FlowDef> {
        self.snapshot().flows().into_iter().cloned().collect()
    }

    /// Look up a flow by name
    #[must_use]
    pub fn flow(&self, name: &str) -> Option<FlowDef> {
        self.snapshot().flow(name).cloned()
    }

    /// Whether provider resolution is pinned to the current provider
    #[must_use]
    pub fn is_single_provider_mode(&self) -> bool {
        self.snapshot().is_single_provider_mode()
    }

    /// Provider used in single-provider mode
    #[must_use]
    pub fn current_provider(&self) -> ProviderDef {
        self.snapshot().current_provider().clone()
    }

    /// Toggle single/multi provider mode.
    ///
    /// Swaps the full snapshot; visible to all subsequent reads, never to
    /// runs that already captured theirs.
    pub fn set_single_provider_mode(&self, enabled: bool) {
        self.inner.rcu(|current| {
            let mut next = (**current).clone();
            next.single_provider_mode = enabled;
            next
        });
        info!(single_provider_mode = enabled, "provider mode toggled");
    }
}
