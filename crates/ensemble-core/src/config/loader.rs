//! Catalog loading and fail-fast validation
//!
//! A malformed catalog is rejected here, before any run can reference it.

use super::types::Catalog;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

impl Catalog {
    /// Parse a catalog from TOML and validate it
    pub fn from_toml(raw: &str) -> Result<Self> {
        let catalog: Catalog =
            toml::from_str(raw).map_err(|e| Error::Config(format!("catalog parse failed: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load and validate a catalog file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read catalog {path:?}: {e}")))?;
        let catalog = Self::from_toml(&raw)?;
        info!(
            agents = catalog.agents.len(),
            flows = catalog.flows.len(),
            providers = catalog.providers.len(),
            "catalog loaded from {path:?}"
        );
        Ok(catalog)
    }

    /// The provider pinned in single-provider mode: the explicit choice,
    /// or the first active provider
    #[must_use]
    pub fn effective_current_provider(&self) -> Option<String> {
        self.current_provider.clone().or_else(|| {
            self.providers
                .iter()
                .find(|p| p.active)
                .map(|p| p.code.clone())
        })
    }

    /// Validate cross-references and uniqueness constraints
    pub fn validate(&self) -> Result<()> {
        if !self.providers.iter().any(|p| p.active) {
            return Err(Error::Config("no active provider configured".into()));
        }

        let provider_codes: HashSet<&str> =
            self.providers.iter().map(|p| p.code.as_str()).collect();
        if provider_codes.len() != self.providers.len() {
            return Err(Error::Config("duplicate provider code".into()));
        }

        let model_codes: HashSet<&str> = self.models.iter().map(|m| m.code.as_str()).collect();
        for model in &self.models {
            if !provider_codes.contains(model.provider.as_str()) {
                return Err(Error::Config(format!(
                    "model '{}' references unknown provider '{}'",
                    model.code, model.provider
                )));
            }
        }

        let mut role_tags: HashSet<&str> = HashSet::new();
        for agent in &self.agents {
            if !role_tags.insert(agent.role_tag.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate agent role tag '{}'",
                    agent.role_tag
                )));
            }
            if !provider_codes.contains(agent.provider.as_str()) {
                return Err(Error::Config(format!(
                    "agent '{}' references unknown provider '{}'",
                    agent.role_tag, agent.provider
                )));
            }
            if !self.models.is_empty() && !model_codes.contains(agent.model.as_str()) {
                return Err(Error::Config(format!(
                    "agent '{}' references unknown model '{}'",
                    agent.role_tag, agent.model
                )));
            }
            if !(0.0..=2.0).contains(&agent.temperature) {
                return Err(Error::Config(format!(
                    "agent '{}' temperature {} out of range [0.0, 2.0]",
                    agent.role_tag, agent.temperature
                )));
            }
            if agent.max_tokens == 0 {
                return Err(Error::Config(format!(
                    "agent '{}' has zero max_tokens",
                    agent.role_tag
                )));
            }
        }

        let enabled_tags: HashSet<&str> = self
            .agents
            .iter()
            .filter(|a| a.enabled)
            .map(|a| a.role_tag.as_str())
            .collect();

        let mut flow_names: HashSet<&str> = HashSet::new();
        for flow in &self.flows {
            if !flow_names.insert(flow.name.as_str()) {
                return Err(Error::Config(format!("duplicate flow name '{}'", flow.name)));
            }
            if flow.steps.is_empty() {
                return Err(Error::Config(format!("flow '{}' has no steps", flow.name)));
            }
            for (i, step) in flow.steps.iter().enumerate() {
                if !enabled_tags.contains(step.agent.as_str()) {
                    return Err(Error::Config(format!(
                        "flow '{}' step {} references unknown or disabled agent '{}'",
                        flow.name,
                        i + 1,
                        step.agent
                    )));
                }
            }
        }

        if !flow_names.contains(self.default_flow.as_str()) {
            return Err(Error::Config(format!(
                "default flow '{}' is not defined",
                self.default_flow
            )));
        }

        let defaults = self
            .scene_analyzers
            .iter()
            .filter(|a| a.is_active && a.is_default)
            .count();
        if defaults > 1 {
            return Err(Error::Config(
                "more than one active scene analyzer marked default".into(),
            ));
        }
        for analyzer in &self.scene_analyzers {
            if !provider_codes.contains(analyzer.provider.as_str()) {
                return Err(Error::Config(format!(
                    "scene analyzer references unknown provider '{}'",
                    analyzer.provider
                )));
            }
        }

        if let Some(current) = &self.current_provider {
            if !self
                .providers
                .iter()
                .any(|p| p.active && p.code == *current)
            {
                return Err(Error::Config(format!(
                    "current provider '{current}' is not an active provider"
                )));
            }
        }

        Ok(())
    }
}
