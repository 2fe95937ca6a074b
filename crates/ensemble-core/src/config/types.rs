//! Catalog record definitions
//!
//! Closed, validated records; nothing here is mutated after load.

use ensemble_llm::AgentBinding;
use serde::{Deserialize, Serialize};

/// A configured persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDef {
    /// Unique role tag, referenced by flow steps
    pub role_tag: String,
    /// Display name
    pub name: String,
    /// Persona prompt sent as the system turn
    pub prompt_template: String,
    /// Preferred provider code
    pub provider: String,
    /// Requested model code
    pub model: String,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Generation ceiling
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sort order within the catalog
    #[serde(default)]
    pub order: u32,
    /// Disabled agents are invisible to flows and the orchestrator
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AgentDef {
    /// Gateway-level view of this agent
    #[must_use]
    pub fn binding(&self) -> AgentBinding {
        AgentBinding {
            role_tag: self.role_tag.clone(),
            system_prompt: self.prompt_template.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// An upstream vendor endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDef {
    /// Provider code, matches the name registered with the gateway
    pub code: String,
    /// Endpoint base URL
    #[serde(default)]
    pub base_url: String,
    /// Name of the environment variable holding the credential
    #[serde(default)]
    pub credential: Option<String>,
    /// Inactive providers are skipped during resolution
    #[serde(default = "default_true")]
    pub active: bool,
}

/// A provider's model variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    /// Model code
    pub code: String,
    /// Owning provider code
    pub provider: String,
    /// Context window size
    #[serde(default)]
    pub context_length: u32,
    /// Generation ceiling
    #[serde(default)]
    pub max_tokens: u32,
    /// Capability tags
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// One position in a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStep {
    /// Target agent role tag
    pub agent: String,
    /// Optional parallel-group tag; contiguous steps sharing a tag run
    /// concurrently on the same pre-group context
    #[serde(default)]
    pub group: Option<String>,
}

/// An ordered pipeline of agent steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDef {
    /// Unique flow name, the classification target
    pub name: String,
    /// Conversation mode this flow serves
    #[serde(default = "default_flow_mode")]
    pub mode: String,
    /// Human-readable description for the diagnostic surface
    #[serde(default)]
    pub description: String,
    /// Ordered steps; order is fixed at resolution time
    pub steps: Vec<FlowStep>,
}

/// Classification configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneAnalyzerDef {
    /// Provider performing the classification call
    pub provider: String,
    /// Model performing the classification call
    pub model: String,
    /// At most one default among active analyzers
    #[serde(default)]
    pub is_default: bool,
    /// Inactive analyzers are ignored
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Root catalog document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Flow used when classification is unavailable or fails
    pub default_flow: String,
    /// Start in single-provider mode
    #[serde(default)]
    pub single_provider_mode: bool,
    /// Provider pinned in single-provider mode; defaults to the first
    /// active provider
    #[serde(default)]
    pub current_provider: Option<String>,
    /// Upstream providers
    #[serde(default)]
    pub providers: Vec<ProviderDef>,
    /// Model variants
    #[serde(default)]
    pub models: Vec<ModelDef>,
    /// Personas
    #[serde(default)]
    pub agents: Vec<AgentDef>,
    /// Pipelines
    #[serde(default)]
    pub flows: Vec<FlowDef>,
    /// Classification configs
    #[serde(default)]
    pub scene_analyzers: Vec<SceneAnalyzerDef>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_true() -> bool {
    true
}

fn default_flow_mode() -> String {
    "chat".to_string()
}
