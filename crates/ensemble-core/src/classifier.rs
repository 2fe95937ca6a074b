//! Scene classification
//!
//! Maps the incoming message onto one of the configured flows. The
//! decision contract is fallback-first: a missing analyzer, a provider
//! failure, or an unparsable reply all degrade to the statically
//! configured default flow, never to an error. A broken classifier costs
//! precision, not availability.

use crate::config::ConfigSnapshot;
use ensemble_llm::{AgentBinding, ChatMessage, ProviderGateway};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How the flow was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneSource {
    /// The analyzer's classification was used
    Analyzer,
    /// Fell back to the statically configured default flow
    DefaultFlow,
}

/// Classification outcome
#[derive(Debug, Clone, Serialize)]
pub struct SceneDecision {
    /// Selected flow name
    pub flow: String,
    /// How it was selected
    pub source: SceneSource,
}

/// Classifier tunables
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Generation ceiling for the classification call (labels are short)
    pub max_tokens: u32,
    /// Sampling temperature for the classification call
    pub temperature: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_tokens: 64,
            temperature: 0.0,
        }
    }
}

/// Scene classifier
pub struct SceneClassifier {
    gateway: Arc<ProviderGateway>,
    config: ClassifierConfig,
}

impl SceneClassifier {
    /// Create a classifier with default tunables
    #[must_use]
    pub fn new(gateway: Arc<ProviderGateway>) -> Self {
        Self {
            gateway,
            config: ClassifierConfig::default(),
        }
    }

    /// Create a classifier with custom tunables
    #[must_use]
    pub fn with_config(gateway: Arc<ProviderGateway>, config: ClassifierConfig) -> Self {
        Self { gateway, config }
    }

    /// Classify a message into a flow.
    ///
    /// Uses the run's captured snapshot so the decision and the execution
    /// see the same catalog.
    pub async fn classify(&self, snapshot: &ConfigSnapshot, text: &str) -> SceneDecision {
        let fallback = SceneDecision {
            flow: snapshot.default_flow_name().to_string(),
            source: SceneSource::DefaultFlow,
        };

        let Some(analyzer) = snapshot.default_analyzer() else {
            debug!("no active default scene analyzer, using default flow");
            return fallback;
        };

        let names = snapshot.flow_names();
        let binding = AgentBinding {
            role_tag: "scene-analyzer".to_string(),
            system_prompt: classification_prompt(&names),
            provider: analyzer.provider.clone(),
            model: analyzer.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let context = [ChatMessage::user(text)];

        match self
            .gateway
            .invoke(&binding, &context, &snapshot.provider_mode())
            .await
        {
            Ok(reply) => match parse_flow_name(&reply.text, &names) {
                Some(flow) => {
                    info!(%flow, provider = %reply.provider_used, "scene classified");
                    SceneDecision {
                        flow,
                        source: SceneSource::Analyzer,
                    }
                }
                None => {
                    warn!(reply = %reply.text, "unparsable classification, using default flow");
                    fallback
                }
            },
            Err(e) => {
                warn!(error = %e, "classification call failed, using default flow");
                fallback
            }
        }
    }
}

/// Prompt asking for exactly one of the known flow names
fn classification_prompt(names: &[String]) -> String {
    format!(
        "You are a scene classifier for a chat system. Read the user's \
         message and decide which conversation flow fits it best. Reply \
         with exactly one of the following flow names and nothing else: {}",
        names.join(", ")
    )
}

/// Strict reply parsing: normalized text must equal one known flow name
fn parse_flow_name(raw: &str, names: &[String]) -> Option<String> {
    let normalized = raw.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '.' | '!' | '?')
    });
    names
        .iter()
        .find(|name| name.eq_ignore_ascii_case(normalized))
        .cloned()
}
