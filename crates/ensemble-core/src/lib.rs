//! # ensemble-core
//!
//! Multi-agent chat orchestration: a validated agent/flow catalog, scene
//! classification with a default-flow fallback, and a run state machine
//! that walks a flow's agent steps under a per-conversation budget,
//! committing every AI message durably as it goes.
//!
//! ## Architecture
//!
//! ```text
//! message ──> Orchestrator ──> SceneClassifier ──> flow
//!                │                                   │
//!                ├── ConfigRegistry (snapshot)       │
//!                ├── ProviderGateway <── agent steps ┘
//!                └── ConversationStore (durable commits)
//! ```
//!
//! Provider resolution, retry, and failover live in `ensemble-llm`; this
//! crate supplies the policy around them.

pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod store;

pub use classifier::{ClassifierConfig, SceneClassifier, SceneDecision, SceneSource};
pub use config::{
    AgentDef, Catalog, ConfigRegistry, ConfigSnapshot, FlowDef, FlowStep, ModelDef, ProviderDef,
    SceneAnalyzerDef,
};
pub use error::{Error, Result};
pub use events::{RunEvent, RunEventBus};
pub use orchestrator::{
    FailureReason, Orchestrator, OrchestratorConfig, OrchestratorDiagnostics, RunReport, RunStatus,
};
pub use store::{
    Conversation, ConversationStore, MemoryStore, MessageRole, NewMessage, StoredMessage,
};
