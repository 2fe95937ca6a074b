use crate::classifier::SceneSource;
use crate::config::{AgentDef, FlowDef};
use crate::store::StoredMessage;
use serde::Serialize;
use uuid::Uuid;

/// Default bound on concurrent parallel-group members
pub(crate) const DEFAULT_MAX_PARALLEL: usize = 4;

/// Default run event bus capacity
pub(crate) const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bound on concurrently executing parallel-group members
    pub max_parallel: usize,
    /// Run event bus capacity
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl OrchestratorConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the parallel-group concurrency bound
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Set the event bus capacity
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Why a run stopped short of completion
///
/// These are recognized terminal outcomes carrying partial results, not
/// exceptions; the messages committed before the halt remain valid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// The next step's estimate would push spend past the budget
    BudgetExceeded {
        /// Cents spent when the run halted
        spent_cents: u32,
        /// Conversation ceiling in cents
        budget_cents: u32,
        /// Step that was not executed (1-based)
        step: u32,
    },
    /// A step's provider resolution failed terminally
    ProviderExhausted {
        /// Failing step (1-based)
        step: u32,
        /// Terminal provider error
        error: String,
    },
    /// A message write failed after the step succeeded
    Persistence {
        /// Failing step (1-based)
        step: u32,
        /// Store error
        error: String,
    },
    /// The run was cancelled at a suspension point
    Cancelled,
}

impl FailureReason {
    /// Short label for logs and events
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::ProviderExhausted { .. } => "provider_exhausted",
            Self::Persistence { .. } => "persistence",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Terminal run status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step committed
    Completed,
    /// The run halted early; committed messages are in the report
    Failed(FailureReason),
}

impl RunStatus {
    /// Whether the run reached the end of its flow
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The failure reason, when not completed
    #[must_use]
    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match self {
            Self::Completed => None,
            Self::Failed(reason) => Some(reason),
        }
    }
}

/// Outcome of one orchestration run
///
/// Callers always receive whatever was durably committed, even when the
/// run did not complete.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Run identifier
    pub run_id: Uuid,
    /// Owning conversation
    pub conversation_id: Uuid,
    /// Resolved flow name
    pub flow: String,
    /// How the flow was chosen
    pub scene_source: SceneSource,
    /// Committed AI messages, ordered by step index
    pub ai_messages: Vec<StoredMessage>,
    /// Conversation spend after the run, in cents
    pub spent_cents: u32,
    /// Terminal status
    pub status: RunStatus,
}

/// Read-only operational state for rendering
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorDiagnostics {
    /// Whether provider resolution is pinned
    pub single_provider_mode: bool,
    /// Provider used in single-provider mode
    pub current_provider: String,
    /// Enabled agents, sorted by order
    pub agents: Vec<AgentDef>,
    /// Configured flows, in catalog order
    pub flows: Vec<FlowDef>,
}
