//! Multi-agent run orchestration
//!
//! The orchestrator drives one message through classification, flow
//! resolution, and the resolved flow's agent steps, enforcing the
//! conversation budget before each unit and committing every AI message
//! durably before moving on. A halted run is a recognized outcome, not an
//! exception: the report always carries whatever was committed.
//!
//! # Module structure
//!
//! - `mod.rs`: orchestrator struct, run admission, cancellation
//! - `types`: run reports, statuses, config
//! - `budget`: pre-step budget check
//! - `execution`: the run state machine

mod budget;
mod execution;
mod types;

#[cfg(test)]
mod tests;

pub use types::{FailureReason, OrchestratorConfig, OrchestratorDiagnostics, RunReport, RunStatus};

use crate::classifier::SceneClassifier;
use crate::config::ConfigRegistry;
use crate::error::{Error, Result};
use crate::events::{RunEvent, RunEventBus};
use crate::store::ConversationStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ensemble_llm::ProviderGateway;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Run orchestrator
///
/// One run per conversation at a time; a second submission while a run is
/// in flight is rejected with [`Error::RunInProgress`].
pub struct Orchestrator {
    registry: Arc<ConfigRegistry>,
    gateway: Arc<ProviderGateway>,
    classifier: SceneClassifier,
    store: Arc<dyn ConversationStore>,
    events: RunEventBus,
    active_runs: DashMap<Uuid, CancellationToken>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator with default tunables
    #[must_use]
    pub fn new(
        registry: Arc<ConfigRegistry>,
        gateway: Arc<ProviderGateway>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self::with_config(registry, gateway, store, OrchestratorConfig::default())
    }

    /// Create an orchestrator with custom tunables
    #[must_use]
    pub fn with_config(
        registry: Arc<ConfigRegistry>,
        gateway: Arc<ProviderGateway>,
        store: Arc<dyn ConversationStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let classifier = SceneClassifier::new(gateway.clone());
        let events = RunEventBus::new(config.event_capacity);
        Self {
            registry,
            gateway,
            classifier,
            store,
            events,
            active_runs: DashMap::new(),
            config,
        }
    }

    /// Subscribe to run events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Cancel the in-flight run for a conversation, if any.
    ///
    /// Returns whether a run was signalled. Cancellation is observed at
    /// the next suspension point; the message being committed when the
    /// signal lands still commits.
    pub fn cancel_run(&self, conversation_id: Uuid) -> bool {
        match self.active_runs.get(&conversation_id) {
            Some(token) => {
                info!(%conversation_id, "cancelling in-flight run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Delete a conversation, cancelling its in-flight run first
    pub async fn delete_conversation(&self, conversation_id: Uuid) -> Result<bool> {
        if self.cancel_run(conversation_id) {
            debug!(%conversation_id, "run cancelled ahead of delete");
        }
        self.store.delete_conversation(conversation_id).await
    }

    /// Read-only operational state for a diagnostic surface
    #[must_use]
    pub fn diagnostics(&self) -> OrchestratorDiagnostics {
        let snapshot = self.registry.snapshot();
        OrchestratorDiagnostics {
            single_provider_mode: snapshot.is_single_provider_mode(),
            current_provider: snapshot.current_provider().code.clone(),
            agents: snapshot.agents().to_vec(),
            flows: snapshot.flows().into_iter().cloned().collect(),
        }
    }

    /// Admit a run for a conversation, enforcing one run at a time.
    ///
    /// The returned guard removes the slot on drop, covering every exit
    /// path including panics in the run body.
    fn acquire_run(&self, conversation_id: Uuid) -> Result<(RunGuard<'_>, CancellationToken)> {
        match self.active_runs.entry(conversation_id) {
            Entry::Occupied(_) => Err(Error::RunInProgress(conversation_id)),
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                slot.insert(token.clone());
                Ok((
                    RunGuard {
                        runs: &self.active_runs,
                        conversation_id,
                    },
                    token,
                ))
            }
        }
    }
}

/// Releases a conversation's run slot on drop
struct RunGuard<'a> {
    runs: &'a DashMap<Uuid, CancellationToken>,
    conversation_id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.runs.remove(&self.conversation_id);
    }
}
