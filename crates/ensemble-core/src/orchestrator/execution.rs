//! The run state machine
//!
//! One run: persist the user turn, classify, resolve the flow, then walk
//! the flow's units in order. A unit is either a single step or a
//! contiguous parallel group; the budget check runs before each unit, and
//! every AI message commits durably before the next unit starts.

use super::budget::check_step_budget;
use super::types::{FailureReason, RunReport, RunStatus};
use super::Orchestrator;
use crate::classifier::SceneSource;
use crate::config::{ConfigSnapshot, FlowDef};
use crate::error::{Error, Result};
use crate::events::RunEvent;
use crate::store::{MessageRole, NewMessage, StoredMessage};
use ensemble_llm::{ChatMessage, GatewayReply, ProviderMode};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// One schedulable unit of a flow
enum Unit {
    /// A lone step: 1-based index and agent role tag
    Single(u32, String),
    /// Contiguous steps sharing a group tag, run concurrently
    Group(Vec<(u32, String)>),
}

/// Outcome of one parallel-group member
enum MemberOutcome {
    Reply(GatewayReply),
    Failed(String),
    Cancelled,
}

/// Merge contiguous same-group steps into units, assigning 1-based
/// step indices in flow order.
fn plan_units(flow: &FlowDef) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut index = 0u32;
    let mut steps = flow.steps.iter().peekable();

    while let Some(step) = steps.next() {
        index += 1;
        match &step.group {
            None => units.push(Unit::Single(index, step.agent.clone())),
            Some(tag) => {
                let mut members = vec![(index, step.agent.clone())];
                while steps
                    .peek()
                    .is_some_and(|next| next.group.as_deref() == Some(tag.as_str()))
                {
                    if let Some(next) = steps.next() {
                        index += 1;
                        members.push((index, next.agent.clone()));
                    }
                }
                units.push(Unit::Group(members));
            }
        }
    }

    units
}

impl Orchestrator {
    /// Execute one orchestration run for a conversation.
    ///
    /// Rejected with [`Error::RunInProgress`] while another run is in
    /// flight for the same conversation. Halts (budget, provider
    /// exhaustion, cancellation, persistence failure) are reported in the
    /// returned [`RunReport`], not as errors; `Err` means the run could
    /// not be admitted or its user turn could not be persisted.
    #[instrument(skip(self, text), fields(%conversation_id))]
    pub async fn run(&self, conversation_id: Uuid, text: &str) -> Result<RunReport> {
        let conversation = self
            .store
            .find_conversation(conversation_id)
            .await?
            .ok_or(Error::ConversationNotFound(conversation_id))?;
        let (_guard, token) = self.acquire_run(conversation_id)?;

        // One snapshot for the full run; a concurrent mode toggle affects
        // only subsequent runs.
        let snapshot = self.registry.snapshot();
        let run_id = Uuid::new_v4();
        self.events.publish(RunEvent::RunStarted {
            run_id,
            conversation_id,
        });
        info!(%run_id, "run started");

        // The user turn is durable before any provider call
        self.store
            .create_message(conversation_id, NewMessage::user(text))
            .await?;

        // Classification is a suspension point: a cancelled run stops here
        // without issuing further provider calls
        let decision = tokio::select! {
            decision = self.classifier.classify(&snapshot, text) => decision,
            () = token.cancelled() => {
                info!(%run_id, "run cancelled during classification");
                let status = RunStatus::Failed(FailureReason::Cancelled);
                self.events.publish(RunEvent::RunFinished {
                    run_id,
                    completed: false,
                    reason: Some(FailureReason::Cancelled.label().to_string()),
                    spent_cents: conversation.spent_cents,
                });
                return Ok(RunReport {
                    run_id,
                    conversation_id,
                    flow: snapshot.default_flow_name().to_string(),
                    scene_source: SceneSource::DefaultFlow,
                    ai_messages: Vec::new(),
                    spent_cents: conversation.spent_cents,
                    status,
                });
            }
        };

        let Some(flow) = snapshot.flow(&decision.flow).cloned() else {
            return Err(Error::Config(format!(
                "resolved flow '{}' is not configured",
                decision.flow
            )));
        };
        self.events.publish(RunEvent::FlowResolved {
            run_id,
            flow: flow.name.clone(),
            fallback: decision.source == SceneSource::DefaultFlow,
        });
        info!(flow = %flow.name, source = ?decision.source, "flow resolved");

        let mut context: Vec<ChatMessage> = self
            .store
            .list_messages(conversation_id)
            .await?
            .iter()
            .map(StoredMessage::as_chat_turn)
            .collect();

        let mut exec = RunExec {
            orchestrator: self,
            run_id,
            conversation_id,
            flow_name: flow.name.clone(),
            scene_source: decision.source,
            snapshot: &snapshot,
            mode: snapshot.provider_mode(),
            token,
            budget_cents: conversation.budget_cents,
            spent_cents: conversation.spent_cents,
            ai_messages: Vec::new(),
        };

        for unit in plan_units(&flow) {
            let halted = match unit {
                Unit::Single(step, agent) => exec.run_single(step, &agent, &mut context).await?,
                Unit::Group(members) => exec.run_group(&members, &mut context).await?,
            };
            if let Some(report) = halted {
                return Ok(report);
            }
        }

        Ok(exec.finish(RunStatus::Completed))
    }
}

/// Mutable state of one in-flight run
struct RunExec<'a> {
    orchestrator: &'a Orchestrator,
    run_id: Uuid,
    conversation_id: Uuid,
    flow_name: String,
    scene_source: SceneSource,
    snapshot: &'a ConfigSnapshot,
    mode: ProviderMode,
    token: CancellationToken,
    budget_cents: u32,
    spent_cents: u32,
    ai_messages: Vec<StoredMessage>,
}

impl RunExec<'_> {
    /// Execute one sequential step. `Some` is the terminal report of a
    /// halted run; `None` means continue with the next unit.
    async fn run_single(
        &mut self,
        step: u32,
        agent_tag: &str,
        context: &mut Vec<ChatMessage>,
    ) -> Result<Option<RunReport>> {
        let agent = self
            .snapshot
            .agent(agent_tag)
            .ok_or_else(|| Error::Config(format!("flow step references unknown agent '{agent_tag}'")))?;
        let binding = agent.binding();

        // Estimate failures surface through invoke; don't block on them here
        let estimate = match self
            .orchestrator
            .gateway
            .estimate_cost_cents(&binding, &self.mode)
        {
            Ok(cents) => cents,
            Err(e) => {
                warn!(step, error = %e, "cost estimate unavailable, treating as zero");
                0
            }
        };
        if let Some(reason) = check_step_budget(self.spent_cents, estimate, self.budget_cents, step)
        {
            warn!(step, spent_cents = self.spent_cents, "budget exhausted, halting run");
            return Ok(Some(self.finish(RunStatus::Failed(reason))));
        }

        let reply = tokio::select! {
            result = self.orchestrator.gateway.invoke(&binding, context, &self.mode) => {
                match result {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(step, error = %e, "step failed terminally");
                        return Ok(Some(self.finish(RunStatus::Failed(
                            FailureReason::ProviderExhausted {
                                step,
                                error: e.to_string(),
                            },
                        ))));
                    }
                }
            }
            () = self.token.cancelled() => {
                info!(step, "run cancelled");
                return Ok(Some(self.finish(RunStatus::Failed(FailureReason::Cancelled))));
            }
        };

        match self.commit_step(step, agent_tag, &reply).await {
            Ok(stored) => {
                context.push(ChatMessage::assistant(&stored.content));
                self.ai_messages.push(stored);
                Ok(None)
            }
            Err(e) => Ok(Some(self.finish(RunStatus::Failed(
                FailureReason::Persistence {
                    step,
                    error: e.to_string(),
                },
            )))),
        }
    }

    /// Execute one parallel group. All members see the same pre-group
    /// context; results are committed in step-index order, and member
    /// successes are persisted even when a sibling failed.
    async fn run_group(
        &mut self,
        members: &[(u32, String)],
        context: &mut Vec<ChatMessage>,
    ) -> Result<Option<RunReport>> {
        let first_step = members.first().map_or(1, |(index, _)| *index);

        let mut bindings = Vec::with_capacity(members.len());
        let mut estimate_total = 0u32;
        for (step, tag) in members {
            let agent = self
                .snapshot
                .agent(tag)
                .ok_or_else(|| Error::Config(format!("flow step references unknown agent '{tag}'")))?;
            let binding = agent.binding();
            let estimate = match self
                .orchestrator
                .gateway
                .estimate_cost_cents(&binding, &self.mode)
            {
                Ok(cents) => cents,
                Err(e) => {
                    warn!(step = *step, error = %e, "cost estimate unavailable, treating as zero");
                    0
                }
            };
            estimate_total = estimate_total.saturating_add(estimate);
            bindings.push((*step, tag.clone(), binding));
        }

        // The whole group is admitted or none of it is
        if let Some(reason) =
            check_step_budget(self.spent_cents, estimate_total, self.budget_cents, first_step)
        {
            warn!(
                step = first_step,
                group_estimate = estimate_total,
                "budget exhausted before group"
            );
            return Ok(Some(self.finish(RunStatus::Failed(reason))));
        }

        let shared: Arc<[ChatMessage]> = context.clone().into();
        let gateway = self.orchestrator.gateway.clone();
        let mode = self.mode.clone();
        let token = self.token.clone();

        let mut results: Vec<(u32, String, MemberOutcome)> =
            stream::iter(bindings.into_iter().map(|(step, tag, binding)| {
                let gateway = gateway.clone();
                let shared = shared.clone();
                let mode = mode.clone();
                let token = token.clone();
                async move {
                    let outcome = tokio::select! {
                        result = gateway.invoke(&binding, &shared, &mode) => match result {
                            Ok(reply) => MemberOutcome::Reply(reply),
                            Err(e) => MemberOutcome::Failed(e.to_string()),
                        },
                        () = token.cancelled() => MemberOutcome::Cancelled,
                    };
                    (step, tag, outcome)
                }
            }))
            .buffer_unordered(self.orchestrator.config.max_parallel)
            .collect()
            .await;
        results.sort_by_key(|(step, _, _)| *step);

        let mut halt: Option<FailureReason> = None;
        for (step, tag, outcome) in results {
            match outcome {
                MemberOutcome::Reply(reply) => match self.commit_step(step, &tag, &reply).await {
                    Ok(stored) => {
                        context.push(ChatMessage::assistant(&stored.content));
                        self.ai_messages.push(stored);
                    }
                    Err(e) => {
                        // The store itself is failing; stop committing
                        halt = Some(FailureReason::Persistence {
                            step,
                            error: e.to_string(),
                        });
                        break;
                    }
                },
                MemberOutcome::Failed(error) => {
                    warn!(step, %error, "group member failed");
                    if halt.is_none() {
                        halt = Some(FailureReason::ProviderExhausted { step, error });
                    }
                }
                MemberOutcome::Cancelled => {
                    if halt.is_none() {
                        halt = Some(FailureReason::Cancelled);
                    }
                }
            }
        }

        match halt {
            Some(reason) => Ok(Some(self.finish(RunStatus::Failed(reason)))),
            None => Ok(None),
        }
    }

    /// Commit one step's reply: message write, spend update, event
    async fn commit_step(
        &mut self,
        step: u32,
        agent_tag: &str,
        reply: &GatewayReply,
    ) -> Result<StoredMessage> {
        let message = NewMessage {
            role: MessageRole::Ai,
            content: reply.text.clone(),
            agent_role_tag: Some(agent_tag.to_string()),
            step: Some(step),
            tokens: reply.usage.total_tokens,
            cost_cents: reply.cost_cents,
            provider: Some(reply.provider_used.clone()),
        };
        let stored = self
            .orchestrator
            .store
            .create_message(self.conversation_id, message)
            .await?;
        self.spent_cents = self
            .orchestrator
            .store
            .record_spend(self.conversation_id, reply.cost_cents)
            .await?;
        self.orchestrator.events.publish(RunEvent::MessageCommitted {
            run_id: self.run_id,
            message: stored.clone(),
        });
        info!(
            step,
            agent = agent_tag,
            cost_cents = reply.cost_cents,
            spent_cents = self.spent_cents,
            "step committed"
        );
        Ok(stored)
    }

    /// Publish the terminal event and build the run report
    fn finish(&self, status: RunStatus) -> RunReport {
        let completed = status.is_completed();
        let reason = status.failure_reason().map(|r| r.label().to_string());
        self.orchestrator.events.publish(RunEvent::RunFinished {
            run_id: self.run_id,
            completed,
            reason,
            spent_cents: self.spent_cents,
        });
        info!(
            run_id = %self.run_id,
            completed,
            spent_cents = self.spent_cents,
            "run finished"
        );
        RunReport {
            run_id: self.run_id,
            conversation_id: self.conversation_id,
            flow: self.flow_name.clone(),
            scene_source: self.scene_source,
            ai_messages: self.ai_messages.clone(),
            spent_cents: self.spent_cents,
            status,
        }
    }
}
