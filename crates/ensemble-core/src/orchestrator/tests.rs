use super::*;
use crate::config::Catalog;
use crate::events::RunEvent;
use crate::store::{Conversation, ConversationStore, MemoryStore, MessageRole};
use ensemble_llm::{GatewayConfig, MockOutcome, MockProvider, RetryConfig};
use std::sync::Arc;
use std::time::Duration;

fn catalog_toml(single_provider_mode: bool) -> String {
    format!(
        r#"
default_flow = "emotional-support"
single_provider_mode = {single_provider_mode}
current_provider = "alpha"

[[providers]]
code = "alpha"

[[providers]]
code = "beta"

[[agents]]
role_tag = "comfort-agent"
name = "Comfort"
prompt_template = "You comfort people"
provider = "alpha"
model = "alpha-default"
order = 1

[[agents]]
role_tag = "advice-agent"
name = "Advice"
prompt_template = "You give advice"
provider = "beta"
model = "beta-default"
order = 2

[[flows]]
name = "emotional-support"
steps = [{{ agent = "comfort-agent" }}, {{ agent = "advice-agent" }}]

[[flows]]
name = "brainstorm"
steps = [{{ agent = "comfort-agent", group = "ideas" }}, {{ agent = "advice-agent", group = "ideas" }}]
"#
    )
}

fn fast_gateway_config() -> GatewayConfig {
    GatewayConfig::new()
        .with_call_timeout(Duration::from_millis(200))
        .with_retry(
            RetryConfig::new()
                .with_max_attempts(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        )
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    registry: Arc<ConfigRegistry>,
    store: Arc<MemoryStore>,
    alpha: Arc<MockProvider>,
    beta: Arc<MockProvider>,
}

fn harness(single_provider_mode: bool, gateway_config: GatewayConfig) -> Harness {
    let catalog = Catalog::from_toml(&catalog_toml(single_provider_mode)).unwrap();
    let registry = Arc::new(ConfigRegistry::from_catalog(&catalog).unwrap());
    let alpha = Arc::new(MockProvider::new("alpha"));
    let beta = Arc::new(MockProvider::new("beta"));
    let mut gateway = ProviderGateway::new(gateway_config);
    gateway.register("alpha", alpha.clone());
    gateway.register("beta", beta.clone());
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Arc::new(Orchestrator::new(
        registry.clone(),
        Arc::new(gateway),
        store.clone(),
    ));
    Harness {
        orchestrator,
        registry,
        store,
        alpha,
        beta,
    }
}

async fn new_conversation(store: &MemoryStore, budget_cents: u32) -> Uuid {
    let conversation = Conversation::new("chat", budget_cents);
    let id = conversation.id;
    store.create_conversation(conversation).await.unwrap();
    id
}

#[tokio::test]
async fn test_sequential_run_commits_each_step() {
    let h = harness(true, fast_gateway_config());
    let id = new_conversation(&h.store, 100).await;
    h.alpha.push(MockOutcome::reply("there there", 10));
    h.alpha.push(MockOutcome::reply("try a walk", 20));

    let report = h.orchestrator.run(id, "rough day").await.unwrap();

    assert!(report.status.is_completed());
    assert_eq!(report.flow, "emotional-support");
    assert_eq!(report.ai_messages.len(), 2);
    assert_eq!(report.ai_messages[0].step, Some(1));
    assert_eq!(
        report.ai_messages[0].agent_role_tag.as_deref(),
        Some("comfort-agent")
    );
    assert_eq!(report.ai_messages[1].step, Some(2));
    assert_eq!(report.spent_cents, 30);

    let messages = h.store.list_messages(id).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].content, "there there");
    let conversation = h.store.find_conversation(id).await.unwrap().unwrap();
    assert_eq!(conversation.spent_cents, 30);
}

#[tokio::test]
async fn test_run_events_arrive_in_lifecycle_order() {
    let h = harness(true, fast_gateway_config());
    let id = new_conversation(&h.store, 100).await;
    let mut rx = h.orchestrator.subscribe();
    h.alpha.push(MockOutcome::reply("one", 1));
    h.alpha.push(MockOutcome::reply("two", 1));

    let report = h.orchestrator.run(id, "hi").await.unwrap();

    assert!(matches!(rx.recv().await.unwrap(), RunEvent::RunStarted { run_id, .. } if run_id == report.run_id));
    assert!(matches!(
        rx.recv().await.unwrap(),
        RunEvent::FlowResolved { fallback: true, .. }
    ));
    assert!(matches!(
        rx.recv().await.unwrap(),
        RunEvent::MessageCommitted { .. }
    ));
    assert!(matches!(
        rx.recv().await.unwrap(),
        RunEvent::MessageCommitted { .. }
    ));
    assert!(matches!(
        rx.recv().await.unwrap(),
        RunEvent::RunFinished {
            completed: true,
            spent_cents: 2,
            ..
        }
    ));
}

#[tokio::test]
async fn test_budget_halts_before_unaffordable_step() {
    // Every step estimates 60 cents against a 100-cent budget
    let catalog = Catalog::from_toml(&catalog_toml(true)).unwrap();
    let registry = Arc::new(ConfigRegistry::from_catalog(&catalog).unwrap());
    let alpha = Arc::new(MockProvider::new("alpha").with_estimate_cents(60));
    let mut gateway = ProviderGateway::new(fast_gateway_config());
    gateway.register("alpha", alpha.clone());
    gateway.register("beta", Arc::new(MockProvider::new("beta")));
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(registry, Arc::new(gateway), store.clone());
    let id = new_conversation(&store, 100).await;
    alpha.push(MockOutcome::reply("first", 60));

    let report = orchestrator.run(id, "hi").await.unwrap();

    assert_eq!(
        report.status,
        RunStatus::Failed(FailureReason::BudgetExceeded {
            spent_cents: 60,
            budget_cents: 100,
            step: 2,
        })
    );
    assert_eq!(report.ai_messages.len(), 1);
    assert_eq!(report.spent_cents, 60);
    // Step 2 was never attempted
    assert_eq!(alpha.calls(), 1);
    let messages = store.list_messages(id).await.unwrap();
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn test_authoritative_cost_may_overshoot_budget_by_one_step() {
    // The gate sees the 10-cent estimate; the provider then bills 120.
    // The overshoot is recorded and the next step is refused.
    let catalog = Catalog::from_toml(&catalog_toml(true)).unwrap();
    let registry = Arc::new(ConfigRegistry::from_catalog(&catalog).unwrap());
    let alpha = Arc::new(MockProvider::new("alpha").with_estimate_cents(10));
    let mut gateway = ProviderGateway::new(fast_gateway_config());
    gateway.register("alpha", alpha.clone());
    gateway.register("beta", Arc::new(MockProvider::new("beta")));
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(registry, Arc::new(gateway), store.clone());
    let id = new_conversation(&store, 100).await;
    alpha.push(MockOutcome::reply("cheap estimate, expensive bill", 120));

    let report = orchestrator.run(id, "hi").await.unwrap();

    assert_eq!(
        report.status,
        RunStatus::Failed(FailureReason::BudgetExceeded {
            spent_cents: 120,
            budget_cents: 100,
            step: 2,
        })
    );
    assert_eq!(report.ai_messages.len(), 1);
    assert_eq!(report.spent_cents, 120);
    assert_eq!(alpha.calls(), 1);
    let found = store.find_conversation(id).await.unwrap().unwrap();
    assert_eq!(found.spent_cents, 120);
}

#[tokio::test]
async fn test_estimate_failure_does_not_masquerade_as_budget_halt() {
    // Nothing registered with the gateway: the estimate errors and is
    // treated as zero, so the halt comes from the provider layer
    let catalog = Catalog::from_toml(&catalog_toml(false)).unwrap();
    let registry = Arc::new(ConfigRegistry::from_catalog(&catalog).unwrap());
    let gateway = ProviderGateway::new(fast_gateway_config());
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(registry, Arc::new(gateway), store.clone());
    let id = new_conversation(&store, 0).await;

    let report = orchestrator.run(id, "hi").await.unwrap();

    assert!(matches!(
        report.status,
        RunStatus::Failed(FailureReason::ProviderExhausted { step: 1, .. })
    ));
    assert!(report.ai_messages.is_empty());
    assert_eq!(report.spent_cents, 0);
}

#[tokio::test]
async fn test_terminal_step_failure_keeps_earlier_messages() {
    let h = harness(true, fast_gateway_config());
    let id = new_conversation(&h.store, 100).await;
    h.alpha.push(MockOutcome::reply("committed", 10));
    h.alpha.push(MockOutcome::AuthFailure);

    let report = h.orchestrator.run(id, "hi").await.unwrap();

    assert!(matches!(
        report.status,
        RunStatus::Failed(FailureReason::ProviderExhausted { step: 2, .. })
    ));
    assert_eq!(report.ai_messages.len(), 1);
    assert_eq!(report.spent_cents, 10);
    let messages = h.store.list_messages(id).await.unwrap();
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn test_concurrent_run_for_same_conversation_is_rejected() {
    let h = harness(true, GatewayConfig::default());
    let id = new_conversation(&h.store, 100).await;
    h.alpha.push(MockOutcome::Hang);

    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.run(id, "hi").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = h.orchestrator.run(id, "again").await.unwrap_err();
    assert!(matches!(err, Error::RunInProgress(got) if got == id));

    assert!(h.orchestrator.cancel_run(id));
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.status, RunStatus::Failed(FailureReason::Cancelled));
    assert!(report.ai_messages.is_empty());

    // Slot released; a new run is admitted
    h.alpha.push(MockOutcome::reply("ok", 1));
    h.alpha.push(MockOutcome::reply("ok", 1));
    let report = h.orchestrator.run(id, "third").await.unwrap();
    assert!(report.status.is_completed());
}

#[tokio::test]
async fn test_cancel_without_active_run_is_a_noop() {
    let h = harness(true, fast_gateway_config());
    let id = new_conversation(&h.store, 100).await;
    assert!(!h.orchestrator.cancel_run(id));
}

#[tokio::test]
async fn test_parallel_group_results_keep_step_order() {
    let h = harness(false, fast_gateway_config());
    let catalog = Catalog::from_toml(
        &catalog_toml(false).replace("default_flow = \"emotional-support\"", "default_flow = \"brainstorm\""),
    )
    .unwrap();
    let registry = Arc::new(ConfigRegistry::from_catalog(&catalog).unwrap());
    let mut gateway = ProviderGateway::new(fast_gateway_config());
    gateway.register("alpha", h.alpha.clone());
    gateway.register("beta", h.beta.clone());
    let orchestrator = Orchestrator::new(registry, Arc::new(gateway), h.store.clone());
    let id = new_conversation(&h.store, 100).await;
    h.alpha.push(MockOutcome::reply("idea from comfort", 5));
    h.beta.push(MockOutcome::reply("idea from advice", 7));

    let report = orchestrator.run(id, "give me ideas").await.unwrap();

    assert!(report.status.is_completed());
    assert_eq!(report.ai_messages.len(), 2);
    assert_eq!(report.ai_messages[0].step, Some(1));
    assert_eq!(report.ai_messages[0].content, "idea from comfort");
    assert_eq!(report.ai_messages[0].provider.as_deref(), Some("alpha"));
    assert_eq!(report.ai_messages[1].step, Some(2));
    assert_eq!(report.ai_messages[1].content, "idea from advice");
    assert_eq!(report.ai_messages[1].provider.as_deref(), Some("beta"));
    assert_eq!(report.spent_cents, 12);
}

#[tokio::test]
async fn test_group_member_failure_keeps_sibling_success() {
    // Pinned to alpha; one member succeeds, one fails with a terminal error
    let catalog = Catalog::from_toml(
        &catalog_toml(true).replace("default_flow = \"emotional-support\"", "default_flow = \"brainstorm\""),
    )
    .unwrap();
    let registry = Arc::new(ConfigRegistry::from_catalog(&catalog).unwrap());
    let alpha = Arc::new(MockProvider::new("alpha"));
    let mut gateway = ProviderGateway::new(fast_gateway_config());
    gateway.register("alpha", alpha.clone());
    gateway.register("beta", Arc::new(MockProvider::new("beta")));
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(registry, Arc::new(gateway), store.clone());
    let id = new_conversation(&store, 100).await;
    alpha.push(MockOutcome::reply("survivor", 5));
    alpha.push(MockOutcome::AuthFailure);

    let report = orchestrator.run(id, "ideas?").await.unwrap();

    // The successful member is persisted even though the group failed
    assert!(matches!(
        report.status,
        RunStatus::Failed(FailureReason::ProviderExhausted { .. })
    ));
    assert_eq!(report.ai_messages.len(), 1);
    assert_eq!(report.spent_cents, 5);
    let messages = store.list_messages(id).await.unwrap();
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn test_run_for_unknown_conversation_fails() {
    let h = harness(true, fast_gateway_config());
    let err = h.orchestrator.run(Uuid::new_v4(), "hi").await.unwrap_err();
    assert!(matches!(err, Error::ConversationNotFound(_)));
}

#[tokio::test]
async fn test_delete_conversation_cancels_active_run() {
    let h = harness(true, GatewayConfig::default());
    let id = new_conversation(&h.store, 100).await;
    h.alpha.push(MockOutcome::Hang);

    let orchestrator = h.orchestrator.clone();
    let run = tokio::spawn(async move { orchestrator.run(id, "hi").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.orchestrator.delete_conversation(id).await.unwrap());
    let report = run.await.unwrap().unwrap();
    assert_eq!(report.status, RunStatus::Failed(FailureReason::Cancelled));
    assert!(h.store.find_conversation(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_diagnostics_reflect_mode_toggle() {
    let h = harness(true, fast_gateway_config());

    let diag = h.orchestrator.diagnostics();
    assert!(diag.single_provider_mode);
    assert_eq!(diag.current_provider, "alpha");
    assert_eq!(diag.agents.len(), 2);
    assert_eq!(diag.agents[0].role_tag, "comfort-agent");
    assert_eq!(diag.flows.len(), 2);

    h.registry.set_single_provider_mode(false);
    assert!(!h.orchestrator.diagnostics().single_provider_mode);
}
