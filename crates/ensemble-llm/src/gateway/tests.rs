use super::*;
use crate::mock::{MockOutcome, MockProvider};
use crate::retry::RetryConfig;
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> GatewayConfig {
    GatewayConfig::new()
        .with_call_timeout(Duration::from_millis(200))
        .with_retry(
            RetryConfig::new()
                .with_max_attempts(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        )
}

fn multi(active: &[&str]) -> ProviderMode {
    ProviderMode::Multi {
        active: active.iter().map(|s| s.to_string()).collect(),
    }
}

fn binding(provider: &str, model: &str) -> AgentBinding {
    AgentBinding {
        role_tag: "comfort-agent".into(),
        system_prompt: "You comfort people".into(),
        provider: provider.into(),
        model: model.into(),
        temperature: 0.7,
        max_tokens: 512,
    }
}

#[tokio::test]
async fn single_mode_uses_current_provider_without_failover() {
    let alpha = Arc::new(MockProvider::new("alpha"));
    let beta = Arc::new(MockProvider::new("beta"));
    alpha.push(MockOutcome::Upstream(503));
    alpha.push(MockOutcome::Upstream(503));
    alpha.push(MockOutcome::Upstream(503));

    let mut gateway = ProviderGateway::new(fast_config());
    gateway.register("alpha", alpha.clone());
    gateway.register("beta", beta.clone());

    let mode = ProviderMode::Single {
        provider: "alpha".into(),
    };
    let err = gateway
        .invoke(&binding("beta", "beta-default"), &[], &mode)
        .await
        .unwrap_err();

    // retried on alpha, never fell over to beta
    assert!(matches!(err, Error::Upstream { status: 503, .. }));
    assert_eq!(alpha.calls(), 3);
    assert_eq!(beta.calls(), 0);
}

#[tokio::test]
async fn single_mode_resolves_closest_model() {
    let alpha = Arc::new(MockProvider::new("alpha"));
    let mut gateway = ProviderGateway::new(fast_config());
    gateway.register("alpha", alpha.clone());

    let mode = ProviderMode::Single {
        provider: "alpha".into(),
    };
    let reply = gateway
        .invoke(&binding("alpha", "model-alpha-does-not-have"), &[], &mode)
        .await
        .unwrap();

    assert_eq!(reply.provider_used, "alpha");
    assert_eq!(alpha.last_model().as_deref(), Some("alpha-default"));
}

#[tokio::test]
async fn multi_mode_fails_over_after_transient_retries() {
    let alpha = Arc::new(MockProvider::new("alpha"));
    let beta = Arc::new(MockProvider::new("beta"));
    // alpha stays broken past the retry budget
    for _ in 0..3 {
        alpha.push(MockOutcome::RateLimited);
    }
    beta.push(MockOutcome::reply("from beta", 7));

    let mut gateway = ProviderGateway::new(fast_config());
    gateway.register("alpha", alpha.clone());
    gateway.register("beta", beta.clone());

    let reply = gateway
        .invoke(&binding("alpha", "alpha-default"), &[], &multi(&["alpha", "beta"]))
        .await
        .unwrap();

    assert_eq!(reply.provider_used, "beta");
    assert_eq!(reply.text, "from beta");
    assert_eq!(reply.cost_cents, 7);
    // full retry budget spent on alpha before failover
    assert_eq!(alpha.calls(), 3);
    assert_eq!(beta.calls(), 1);
}

#[tokio::test]
async fn auth_failure_skips_candidate_without_retry() {
    let alpha = Arc::new(MockProvider::new("alpha"));
    let beta = Arc::new(MockProvider::new("beta"));
    alpha.push(MockOutcome::AuthFailure);
    beta.push(MockOutcome::reply("recovered", 2));

    let mut gateway = ProviderGateway::new(fast_config());
    gateway.register("alpha", alpha.clone());
    gateway.register("beta", beta.clone());

    let reply = gateway
        .invoke(&binding("alpha", "alpha-default"), &[], &multi(&["alpha", "beta"]))
        .await
        .unwrap();

    assert_eq!(reply.provider_used, "beta");
    // exactly one call: no retry on auth errors
    assert_eq!(alpha.calls(), 1);
}

#[tokio::test]
async fn exhausting_all_candidates_reports_each_attempt() {
    let alpha = Arc::new(MockProvider::new("alpha"));
    let beta = Arc::new(MockProvider::new("beta"));
    alpha.push(MockOutcome::AuthFailure);
    beta.push(MockOutcome::PolicyRefusal("nope".into()));

    let mut gateway = ProviderGateway::new(fast_config());
    gateway.register("alpha", alpha);
    gateway.register("beta", beta);

    let err = gateway
        .invoke(&binding("alpha", "alpha-default"), &[], &multi(&["alpha", "beta"]))
        .await
        .unwrap_err();

    match err {
        Error::AllCandidatesExhausted { attempts } => {
            assert_eq!(attempts.len(), 2);
            assert_eq!(attempts[0].provider, "alpha");
            assert_eq!(attempts[1].provider, "beta");
        }
        other => panic!("expected AllCandidatesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn preferred_provider_leads_the_candidate_order() {
    let alpha = Arc::new(MockProvider::new("alpha"));
    let beta = Arc::new(MockProvider::new("beta"));
    let mut gateway = ProviderGateway::new(fast_config());
    gateway.register("alpha", alpha.clone());
    gateway.register("beta", beta.clone());

    // beta is preferred even though alpha registered first
    let reply = gateway
        .invoke(&binding("beta", "beta-default"), &[], &multi(&["alpha", "beta"]))
        .await
        .unwrap();

    assert_eq!(reply.provider_used, "beta");
    assert_eq!(alpha.calls(), 0);
}

#[tokio::test]
async fn provider_outside_active_list_is_never_attempted() {
    let alpha = Arc::new(MockProvider::new("alpha"));
    let beta = Arc::new(MockProvider::new("beta"));
    alpha.push(MockOutcome::AuthFailure);
    beta.push(MockOutcome::reply("should stay unused", 1));

    let mut gateway = ProviderGateway::new(fast_config());
    gateway.register("alpha", alpha.clone());
    gateway.register("beta", beta.clone());

    // beta is registered but not active: no failover to it
    let err = gateway
        .invoke(&binding("alpha", "alpha-default"), &[], &multi(&["alpha"]))
        .await
        .unwrap_err();

    match err {
        Error::AllCandidatesExhausted { attempts } => {
            assert_eq!(attempts.len(), 1);
            assert_eq!(attempts[0].provider, "alpha");
        }
        other => panic!("expected AllCandidatesExhausted, got {other:?}"),
    }
    assert_eq!(beta.calls(), 0);
}

#[tokio::test]
async fn inactive_preferred_provider_is_skipped() {
    let alpha = Arc::new(MockProvider::new("alpha"));
    let beta = Arc::new(MockProvider::new("beta"));
    let mut gateway = ProviderGateway::new(fast_config());
    gateway.register("alpha", alpha.clone());
    gateway.register("beta", beta.clone());

    // the agent prefers alpha, but only beta is active
    let reply = gateway
        .invoke(&binding("alpha", "alpha-default"), &[], &multi(&["beta"]))
        .await
        .unwrap();

    assert_eq!(reply.provider_used, "beta");
    assert_eq!(alpha.calls(), 0);
}

#[tokio::test]
async fn call_timeout_counts_as_transient() {
    let alpha = Arc::new(MockProvider::new("alpha"));
    let beta = Arc::new(MockProvider::new("beta"));
    alpha.push(MockOutcome::Hang);
    alpha.push(MockOutcome::Hang);
    alpha.push(MockOutcome::Hang);
    beta.push(MockOutcome::reply("rescued", 4));

    let mut gateway = ProviderGateway::new(fast_config());
    gateway.register("alpha", alpha.clone());
    gateway.register("beta", beta.clone());

    let reply = gateway
        .invoke(&binding("alpha", "alpha-default"), &[], &multi(&["alpha", "beta"]))
        .await
        .unwrap();

    assert_eq!(reply.provider_used, "beta");
    assert_eq!(alpha.calls(), 3);
}

#[tokio::test]
async fn estimate_uses_primary_candidate_pricing() {
    let alpha = Arc::new(MockProvider::new("alpha").with_estimate_cents(60));
    let beta = Arc::new(MockProvider::new("beta").with_estimate_cents(9));
    let mut gateway = ProviderGateway::new(fast_config());
    gateway.register("alpha", alpha);
    gateway.register("beta", beta);

    let b = binding("alpha", "alpha-default");
    assert_eq!(
        gateway.estimate_cost_cents(&b, &multi(&["alpha", "beta"])).unwrap(),
        60
    );
    assert_eq!(
        gateway
            .estimate_cost_cents(
                &b,
                &ProviderMode::Single {
                    provider: "beta".into()
                }
            )
            .unwrap(),
        9
    );
}

#[tokio::test]
async fn unknown_provider_is_a_config_error() {
    let gateway = ProviderGateway::new(fast_config());
    let err = gateway
        .invoke(
            &binding("ghost", "ghost-default"),
            &[],
            &ProviderMode::Single {
                provider: "ghost".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotConfigured(_)));
}
