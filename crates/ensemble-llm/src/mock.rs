//! Scriptable mock provider for tests
//!
//! Outcomes are queued per provider; once the queue is empty every call
//! succeeds with a default reply. Requests are recorded so tests can assert
//! which model was used and how often a candidate was attempted.

use crate::completion::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::error::{Error, Result};
use crate::provider::ChatProvider;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted call outcome
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Successful completion
    Reply {
        /// Generated text
        text: String,
        /// Reported usage
        usage: TokenUsage,
        /// Reported cost in cents
        cost_cents: u32,
    },
    /// Transient timeout
    Timeout,
    /// Transient rate limit
    RateLimited,
    /// Transient upstream 5xx
    Upstream(u16),
    /// Non-retryable credential failure
    AuthFailure,
    /// Non-retryable content-policy refusal
    PolicyRefusal(String),
    /// Never-completing call (for cancellation tests); sleeps well past
    /// any sane gateway timeout before replying
    Hang,
}

impl MockOutcome {
    /// Successful reply with the given cost
    #[must_use]
    pub fn reply(text: impl Into<String>, cost_cents: u32) -> Self {
        Self::Reply {
            text: text.into(),
            usage: TokenUsage::new(10, 10),
            cost_cents,
        }
    }
}

/// A scriptable chat provider
pub struct MockProvider {
    name: String,
    models: Vec<String>,
    estimate_cents: u32,
    outcomes: Mutex<VecDeque<MockOutcome>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    /// Create a mock provider with one default model named after it
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let default_model = format!("{name}-default");
        Self {
            name,
            models: vec![default_model],
            estimate_cents: 1,
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Add an offered model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.models.push(model.into());
        self
    }

    /// Set the flat pre-flight estimate returned for every model
    #[must_use]
    pub fn with_estimate_cents(mut self, cents: u32) -> Self {
        self.estimate_cents = cents;
        self
    }

    /// Queue the next call outcome
    pub fn push(&self, outcome: MockOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    /// Number of calls received
    #[must_use]
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Model of the most recent request, if any
    #[must_use]
    pub fn last_model(&self) -> Option<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .map(|r| r.model.clone())
    }
}

#[async_trait::async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn available_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn default_model(&self) -> &str {
        &self.models[0]
    }

    fn estimate_cost_cents(&self, _model: &str, _max_tokens: u32) -> u32 {
        self.estimate_cents
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request.model.clone();
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let outcome = self
            .outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match outcome {
            Some(MockOutcome::Reply {
                text,
                usage,
                cost_cents,
            }) => Ok(CompletionResponse {
                content: text,
                usage: Some(usage),
                cost_cents: Some(cost_cents),
                model,
            }),
            Some(MockOutcome::Timeout) => Err(Error::Timeout(0)),
            Some(MockOutcome::RateLimited) => Err(Error::RateLimited { retry_after: None }),
            Some(MockOutcome::Upstream(status)) => Err(Error::Upstream {
                status,
                message: "scripted upstream failure".into(),
            }),
            Some(MockOutcome::AuthFailure) => Err(Error::Auth(self.name.clone())),
            Some(MockOutcome::PolicyRefusal(reason)) => Err(Error::ContentPolicy(reason)),
            Some(MockOutcome::Hang) => {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Err(Error::Timeout(600_000))
            }
            None => Ok(CompletionResponse {
                content: format!("{} reply", self.name),
                usage: Some(TokenUsage::new(10, 10)),
                cost_cents: Some(self.estimate_cents),
                model,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_outcomes_in_order() {
        let provider = MockProvider::new("alpha");
        provider.push(MockOutcome::RateLimited);
        provider.push(MockOutcome::reply("ok", 5));

        let first = provider
            .complete(CompletionRequest::new("alpha-default"))
            .await;
        assert!(matches!(first, Err(Error::RateLimited { .. })));

        let second = provider
            .complete(CompletionRequest::new("alpha-default"))
            .await
            .unwrap();
        assert_eq!(second.content, "ok");
        assert_eq!(second.cost_cents, Some(5));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_queue_yields_default_reply() {
        let provider = MockProvider::new("beta").with_estimate_cents(3);
        let reply = provider
            .complete(CompletionRequest::new("beta-default"))
            .await
            .unwrap();
        assert_eq!(reply.content, "beta reply");
        assert_eq!(reply.cost_cents, Some(3));
        assert_eq!(provider.last_model().as_deref(), Some("beta-default"));
    }
}
