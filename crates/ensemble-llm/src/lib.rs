//! Provider abstraction for the Ensemble orchestration engine
//!
//! Upstream LLM vendors are opaque capabilities behind the [`ChatProvider`]
//! trait: given a completion request they produce text plus authoritative
//! usage and cost figures. The [`ProviderGateway`] sits on top and handles
//! everything the orchestrator should not care about:
//!
//! - model resolution (requested model, or the closest one a provider offers)
//! - single-provider vs. multi-provider resolution ([`ProviderMode`])
//! - bounded retry with exponential backoff for transient failures
//! - ordered candidate failover in multi-provider mode
//! - a fixed per-call timeout around every attempt
//!
//! The scriptable [`MockProvider`] exercises all of these paths in tests
//! without any network traffic.

pub mod completion;
pub mod error;
pub mod gateway;
pub mod message;
pub mod mock;
pub mod provider;
pub mod retry;

pub use completion::{CompletionRequest, CompletionResponse, TokenUsage};
pub use error::{CandidateFailure, Error, Result};
pub use gateway::{AgentBinding, GatewayConfig, GatewayReply, ProviderGateway, ProviderMode};
pub use message::{ChatMessage, ChatRole};
pub use mock::{MockOutcome, MockProvider};
pub use provider::ChatProvider;
pub use retry::{retry_with_backoff, RetryConfig, RetryError};
