//! ChatProvider trait definition
//!
//! Every upstream vendor is wrapped in one implementation of this trait.
//! The gateway never speaks a wire protocol itself.

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::Result;

/// Trait for chat providers
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name (matches the configured provider code)
    fn name(&self) -> &str;

    /// Models this provider offers
    fn available_models(&self) -> Vec<String>;

    /// Default model, used when nothing closer fits
    fn default_model(&self) -> &str;

    /// Map a requested model onto one this provider offers.
    ///
    /// Returns the requested model when offered, otherwise the provider's
    /// closest compatible model. `None` means the provider cannot serve the
    /// request at all and is excluded from candidate lists.
    fn resolve_model(&self, requested: &str) -> Option<String> {
        if self.available_models().iter().any(|m| m == requested) {
            Some(requested.to_string())
        } else {
            Some(self.default_model().to_string())
        }
    }

    /// Pre-flight cost estimate in cents, used for budget checks.
    ///
    /// This is only an upper-bound guess; the figure reported in the
    /// completion response is the authoritative one.
    fn estimate_cost_cents(&self, model: &str, max_tokens: u32) -> u32 {
        let _ = model;
        // 1 cent per 1K generated tokens, floor of 1
        (max_tokens / 1_000).max(1)
    }

    /// Complete a conversation
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}
