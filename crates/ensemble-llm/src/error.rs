//! Error types for ensemble-llm
//!
//! The variants split along the failover policy: transient errors are
//! retried and then advance to the next candidate, auth and content-policy
//! errors skip the candidate without retry, and `AllCandidatesExhausted` is
//! terminal for the step.

use thiserror::Error;

/// Outcome of one failed candidate attempt, kept for diagnostics
#[derive(Debug, Clone)]
pub struct CandidateFailure {
    /// Provider that was attempted
    pub provider: String,
    /// Last error the candidate produced
    pub error: String,
}

/// Provider error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not registered with the gateway
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// No model the provider offers is compatible with the request
    #[error("provider {provider} offers no model compatible with {model}")]
    NoCompatibleModel {
        /// Provider that was attempted
        provider: String,
        /// Model the agent asked for
        model: String,
    },

    /// Per-call timeout elapsed
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until retry is allowed, if the provider says
        retry_after: Option<u64>,
    },

    /// Upstream server failure (5xx-class)
    #[error("upstream error {status}: {message}")]
    Upstream {
        /// Status code reported by the provider
        status: u16,
        /// Detail message
        message: String,
    },

    /// Credentials rejected; never retried for this provider
    #[error("authentication failed for provider {0}")]
    Auth(String),

    /// Request refused on content-policy grounds; never retried
    #[error("content policy refusal: {0}")]
    ContentPolicy(String),

    /// Response could not be interpreted
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Every candidate in the resolution list failed
    #[error("all {} provider candidates exhausted", attempts.len())]
    AllCandidatesExhausted {
        /// Per-candidate failure summary, in attempt order
        attempts: Vec<CandidateFailure>,
    },
}

impl Error {
    /// Transient errors are retried locally and then trigger failover.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Upstream { .. }
        )
    }

    /// Fatal for the current candidate only: skip it without retrying,
    /// but keep going down the candidate list.
    #[must_use]
    pub fn is_candidate_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::ContentPolicy(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
