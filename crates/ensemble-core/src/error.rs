//! Error types for ensemble-core

use thiserror::Error;
use uuid::Uuid;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or inconsistent catalog; raised at load time, before any
    /// run can reference the bad entry
    #[error("configuration error: {0}")]
    Config(String),

    /// Conversation does not exist
    #[error("conversation {0} not found")]
    ConversationNotFound(Uuid),

    /// A run is already active for this conversation; concurrent runs are
    /// rejected, not queued
    #[error("a run is already in flight for conversation {0}")]
    RunInProgress(Uuid),

    /// Record store failure
    #[error("store error: {0}")]
    Store(String),

    /// Provider layer error
    #[error("provider error: {0}")]
    Llm(#[from] ensemble_llm::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
