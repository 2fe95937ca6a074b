//! Conversation record store
//!
//! The persistence engine is an external collaborator; this module defines
//! the boundary the orchestrator writes through, plus an in-memory
//! implementation used in development and tests. Reads and writes are
//! linearizable per conversation; messages are append-only.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ensemble_llm::ChatMessage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Role of a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Incoming user turn
    User,
    /// Agent-produced turn
    Ai,
}

/// A chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation id
    pub id: Uuid,
    /// Conversation mode tag
    pub mode: String,
    /// Agents the caller restricted this conversation to (empty = all)
    pub selected_agents: Vec<String>,
    /// Cost ceiling in cents
    pub budget_cents: u32,
    /// Cents spent so far, updated as steps commit
    pub spent_cents: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a conversation with a fresh id and nothing spent
    #[must_use]
    pub fn new(mode: impl Into<String>, budget_cents: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode: mode.into(),
            selected_agents: Vec::new(),
            budget_cents,
            spent_cents: 0,
            created_at: Utc::now(),
        }
    }
}

/// One persisted turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message id
    pub id: Uuid,
    /// Owning conversation
    pub conversation_id: Uuid,
    /// Turn role
    pub role: MessageRole,
    /// Turn content
    pub content: String,
    /// Producing agent role tag, for AI turns
    pub agent_role_tag: Option<String>,
    /// Step index within the resolved flow, for AI turns (1-based)
    pub step: Option<u32>,
    /// Tokens consumed producing this turn
    pub tokens: u32,
    /// Cost in cents, as reported by the provider
    pub cost_cents: u32,
    /// Provider that served the turn
    pub provider: Option<String>,
    /// Commit time
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// View this message as a provider context turn
    #[must_use]
    pub fn as_chat_turn(&self) -> ChatMessage {
        match self.role {
            MessageRole::User => ChatMessage::user(&self.content),
            MessageRole::Ai => ChatMessage::assistant(&self.content),
        }
    }
}

/// Fields for a message about to be persisted
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Turn role
    pub role: MessageRole,
    /// Turn content
    pub content: String,
    /// Producing agent role tag
    pub agent_role_tag: Option<String>,
    /// Step index within the resolved flow
    pub step: Option<u32>,
    /// Tokens consumed
    pub tokens: u32,
    /// Cost in cents
    pub cost_cents: u32,
    /// Serving provider
    pub provider: Option<String>,
}

impl NewMessage {
    /// A plain user turn
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            agent_role_tag: None,
            step: None,
            tokens: 0,
            cost_cents: 0,
            provider: None,
        }
    }
}

/// Record store boundary the orchestrator writes through
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation
    async fn create_conversation(&self, conversation: Conversation) -> Result<()>;

    /// Find a conversation by id
    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// Append a message to a conversation
    async fn create_message(&self, conversation_id: Uuid, message: NewMessage)
        -> Result<StoredMessage>;

    /// Messages of a conversation, in append order
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<StoredMessage>>;

    /// Add to a conversation's spend; returns the new total
    async fn record_spend(&self, conversation_id: Uuid, cents: u32) -> Result<u32>;

    /// Delete a conversation and its messages
    async fn delete_conversation(&self, id: Uuid) -> Result<bool>;
}

#[derive(Default)]
struct StoreInner {
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Vec<StoredMessage>>,
}

/// In-memory store for development and tests; data is lost on restart
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, conversation: Conversation) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.messages.entry(conversation.id).or_default();
        inner.conversations.insert(conversation.id, conversation);
        Ok(())
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let inner = self.inner.read().await;
        Ok(inner.conversations.get(&id).cloned())
    }

    async fn create_message(
        &self,
        conversation_id: Uuid,
        message: NewMessage,
    ) -> Result<StoredMessage> {
        let mut inner = self.inner.write().await;
        if !inner.conversations.contains_key(&conversation_id) {
            return Err(Error::ConversationNotFound(conversation_id));
        }
        let stored = StoredMessage {
            id: Uuid::new_v4(),
            conversation_id,
            role: message.role,
            content: message.content,
            agent_role_tag: message.agent_role_tag,
            step: message.step,
            tokens: message.tokens,
            cost_cents: message.cost_cents,
            provider: message.provider,
            created_at: Utc::now(),
        };
        inner
            .messages
            .entry(conversation_id)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<StoredMessage>> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_spend(&self, conversation_id: Uuid, cents: u32) -> Result<u32> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(&conversation_id)
            .ok_or(Error::ConversationNotFound(conversation_id))?;
        conversation.spent_cents = conversation.spent_cents.saturating_add(cents);
        Ok(conversation.spent_cents)
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        inner.messages.remove(&id);
        Ok(inner.conversations.remove(&id).is_some())
    }
}
