//! Run event stream
//!
//! Committed messages and run lifecycle changes are published on a
//! broadcast channel so a transport layer can forward them to subscribers
//! as they are produced. Slow subscribers lag (miss events) rather than
//! block the run.

use crate::store::StoredMessage;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted while a run executes
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run has started
    RunStarted {
        /// Run identifier
        run_id: Uuid,
        /// Owning conversation
        conversation_id: Uuid,
    },
    /// Classification resolved a flow
    FlowResolved {
        /// Run identifier
        run_id: Uuid,
        /// Selected flow name
        flow: String,
        /// Whether the default-flow fallback was taken
        fallback: bool,
    },
    /// An AI message was durably committed
    MessageCommitted {
        /// Run identifier
        run_id: Uuid,
        /// The committed message
        message: StoredMessage,
    },
    /// The run reached a terminal state
    RunFinished {
        /// Run identifier
        run_id: Uuid,
        /// Whether every step completed
        completed: bool,
        /// Failure reason label, when not completed
        reason: Option<String>,
        /// Conversation spend after the run, in cents
        spent_cents: u32,
    },
}

/// Broadcast-based event bus for run events
#[derive(Debug, Clone)]
pub struct RunEventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl RunEventBus {
    /// Create a bus with the given channel capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; returns the number of subscribers that got it
    pub fn publish(&self, event: RunEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Current number of active subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RunEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
