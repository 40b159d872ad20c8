//! State machine interface driven by workflow history

use crate::workflow::{Decision, HistoryEvent};

/// Errors raised while replaying or deciding
#[derive(Debug, thiserror::Error)]
pub enum DeciderError {
    /// Event ids must strictly increase
    #[error("history out of order: event {event_id} follows event {previous}")]
    OutOfOrder { previous: i64, event_id: i64 },

    /// The machine could not apply an event
    #[error("{state}::{event_type} (event {event_id}): {message}")]
    Transition {
        state: String,
        event_type: String,
        event_id: i64,
        message: String,
    },

    /// Failed to encode a decision payload
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A finite state machine over one workflow execution's history
///
/// `handle` is called once per event, oldest first. During replay the
/// returned decisions are discarded, so implementations must keep every
/// effect on the outside world in the returned decisions and never perform
/// it directly.
pub trait StateMachine: Send {
    /// Name of the current state
    fn state(&self) -> &str;

    /// Apply one event; event types with no transition in the current state
    /// must leave the state unchanged and return no decisions
    fn handle(&mut self, event: &HistoryEvent) -> Result<Vec<Decision>, DeciderError>;
}
