//! Replay-based decision engine
//!
//! Feeds every event but the last through a [`StateMachine`] to rebuild its
//! state, discarding whatever it would have decided, then lets the last event
//! produce the decisions for this task.

use tracing::{debug, trace};

use super::machine::{DeciderError, StateMachine};
use crate::workflow::{Decision, HistoryEvent};

/// Result of running an engine over one decision task
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub decisions: Vec<Decision>,
    /// Machine state after the last event
    pub state: String,
    /// Number of events replayed without deciding
    pub replayed: usize,
}

/// Single-use engine for one decision task
pub struct DecisionEngine {
    machine: Box<dyn StateMachine>,
    events: Vec<HistoryEvent>,
}

impl DecisionEngine {
    /// Create an engine over the full history, oldest first
    pub fn new(machine: Box<dyn StateMachine>, events: Vec<HistoryEvent>) -> Self {
        Self { machine, events }
    }

    /// Replay and decide; consumes the engine
    pub fn run(mut self) -> Result<DecisionOutcome, DeciderError> {
        for pair in self.events.windows(2) {
            if pair[1].event_id <= pair[0].event_id {
                return Err(DeciderError::OutOfOrder {
                    previous: pair[0].event_id,
                    event_id: pair[1].event_id,
                });
            }
        }

        let Some((last, history)) = self.events.split_last() else {
            return Ok(DecisionOutcome {
                decisions: Vec::new(),
                state: self.machine.state().to_string(),
                replayed: 0,
            });
        };

        for event in history {
            let discarded = self.machine.handle(event)?;
            if !discarded.is_empty() {
                trace!(
                    event_id = event.event_id,
                    event_type = event.event_type(),
                    discarded = discarded.len(),
                    "Replay decisions discarded"
                );
            }
        }

        let decisions = self.machine.handle(last)?;
        let state = self.machine.state().to_string();

        debug!(
            event_id = last.event_id,
            event_type = last.event_type(),
            state = %state,
            decisions = decisions.len(),
            "Decided"
        );

        Ok(DecisionOutcome {
            decisions,
            state,
            replayed: history.len(),
        })
    }
}
