//! Tasks delivered by the workflow service

use serde_json::Value;

use super::event::HistoryEvent;
use super::types::{ActivityType, WorkflowExecution, WorkflowType};

/// A pending decision for one workflow execution
///
/// Carries the complete history (all pages) ordered by event id. The task
/// token authorizes exactly one response.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTask {
    pub task_token: String,
    pub workflow_execution: WorkflowExecution,
    pub workflow_type: WorkflowType,
    pub events: Vec<HistoryEvent>,
    pub previous_started_event_id: i64,
    pub started_event_id: i64,
}

impl DecisionTask {
    /// The most recent event, the only one a decider may act on
    pub fn last_event(&self) -> Option<&HistoryEvent> {
        self.events.last()
    }

    /// Events added since the previous decision task was started
    pub fn new_events(&self) -> impl Iterator<Item = &HistoryEvent> {
        let previous = self.previous_started_event_id;
        self.events.iter().filter(move |e| e.event_id > previous)
    }
}

/// A unit of work to execute
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityTask {
    pub task_token: String,
    pub activity_id: String,
    pub activity_type: ActivityType,
    pub input: Option<Value>,
    pub started_event_id: i64,
    pub workflow_execution: WorkflowExecution,
}
