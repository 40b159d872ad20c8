//! Workflow history events
//!
//! The service delivers history as an append-only, ordered list. Each event is
//! projected into a typed attribute payload; event types without a typed
//! projection are kept as [`EventAttributes::Other`] so a decider can still see
//! (and ignore) them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::types::{ActivityType, TaskList, WorkflowExecution, WorkflowType};

/// One entry of a workflow execution's history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEvent {
    /// Monotonic, unique within an execution
    pub event_id: i64,
    pub event_timestamp: DateTime<Utc>,
    pub attributes: EventAttributes,
}

impl HistoryEvent {
    pub fn new(event_id: i64, attributes: EventAttributes) -> Self {
        Self {
            event_id,
            event_timestamp: Utc::now(),
            attributes,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.event_timestamp = timestamp;
        self
    }

    /// Name of the event type as the service spells it
    pub fn event_type(&self) -> &str {
        self.attributes.event_type()
    }
}

/// Type-specific payload of a history event
#[derive(Debug, Clone, PartialEq)]
pub enum EventAttributes {
    // =========================================================================
    // Workflow execution
    // =========================================================================
    WorkflowExecutionStarted {
        input: Option<Value>,
        workflow_type: WorkflowType,
        task_list: TaskList,
        tag_list: Vec<String>,
        parent_workflow_execution: Option<WorkflowExecution>,
    },

    WorkflowExecutionCancelRequested {
        cause: Option<String>,
    },

    WorkflowExecutionSignaled {
        signal_name: String,
        input: Option<Value>,
    },

    WorkflowExecutionCompleted {
        result: Option<Value>,
    },

    WorkflowExecutionFailed {
        reason: Option<String>,
        details: Option<String>,
    },

    WorkflowExecutionCanceled {
        details: Option<String>,
    },

    /// A close decision the service refused, usually `UNHANDLED_DECISION`
    CompleteWorkflowExecutionFailed {
        cause: String,
        decision_task_completed_event_id: i64,
    },

    FailWorkflowExecutionFailed {
        cause: String,
        decision_task_completed_event_id: i64,
    },

    CancelWorkflowExecutionFailed {
        cause: String,
        decision_task_completed_event_id: i64,
    },

    // =========================================================================
    // Decision tasks
    // =========================================================================
    DecisionTaskScheduled {
        task_list: TaskList,
    },

    DecisionTaskStarted {
        scheduled_event_id: i64,
        identity: Option<String>,
    },

    DecisionTaskCompleted {
        scheduled_event_id: i64,
        started_event_id: i64,
        execution_context: Option<String>,
    },

    DecisionTaskTimedOut {
        scheduled_event_id: i64,
        started_event_id: i64,
        timeout_type: String,
    },

    // =========================================================================
    // Activity tasks
    // =========================================================================
    ActivityTaskScheduled {
        activity_id: String,
        activity_type: ActivityType,
        input: Option<Value>,
        control: Option<Value>,
        task_list: TaskList,
        decision_task_completed_event_id: i64,
    },

    ScheduleActivityTaskFailed {
        activity_id: String,
        activity_type: ActivityType,
        cause: String,
    },

    ActivityTaskStarted {
        scheduled_event_id: i64,
        identity: Option<String>,
    },

    ActivityTaskCompleted {
        scheduled_event_id: i64,
        started_event_id: i64,
        result: Option<Value>,
    },

    ActivityTaskFailed {
        scheduled_event_id: i64,
        started_event_id: i64,
        reason: Option<String>,
        details: Option<String>,
    },

    ActivityTaskTimedOut {
        scheduled_event_id: i64,
        started_event_id: i64,
        timeout_type: String,
        details: Option<String>,
    },

    ActivityTaskCanceled {
        scheduled_event_id: i64,
        started_event_id: i64,
        details: Option<String>,
    },

    ActivityTaskCancelRequested {
        activity_id: String,
    },

    // =========================================================================
    // Timers and markers
    // =========================================================================
    TimerStarted {
        timer_id: String,
        start_to_fire_timeout: Duration,
        control: Option<Value>,
    },

    TimerFired {
        timer_id: String,
        started_event_id: i64,
    },

    TimerCanceled {
        timer_id: String,
        started_event_id: i64,
    },

    MarkerRecorded {
        marker_name: String,
        details: Option<String>,
    },

    /// Any event type without a typed projection
    Other {
        event_type: String,
        attributes: Value,
    },
}

impl EventAttributes {
    pub fn event_type(&self) -> &str {
        match self {
            EventAttributes::WorkflowExecutionStarted { .. } => "WorkflowExecutionStarted",
            EventAttributes::WorkflowExecutionCancelRequested { .. } => {
                "WorkflowExecutionCancelRequested"
            }
            EventAttributes::WorkflowExecutionSignaled { .. } => "WorkflowExecutionSignaled",
            EventAttributes::WorkflowExecutionCompleted { .. } => "WorkflowExecutionCompleted",
            EventAttributes::WorkflowExecutionFailed { .. } => "WorkflowExecutionFailed",
            EventAttributes::WorkflowExecutionCanceled { .. } => "WorkflowExecutionCanceled",
            EventAttributes::CompleteWorkflowExecutionFailed { .. } => {
                "CompleteWorkflowExecutionFailed"
            }
            EventAttributes::FailWorkflowExecutionFailed { .. } => "FailWorkflowExecutionFailed",
            EventAttributes::CancelWorkflowExecutionFailed { .. } => {
                "CancelWorkflowExecutionFailed"
            }
            EventAttributes::DecisionTaskScheduled { .. } => "DecisionTaskScheduled",
            EventAttributes::DecisionTaskStarted { .. } => "DecisionTaskStarted",
            EventAttributes::DecisionTaskCompleted { .. } => "DecisionTaskCompleted",
            EventAttributes::DecisionTaskTimedOut { .. } => "DecisionTaskTimedOut",
            EventAttributes::ActivityTaskScheduled { .. } => "ActivityTaskScheduled",
            EventAttributes::ScheduleActivityTaskFailed { .. } => "ScheduleActivityTaskFailed",
            EventAttributes::ActivityTaskStarted { .. } => "ActivityTaskStarted",
            EventAttributes::ActivityTaskCompleted { .. } => "ActivityTaskCompleted",
            EventAttributes::ActivityTaskFailed { .. } => "ActivityTaskFailed",
            EventAttributes::ActivityTaskTimedOut { .. } => "ActivityTaskTimedOut",
            EventAttributes::ActivityTaskCanceled { .. } => "ActivityTaskCanceled",
            EventAttributes::ActivityTaskCancelRequested { .. } => "ActivityTaskCancelRequested",
            EventAttributes::TimerStarted { .. } => "TimerStarted",
            EventAttributes::TimerFired { .. } => "TimerFired",
            EventAttributes::TimerCanceled { .. } => "TimerCanceled",
            EventAttributes::MarkerRecorded { .. } => "MarkerRecorded",
            EventAttributes::Other { event_type, .. } => event_type,
        }
    }

    /// Scheduled event id for activity outcome events
    pub fn scheduled_event_id(&self) -> Option<i64> {
        match self {
            EventAttributes::ActivityTaskStarted {
                scheduled_event_id, ..
            }
            | EventAttributes::ActivityTaskCompleted {
                scheduled_event_id, ..
            }
            | EventAttributes::ActivityTaskFailed {
                scheduled_event_id, ..
            }
            | EventAttributes::ActivityTaskTimedOut {
                scheduled_event_id, ..
            }
            | EventAttributes::ActivityTaskCanceled {
                scheduled_event_id, ..
            } => Some(*scheduled_event_id),
            _ => None,
        }
    }

    /// Whether this event records a refused close decision
    pub fn is_close_failure(&self) -> bool {
        matches!(
            self,
            EventAttributes::CompleteWorkflowExecutionFailed { .. }
                | EventAttributes::FailWorkflowExecutionFailed { .. }
                | EventAttributes::CancelWorkflowExecutionFailed { .. }
        )
    }

    /// Whether this event closes the execution
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventAttributes::WorkflowExecutionCompleted { .. }
                | EventAttributes::WorkflowExecutionFailed { .. }
                | EventAttributes::WorkflowExecutionCanceled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_names() {
        let event = HistoryEvent::new(
            1,
            EventAttributes::DecisionTaskScheduled {
                task_list: TaskList::new("decisions"),
            },
        );
        assert_eq!(event.event_type(), "DecisionTaskScheduled");

        let other = EventAttributes::Other {
            event_type: "LambdaFunctionScheduled".to_string(),
            attributes: json!({}),
        };
        assert_eq!(other.event_type(), "LambdaFunctionScheduled");
    }

    #[test]
    fn test_scheduled_event_id_extraction() {
        let completed = EventAttributes::ActivityTaskCompleted {
            scheduled_event_id: 5,
            started_event_id: 6,
            result: None,
        };
        assert_eq!(completed.scheduled_event_id(), Some(5));

        let started = EventAttributes::DecisionTaskStarted {
            scheduled_event_id: 2,
            identity: None,
        };
        assert_eq!(started.scheduled_event_id(), None);
    }

    #[test]
    fn test_is_terminal() {
        assert!(EventAttributes::WorkflowExecutionCompleted { result: None }.is_terminal());
        assert!(EventAttributes::WorkflowExecutionCanceled { details: None }.is_terminal());
        assert!(!EventAttributes::WorkflowExecutionCancelRequested { cause: None }.is_terminal());
    }

    #[test]
    fn test_close_failures_are_not_terminal() {
        let failed = EventAttributes::FailWorkflowExecutionFailed {
            cause: "UNHANDLED_DECISION".to_string(),
            decision_task_completed_event_id: 9,
        };
        assert!(failed.is_close_failure());
        assert!(!failed.is_terminal());
        assert_eq!(failed.event_type(), "FailWorkflowExecutionFailed");
        assert!(!EventAttributes::WorkflowExecutionFailed {
            reason: None,
            details: None
        }
        .is_close_failure());
    }
}
