//! Request and response shapes of the workflow service
//!
//! Field names follow the SWF JSON 1.0 protocol (camelCase). Payloads
//! (`input`, `result`, `control`) travel as strings and durations as
//! whole-second strings.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::workflow::{
    ActivityType, ChildPolicy, Decision, EventAttributes, HistoryEvent, TaskList,
    WorkflowExecution, WorkflowType,
};

// =============================================================================
// Type registration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWorkflowTypeRequest {
    pub domain: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_list: Option<TaskList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_execution_start_to_close_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_start_to_close_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_child_policy: Option<ChildPolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterActivityTypeRequest {
    pub domain: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_list: Option<TaskList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_heartbeat_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_schedule_to_close_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_schedule_to_start_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_start_to_close_timeout: Option<String>,
}

// =============================================================================
// Executions
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartWorkflowExecutionRequest {
    pub domain: String,
    pub workflow_id: String,
    pub workflow_type: WorkflowType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_list: Option<TaskList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_start_to_close_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_start_to_close_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_policy: Option<ChildPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_list: Vec<String>,
}

/// Result of starting an execution
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub run_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestCancelWorkflowExecutionRequest {
    pub domain: String,
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DescribeWorkflowExecutionRequest {
    pub domain: String,
    pub execution: WorkflowExecution,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkflowExecutionDetail {
    pub execution_info: WorkflowExecutionInfo,
    pub open_counts: WorkflowExecutionOpenCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_configuration: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_execution_context: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkflowExecutionInfo {
    pub execution: WorkflowExecution,
    pub workflow_type: WorkflowType,
    pub start_timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_timestamp: Option<f64>,
    /// `OPEN` or `CLOSED`
    pub execution_status: String,
    /// `COMPLETED`, `FAILED`, `CANCELED`, `CONTINUED_AS_NEW`, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_status: Option<String>,
    pub cancel_requested: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tag_list: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<WorkflowExecution>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkflowExecutionOpenCounts {
    pub open_activity_tasks: u32,
    pub open_decision_tasks: u32,
    pub open_timers: u32,
    pub open_child_workflow_executions: u32,
}

// =============================================================================
// Decision tasks
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollForDecisionTaskRequest {
    pub domain: String,
    pub task_list: TaskList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_order: Option<bool>,
}

/// One page of a decision task; an empty long poll has no task token
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DecisionTaskPage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_execution: Option<WorkflowExecution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<WorkflowType>,
    pub events: Vec<WireHistoryEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub previous_started_event_id: i64,
    pub started_event_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RespondDecisionTaskCompletedRequest {
    pub task_token: String,
    pub decisions: Vec<WireDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_context: Option<String>,
}

// =============================================================================
// Activity tasks
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollForActivityTaskRequest {
    pub domain: String,
    pub task_list: TaskList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

/// An activity task; an empty long poll has no task token
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivityTaskResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<ActivityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub started_event_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_execution: Option<WorkflowExecution>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RespondActivityTaskCompletedRequest {
    pub task_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RespondActivityTaskFailedRequest {
    pub task_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RespondActivityTaskCanceledRequest {
    pub task_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordActivityTaskHeartbeatRequest {
    pub task_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivityTaskStatus {
    pub cancel_requested: bool,
}

// =============================================================================
// History events
// =============================================================================

/// A history event as the service sends it
///
/// The type-specific payload sits under `<eventType>EventAttributes` with a
/// lower-cased first letter, e.g. `activityTaskCompletedEventAttributes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireHistoryEvent {
    pub event_id: i64,
    /// Seconds since the epoch
    pub event_timestamp: f64,
    pub event_type: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl WireHistoryEvent {
    pub fn new(event_id: i64, event_type: impl Into<String>, attributes: Value) -> Self {
        let event_type = event_type.into();
        let mut map = Map::new();
        if attributes.is_object() {
            map.insert(attributes_key(&event_type), attributes);
        }
        Self {
            event_id,
            event_timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
            event_type,
            attributes: map,
        }
    }

    /// The type-specific attribute object, if present
    pub fn attributes(&self) -> Option<&Map<String, Value>> {
        self.attributes
            .get(&attributes_key(&self.event_type))
            .and_then(Value::as_object)
    }

    /// Project into the typed history event
    pub fn to_event(&self) -> HistoryEvent {
        let fields = Fields(self.attributes());
        let attributes = match self.event_type.as_str() {
            "WorkflowExecutionStarted" => EventAttributes::WorkflowExecutionStarted {
                input: fields.payload("input"),
                workflow_type: fields.workflow_type("workflowType"),
                task_list: fields.task_list("taskList"),
                tag_list: fields.strings("tagList"),
                parent_workflow_execution: fields.execution("parentWorkflowExecution"),
            },
            "WorkflowExecutionCancelRequested" => {
                EventAttributes::WorkflowExecutionCancelRequested {
                    cause: fields.opt_string("cause"),
                }
            }
            "WorkflowExecutionSignaled" => EventAttributes::WorkflowExecutionSignaled {
                signal_name: fields.string("signalName"),
                input: fields.payload("input"),
            },
            "WorkflowExecutionCompleted" => EventAttributes::WorkflowExecutionCompleted {
                result: fields.payload("result"),
            },
            "WorkflowExecutionFailed" => EventAttributes::WorkflowExecutionFailed {
                reason: fields.opt_string("reason"),
                details: fields.opt_string("details"),
            },
            "WorkflowExecutionCanceled" => EventAttributes::WorkflowExecutionCanceled {
                details: fields.opt_string("details"),
            },
            "CompleteWorkflowExecutionFailed" => {
                EventAttributes::CompleteWorkflowExecutionFailed {
                    cause: fields.string("cause"),
                    decision_task_completed_event_id: fields.id("decisionTaskCompletedEventId"),
                }
            }
            "FailWorkflowExecutionFailed" => EventAttributes::FailWorkflowExecutionFailed {
                cause: fields.string("cause"),
                decision_task_completed_event_id: fields.id("decisionTaskCompletedEventId"),
            },
            "CancelWorkflowExecutionFailed" => EventAttributes::CancelWorkflowExecutionFailed {
                cause: fields.string("cause"),
                decision_task_completed_event_id: fields.id("decisionTaskCompletedEventId"),
            },
            "DecisionTaskScheduled" => EventAttributes::DecisionTaskScheduled {
                task_list: fields.task_list("taskList"),
            },
            "DecisionTaskStarted" => EventAttributes::DecisionTaskStarted {
                scheduled_event_id: fields.id("scheduledEventId"),
                identity: fields.opt_string("identity"),
            },
            "DecisionTaskCompleted" => EventAttributes::DecisionTaskCompleted {
                scheduled_event_id: fields.id("scheduledEventId"),
                started_event_id: fields.id("startedEventId"),
                execution_context: fields.opt_string("executionContext"),
            },
            "DecisionTaskTimedOut" => EventAttributes::DecisionTaskTimedOut {
                scheduled_event_id: fields.id("scheduledEventId"),
                started_event_id: fields.id("startedEventId"),
                timeout_type: fields.string("timeoutType"),
            },
            "ActivityTaskScheduled" => EventAttributes::ActivityTaskScheduled {
                activity_id: fields.string("activityId"),
                activity_type: fields.activity_type("activityType"),
                input: fields.payload("input"),
                control: fields.payload("control"),
                task_list: fields.task_list("taskList"),
                decision_task_completed_event_id: fields.id("decisionTaskCompletedEventId"),
            },
            "ScheduleActivityTaskFailed" => EventAttributes::ScheduleActivityTaskFailed {
                activity_id: fields.string("activityId"),
                activity_type: fields.activity_type("activityType"),
                cause: fields.string("cause"),
            },
            "ActivityTaskStarted" => EventAttributes::ActivityTaskStarted {
                scheduled_event_id: fields.id("scheduledEventId"),
                identity: fields.opt_string("identity"),
            },
            "ActivityTaskCompleted" => EventAttributes::ActivityTaskCompleted {
                scheduled_event_id: fields.id("scheduledEventId"),
                started_event_id: fields.id("startedEventId"),
                result: fields.payload("result"),
            },
            "ActivityTaskFailed" => EventAttributes::ActivityTaskFailed {
                scheduled_event_id: fields.id("scheduledEventId"),
                started_event_id: fields.id("startedEventId"),
                reason: fields.opt_string("reason"),
                details: fields.opt_string("details"),
            },
            "ActivityTaskTimedOut" => EventAttributes::ActivityTaskTimedOut {
                scheduled_event_id: fields.id("scheduledEventId"),
                started_event_id: fields.id("startedEventId"),
                timeout_type: fields.string("timeoutType"),
                details: fields.opt_string("details"),
            },
            "ActivityTaskCanceled" => EventAttributes::ActivityTaskCanceled {
                scheduled_event_id: fields.id("scheduledEventId"),
                started_event_id: fields.id("startedEventId"),
                details: fields.opt_string("details"),
            },
            "ActivityTaskCancelRequested" => EventAttributes::ActivityTaskCancelRequested {
                activity_id: fields.string("activityId"),
            },
            "TimerStarted" => EventAttributes::TimerStarted {
                timer_id: fields.string("timerId"),
                start_to_fire_timeout: fields.duration("startToFireTimeout"),
                control: fields.payload("control"),
            },
            "TimerFired" => EventAttributes::TimerFired {
                timer_id: fields.string("timerId"),
                started_event_id: fields.id("startedEventId"),
            },
            "TimerCanceled" => EventAttributes::TimerCanceled {
                timer_id: fields.string("timerId"),
                started_event_id: fields.id("startedEventId"),
            },
            "MarkerRecorded" => EventAttributes::MarkerRecorded {
                marker_name: fields.string("markerName"),
                details: fields.opt_string("details"),
            },
            other => EventAttributes::Other {
                event_type: other.to_string(),
                attributes: self
                    .attributes()
                    .map(|m| Value::Object(m.clone()))
                    .unwrap_or(Value::Null),
            },
        };

        let timestamp = DateTime::from_timestamp_millis((self.event_timestamp * 1000.0) as i64)
            .unwrap_or_default();

        HistoryEvent::new(self.event_id, attributes).with_timestamp(timestamp)
    }
}

fn attributes_key(event_type: &str) -> String {
    let mut chars = event_type.chars();
    match chars.next() {
        Some(first) => format!(
            "{}{}EventAttributes",
            first.to_ascii_lowercase(),
            chars.as_str()
        ),
        None => "eventAttributes".to_string(),
    }
}

/// Lenient reader over an event attribute object
struct Fields<'a>(Option<&'a Map<String, Value>>);

impl Fields<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        self.0.and_then(|m| m.get(key))
    }

    fn opt_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn string(&self, key: &str) -> String {
        self.opt_string(key).unwrap_or_default()
    }

    fn id(&self, key: &str) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or_default()
    }

    fn payload(&self, key: &str) -> Option<Value> {
        self.get(key).and_then(Value::as_str).map(parse_payload)
    }

    fn duration(&self, key: &str) -> Duration {
        self.get(key)
            .and_then(|v| match v {
                Value::String(s) => s.parse::<u64>().ok(),
                other => other.as_u64(),
            })
            .map(Duration::from_secs)
            .unwrap_or_default()
    }

    fn strings(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn task_list(&self, key: &str) -> TaskList {
        self.decode(key).unwrap_or_default()
    }

    fn workflow_type(&self, key: &str) -> WorkflowType {
        self.decode(key).unwrap_or_default()
    }

    fn activity_type(&self, key: &str) -> ActivityType {
        self.decode(key).unwrap_or_default()
    }

    fn execution(&self, key: &str) -> Option<WorkflowExecution> {
        self.decode(key)
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Parse a JSON payload string, keeping non-JSON text as a string value
pub fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Encode a payload value as the JSON text the service stores
pub fn encode_payload(value: &Value) -> String {
    value.to_string()
}

/// Encode a duration as whole seconds, rounding fractions up so a non-zero
/// duration never encodes as `"0"`
pub fn encode_duration(duration: Duration) -> String {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.to_string()
}

// =============================================================================
// Decisions
// =============================================================================

/// A decision as the service expects it
///
/// Exactly one attribute block is populated, matching `decision_type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WireDecision {
    pub decision_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_activity_task_decision_attributes: Option<ScheduleActivityTaskAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_timer_decision_attributes: Option<StartTimerAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_workflow_execution_decision_attributes:
        Option<CompleteWorkflowExecutionAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_workflow_execution_decision_attributes: Option<FailWorkflowExecutionAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_workflow_execution_decision_attributes: Option<CancelWorkflowExecutionAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_external_workflow_execution_decision_attributes:
        Option<SignalExternalWorkflowExecutionAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_child_workflow_execution_decision_attributes:
        Option<StartChildWorkflowExecutionAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_marker_decision_attributes: Option<RecordMarkerAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_cancel_activity_task_decision_attributes:
        Option<RequestCancelActivityTaskAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_as_new_workflow_execution_decision_attributes:
        Option<ContinueAsNewWorkflowExecutionAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_timer_decision_attributes: Option<CancelTimerAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_cancel_external_workflow_execution_decision_attributes:
        Option<RequestCancelExternalWorkflowExecutionAttributes>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ScheduleActivityTaskAttributes {
    pub activity_id: String,
    pub activity_type: ActivityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_list: Option<TaskList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_to_close_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_to_start_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_to_close_timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StartTimerAttributes {
    pub timer_id: String,
    pub start_to_fire_timeout: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CompleteWorkflowExecutionAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FailWorkflowExecutionAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CancelWorkflowExecutionAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SignalExternalWorkflowExecutionAttributes {
    pub workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub signal_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StartChildWorkflowExecutionAttributes {
    pub workflow_id: String,
    pub workflow_type: WorkflowType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_list: Option<TaskList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_start_to_close_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_start_to_close_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_policy: Option<ChildPolicy>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tag_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordMarkerAttributes {
    pub marker_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestCancelActivityTaskAttributes {
    pub activity_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ContinueAsNewWorkflowExecutionAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_list: Option<TaskList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_type_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_start_to_close_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_start_to_close_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_policy: Option<ChildPolicy>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tag_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CancelTimerAttributes {
    pub timer_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestCancelExternalWorkflowExecutionAttributes {
    pub workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,
}

impl WireDecision {
    fn of(decision_type: &str) -> Self {
        Self {
            decision_type: decision_type.to_string(),
            ..Default::default()
        }
    }
}

impl From<&Decision> for WireDecision {
    fn from(decision: &Decision) -> Self {
        let payload = |v: &Option<Value>| v.as_ref().map(encode_payload);
        let seconds = |d: &Option<Duration>| d.map(encode_duration);
        let task_list = |name: &Option<String>| name.as_ref().map(TaskList::new);

        let base = WireDecision::of(decision.decision_type());
        match decision {
            Decision::ScheduleActivityTask {
                activity_id,
                activity_type,
                input,
                control,
                task_list_name,
                heartbeat_timeout,
                schedule_to_close_timeout,
                schedule_to_start_timeout,
                start_to_close_timeout,
            } => WireDecision {
                schedule_activity_task_decision_attributes: Some(ScheduleActivityTaskAttributes {
                    activity_id: activity_id.clone(),
                    activity_type: activity_type.clone(),
                    input: payload(input),
                    control: payload(control),
                    task_list: task_list(task_list_name),
                    heartbeat_timeout: seconds(heartbeat_timeout),
                    schedule_to_close_timeout: seconds(schedule_to_close_timeout),
                    schedule_to_start_timeout: seconds(schedule_to_start_timeout),
                    start_to_close_timeout: seconds(start_to_close_timeout),
                }),
                ..base
            },
            Decision::StartTimer {
                timer_id,
                start_to_fire_timeout,
                control,
            } => WireDecision {
                start_timer_decision_attributes: Some(StartTimerAttributes {
                    timer_id: timer_id.clone(),
                    start_to_fire_timeout: encode_duration(*start_to_fire_timeout),
                    control: payload(control),
                }),
                ..base
            },
            Decision::CompleteWorkflowExecution { result } => WireDecision {
                complete_workflow_execution_decision_attributes: Some(
                    CompleteWorkflowExecutionAttributes {
                        result: payload(result),
                    },
                ),
                ..base
            },
            Decision::FailWorkflowExecution { reason, details } => WireDecision {
                fail_workflow_execution_decision_attributes: Some(
                    FailWorkflowExecutionAttributes {
                        reason: reason.clone(),
                        details: details.clone(),
                    },
                ),
                ..base
            },
            Decision::CancelWorkflowExecution { details } => WireDecision {
                cancel_workflow_execution_decision_attributes: Some(
                    CancelWorkflowExecutionAttributes {
                        details: details.clone(),
                    },
                ),
                ..base
            },
            Decision::SignalExternalWorkflowExecution {
                workflow_id,
                run_id,
                signal_name,
                input,
                control,
            } => WireDecision {
                signal_external_workflow_execution_decision_attributes: Some(
                    SignalExternalWorkflowExecutionAttributes {
                        workflow_id: workflow_id.clone(),
                        run_id: run_id.clone(),
                        signal_name: signal_name.clone(),
                        input: payload(input),
                        control: payload(control),
                    },
                ),
                ..base
            },
            Decision::StartChildWorkflowExecution {
                workflow_id,
                workflow_type,
                input,
                control,
                task_list_name,
                execution_start_to_close_timeout,
                task_start_to_close_timeout,
                child_policy,
                tag_list,
            } => WireDecision {
                start_child_workflow_execution_decision_attributes: Some(
                    StartChildWorkflowExecutionAttributes {
                        workflow_id: workflow_id.clone(),
                        workflow_type: workflow_type.clone(),
                        input: payload(input),
                        control: payload(control),
                        task_list: task_list(task_list_name),
                        execution_start_to_close_timeout: seconds(
                            execution_start_to_close_timeout,
                        ),
                        task_start_to_close_timeout: seconds(task_start_to_close_timeout),
                        child_policy: *child_policy,
                        tag_list: tag_list.clone(),
                    },
                ),
                ..base
            },
            Decision::RecordMarker {
                marker_name,
                details,
            } => WireDecision {
                record_marker_decision_attributes: Some(RecordMarkerAttributes {
                    marker_name: marker_name.clone(),
                    details: details.clone(),
                }),
                ..base
            },
            Decision::RequestCancelActivityTask { activity_id } => WireDecision {
                request_cancel_activity_task_decision_attributes: Some(
                    RequestCancelActivityTaskAttributes {
                        activity_id: activity_id.clone(),
                    },
                ),
                ..base
            },
            Decision::ContinueAsNewWorkflowExecution {
                input,
                task_list_name,
                workflow_type_version,
                execution_start_to_close_timeout,
                task_start_to_close_timeout,
                child_policy,
                tag_list,
            } => WireDecision {
                continue_as_new_workflow_execution_decision_attributes: Some(
                    ContinueAsNewWorkflowExecutionAttributes {
                        input: payload(input),
                        task_list: task_list(task_list_name),
                        workflow_type_version: workflow_type_version.clone(),
                        execution_start_to_close_timeout: seconds(
                            execution_start_to_close_timeout,
                        ),
                        task_start_to_close_timeout: seconds(task_start_to_close_timeout),
                        child_policy: *child_policy,
                        tag_list: tag_list.clone(),
                    },
                ),
                ..base
            },
            Decision::CancelTimer { timer_id } => WireDecision {
                cancel_timer_decision_attributes: Some(CancelTimerAttributes {
                    timer_id: timer_id.clone(),
                }),
                ..base
            },
            Decision::RequestCancelExternalWorkflowExecution {
                workflow_id,
                run_id,
                control,
            } => WireDecision {
                request_cancel_external_workflow_execution_decision_attributes: Some(
                    RequestCancelExternalWorkflowExecutionAttributes {
                        workflow_id: workflow_id.clone(),
                        run_id: run_id.clone(),
                        control: payload(control),
                    },
                ),
                ..base
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attributes_key() {
        assert_eq!(
            attributes_key("ActivityTaskCompleted"),
            "activityTaskCompletedEventAttributes"
        );
    }

    #[test]
    fn test_parse_service_event() {
        let wire: WireHistoryEvent = serde_json::from_value(json!({
            "eventId": 7,
            "eventTimestamp": 1_700_000_000.5,
            "eventType": "ActivityTaskCompleted",
            "activityTaskCompletedEventAttributes": {
                "scheduledEventId": 5,
                "startedEventId": 6,
                "result": "{\"status\":200}"
            }
        }))
        .unwrap();

        let event = wire.to_event();
        assert_eq!(event.event_id, 7);
        assert_eq!(event.event_timestamp.timestamp(), 1_700_000_000);
        assert_eq!(
            event.attributes,
            EventAttributes::ActivityTaskCompleted {
                scheduled_event_id: 5,
                started_event_id: 6,
                result: Some(json!({"status": 200})),
            }
        );
    }

    #[test]
    fn test_workflow_started_projection() {
        let wire = WireHistoryEvent::new(
            1,
            "WorkflowExecutionStarted",
            json!({
                "input": "{\"userId\":\"123abc\"}",
                "workflowType": {"name": "migration", "version": "1.0"},
                "taskList": {"name": "decisions"},
                "tagList": ["vip"]
            }),
        );

        match wire.to_event().attributes {
            EventAttributes::WorkflowExecutionStarted {
                input,
                workflow_type,
                task_list,
                tag_list,
                parent_workflow_execution,
            } => {
                assert_eq!(input, Some(json!({"userId": "123abc"})));
                assert_eq!(workflow_type, WorkflowType::new("migration", "1.0"));
                assert_eq!(task_list.name, "decisions");
                assert_eq!(tag_list, vec!["vip".to_string()]);
                assert!(parent_workflow_execution.is_none());
            }
            other => panic!("unexpected attributes: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_kept_as_other() {
        let wire = WireHistoryEvent::new(
            3,
            "LambdaFunctionScheduled",
            json!({"id": "fn-1"}),
        );

        let event = wire.to_event();
        assert_eq!(event.event_type(), "LambdaFunctionScheduled");
        assert!(matches!(
            event.attributes,
            EventAttributes::Other { ref attributes, .. } if attributes["id"] == "fn-1"
        ));
    }

    #[test]
    fn test_refused_close_projection() {
        let wire = WireHistoryEvent::new(
            11,
            "FailWorkflowExecutionFailed",
            json!({"cause": "UNHANDLED_DECISION", "decisionTaskCompletedEventId": 10}),
        );

        let event = wire.to_event();
        assert_eq!(
            event.attributes,
            EventAttributes::FailWorkflowExecutionFailed {
                cause: "UNHANDLED_DECISION".to_string(),
                decision_task_completed_event_id: 10,
            }
        );
    }

    #[test]
    fn test_durations_round_up_to_seconds() {
        assert_eq!(encode_duration(Duration::from_millis(40)), "1");
        assert_eq!(encode_duration(Duration::from_millis(1500)), "2");
        assert_eq!(encode_duration(Duration::from_secs(120)), "120");
        assert_eq!(encode_duration(Duration::ZERO), "0");
    }

    #[test]
    fn test_non_json_payload_kept_as_string() {
        assert_eq!(parse_payload("plain text"), json!("plain text"));
        assert_eq!(parse_payload("[1,2]"), json!([1, 2]));
    }

    #[test]
    fn test_schedule_activity_to_wire() {
        let decision = Decision::ScheduleActivityTask {
            activity_id: "migrate-12".into(),
            activity_type: ActivityType::new("migrate", "0.1.0"),
            input: Some(json!({"userId": "u1"})),
            control: None,
            task_list_name: Some("heavy".into()),
            heartbeat_timeout: Some(Duration::from_secs(120)),
            schedule_to_close_timeout: None,
            schedule_to_start_timeout: None,
            start_to_close_timeout: None,
        };

        let wire = WireDecision::from(&decision);
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json["decisionType"], "ScheduleActivityTask");
        let attrs = &json["scheduleActivityTaskDecisionAttributes"];
        assert_eq!(attrs["activityId"], "migrate-12");
        assert_eq!(attrs["taskList"]["name"], "heavy");
        assert_eq!(attrs["heartbeatTimeout"], "120");
        assert_eq!(attrs["input"], "{\"userId\":\"u1\"}");
        assert!(attrs.get("control").is_none());
        assert!(json.get("startTimerDecisionAttributes").is_none());
    }

    #[test]
    fn test_every_decision_populates_its_own_block() {
        let decisions = vec![
            Decision::complete(Some(json!({"ok": true}))),
            Decision::fail("boom", None),
            Decision::cancel(None),
            Decision::start_timer("t1", Duration::from_secs(5)),
            Decision::request_cancel_activity("a1"),
            Decision::RecordMarker {
                marker_name: "m".into(),
                details: None,
            },
        ];

        for decision in &decisions {
            let json = serde_json::to_value(WireDecision::from(decision)).unwrap();
            let object = json.as_object().unwrap();
            // decisionType plus exactly one attribute block
            assert_eq!(object.len(), 2, "{:?}", json);
            assert_eq!(json["decisionType"], decision.decision_type());
        }
    }
}
