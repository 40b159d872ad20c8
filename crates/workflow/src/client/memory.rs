//! In-memory workflow service
//!
//! Holds executions, histories and task queues behind a single lock and
//! follows the service's task semantics closely enough to drive the engine
//! end to end: long polls, history pages, one outstanding decision task per
//! execution, decision task timeouts with redelivery, timers, activity
//! cancellation through heartbeats, child executions and continue-as-new.
//!
//! Activity timeouts are not enforced, and the domain is not checked.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

use super::service::{ServiceError, ServiceErrorKind, WorkflowService};
use super::wire::{
    encode_duration, ActivityTaskResponse, ActivityTaskStatus,
    ContinueAsNewWorkflowExecutionAttributes, DecisionTaskPage, DescribeWorkflowExecutionRequest,
    PollForActivityTaskRequest, PollForDecisionTaskRequest, RecordActivityTaskHeartbeatRequest,
    RegisterActivityTypeRequest, RegisterWorkflowTypeRequest, RequestCancelWorkflowExecutionRequest,
    RespondActivityTaskCanceledRequest, RespondActivityTaskCompletedRequest,
    RespondActivityTaskFailedRequest, RespondDecisionTaskCompletedRequest, Run,
    ScheduleActivityTaskAttributes, SignalExternalWorkflowExecutionAttributes,
    StartChildWorkflowExecutionAttributes, StartWorkflowExecutionRequest, WireDecision,
    WireHistoryEvent, WorkflowExecutionDetail, WorkflowExecutionInfo, WorkflowExecutionOpenCounts,
};
use crate::workflow::{
    ActivityType, ChildPolicy, HistoryEvent, TaskList, WorkflowExecution, WorkflowType,
};

/// In-memory service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryConfig {
    /// How long a poll waits for work before returning empty
    pub poll_timeout: Duration,

    /// History events per decision task page
    pub page_size: usize,

    /// Decision task start-to-close timeout when neither the execution nor
    /// its type sets one
    pub decision_task_timeout: Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(60),
            page_size: 1000,
            decision_task_timeout: Duration::from_secs(60),
        }
    }
}

impl InMemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn with_decision_task_timeout(mut self, timeout: Duration) -> Self {
        self.decision_task_timeout = timeout;
        self
    }
}

/// Execution status as seen by [`InMemoryWorkflowService::execution_status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Open,
    Completed,
    Failed,
    Canceled,
    ContinuedAsNew,
}

impl ExecutionStatus {
    fn close_status(&self) -> Option<&'static str> {
        match self {
            ExecutionStatus::Open => None,
            ExecutionStatus::Completed => Some("COMPLETED"),
            ExecutionStatus::Failed => Some("FAILED"),
            ExecutionStatus::Canceled => Some("CANCELED"),
            ExecutionStatus::ContinuedAsNew => Some("CONTINUED_AS_NEW"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum DecisionState {
    Idle,
    Scheduled,
    Started {
        scheduled_event_id: i64,
        started_event_id: i64,
        token: String,
    },
}

#[derive(Debug, Clone)]
struct OpenActivity {
    scheduled_event_id: i64,
    activity_type: ActivityType,
    input: Option<String>,
    started: Option<(i64, String)>,
    cancel_requested: bool,
    details: Option<String>,
}

#[derive(Debug)]
struct Execution {
    execution: WorkflowExecution,
    workflow_type: WorkflowType,
    task_list: TaskList,
    decision_timeout: Duration,
    tag_list: Vec<String>,
    parent: Option<(WorkflowExecution, i64)>,
    children: Vec<String>,
    history: Vec<WireHistoryEvent>,
    status: ExecutionStatus,
    cancel_requested: bool,
    decision: DecisionState,
    decision_pending: bool,
    scheduled_event_id: i64,
    previous_started_event_id: i64,
    activities: HashMap<String, OpenActivity>,
    timers: HashMap<String, i64>,
    started_at: f64,
    closed_at: Option<f64>,
    latest_execution_context: Option<String>,
}

impl Execution {
    fn append(&mut self, event_type: &str, attributes: Value) -> i64 {
        let event_id = self.history.len() as i64 + 1;
        self.history
            .push(WireHistoryEvent::new(event_id, event_type, attributes));
        event_id
    }

    fn is_open(&self) -> bool {
        self.status == ExecutionStatus::Open
    }
}

/// Parameters for creating an execution
struct NewExecution {
    workflow_id: String,
    workflow_type: WorkflowType,
    task_list: Option<TaskList>,
    input: Option<String>,
    execution_start_to_close_timeout: Option<String>,
    task_start_to_close_timeout: Option<String>,
    child_policy: Option<ChildPolicy>,
    tag_list: Vec<String>,
    parent: Option<(WorkflowExecution, i64)>,
}

/// Work to schedule once the state lock is released
enum Effect {
    DecisionTimeout {
        run_id: String,
        token: String,
        after: Duration,
    },
    Timer {
        run_id: String,
        timer_id: String,
        started_event_id: i64,
        after: Duration,
    },
}

struct PendingPages {
    template: DecisionTaskPage,
    remaining: VecDeque<WireHistoryEvent>,
    page_size: usize,
}

#[derive(Default)]
struct State {
    workflow_types: HashMap<String, RegisterWorkflowTypeRequest>,
    activity_types: HashMap<String, RegisterActivityTypeRequest>,
    executions: HashMap<String, Execution>,
    open_runs: HashMap<String, String>,
    latest_runs: HashMap<String, String>,
    decision_queues: HashMap<String, VecDeque<String>>,
    activity_queues: HashMap<String, VecDeque<(String, String)>>,
    decision_leases: HashMap<String, String>,
    activity_leases: HashMap<String, (String, String)>,
    pages: HashMap<String, PendingPages>,
}

fn unknown_execution(workflow_id: &str) -> ServiceError {
    ServiceError::unknown_resource(format!("Unknown execution: workflowId={}", workflow_id))
}

fn unknown_token() -> ServiceError {
    ServiceError::unknown_resource("Unknown task token")
}

fn parse_secs(value: &Option<String>) -> Option<Duration> {
    value
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Event recorded when a closing decision cannot be applied
fn close_failure_event(decision_type: &str) -> Option<&'static str> {
    match decision_type {
        "CompleteWorkflowExecution" => Some("CompleteWorkflowExecutionFailed"),
        "FailWorkflowExecution" => Some("FailWorkflowExecutionFailed"),
        "CancelWorkflowExecution" => Some("CancelWorkflowExecutionFailed"),
        "ContinueAsNewWorkflowExecution" => Some("ContinueAsNewWorkflowExecutionFailed"),
        _ => None,
    }
}

impl State {
    /// Queue a decision task unless one is already scheduled or running
    fn schedule_decision(&mut self, run_id: &str) {
        let Some(exec) = self.executions.get_mut(run_id) else {
            return;
        };
        if !exec.is_open() {
            return;
        }
        match exec.decision {
            DecisionState::Idle => {
                let task_list = exec.task_list.clone();
                exec.scheduled_event_id = exec.append(
                    "DecisionTaskScheduled",
                    json!({
                        "taskList": task_list,
                        "startToCloseTimeout": encode_duration(exec.decision_timeout),
                    }),
                );
                exec.decision = DecisionState::Scheduled;
                self.decision_queues
                    .entry(task_list.name)
                    .or_default()
                    .push_back(run_id.to_string());
            }
            DecisionState::Scheduled => {}
            DecisionState::Started { .. } => exec.decision_pending = true,
        }
    }

    fn find_open_run(&self, workflow_id: &str, run_id: Option<&str>) -> Option<String> {
        match run_id.filter(|r| !r.is_empty()) {
            Some(run_id) => self
                .executions
                .get(run_id)
                .filter(|e| e.is_open() && e.execution.workflow_id == workflow_id)
                .map(|_| run_id.to_string()),
            None => self.open_runs.get(workflow_id).cloned(),
        }
    }

    fn start_execution(&mut self, params: NewExecution, fallback: Duration) -> Result<String, ServiceError> {
        let key = params.workflow_type.key();
        let Some(registered) = self.workflow_types.get(&key) else {
            return Err(ServiceError::unknown_resource(format!(
                "Unknown type: WorkflowType=[name={}, version={}]",
                params.workflow_type.name, params.workflow_type.version
            )));
        };
        if self.open_runs.contains_key(&params.workflow_id) {
            return Err(ServiceError::new(
                ServiceErrorKind::WorkflowExecutionAlreadyStarted,
                format!("workflowId={}", params.workflow_id),
            ));
        }
        let Some(task_list) = params
            .task_list
            .clone()
            .or_else(|| registered.default_task_list.clone())
        else {
            return Err(ServiceError::new(
                ServiceErrorKind::DefaultUndefined,
                "No task list given and the workflow type has no default",
            ));
        };

        let task_timeout = params
            .task_start_to_close_timeout
            .clone()
            .or_else(|| registered.default_task_start_to_close_timeout.clone());
        let execution_timeout = params
            .execution_start_to_close_timeout
            .clone()
            .or_else(|| registered.default_execution_start_to_close_timeout.clone());
        let child_policy = params.child_policy.or(registered.default_child_policy);

        let run_id = Uuid::now_v7().to_string();
        let mut exec = Execution {
            execution: WorkflowExecution::new(&params.workflow_id, &run_id),
            workflow_type: params.workflow_type.clone(),
            task_list: task_list.clone(),
            decision_timeout: parse_secs(&task_timeout).unwrap_or(fallback),
            tag_list: params.tag_list.clone(),
            parent: params.parent.clone(),
            children: Vec::new(),
            history: Vec::new(),
            status: ExecutionStatus::Open,
            cancel_requested: false,
            decision: DecisionState::Idle,
            decision_pending: false,
            scheduled_event_id: 0,
            previous_started_event_id: 0,
            activities: HashMap::new(),
            timers: HashMap::new(),
            started_at: now_secs(),
            closed_at: None,
            latest_execution_context: None,
        };

        let (parent_execution, parent_initiated) = match &params.parent {
            Some((execution, initiated)) => (Some(execution.clone()), Some(*initiated)),
            None => (None, None),
        };
        exec.append(
            "WorkflowExecutionStarted",
            json!({
                "input": params.input,
                "workflowType": params.workflow_type,
                "taskList": task_list,
                "tagList": params.tag_list,
                "childPolicy": child_policy,
                "executionStartToCloseTimeout": execution_timeout,
                "taskStartToCloseTimeout": task_timeout,
                "parentWorkflowExecution": parent_execution,
                "parentInitiatedEventId": parent_initiated,
            }),
        );

        self.executions.insert(run_id.clone(), exec);
        self.open_runs
            .insert(params.workflow_id.clone(), run_id.clone());
        self.latest_runs.insert(params.workflow_id, run_id.clone());
        self.schedule_decision(&run_id);
        Ok(run_id)
    }

    /// Close an execution and notify its parent
    fn close(&mut self, run_id: &str, status: ExecutionStatus, event_type: &str, attributes: Value) {
        let Some(exec) = self.executions.get_mut(run_id) else {
            return;
        };
        exec.append(event_type, attributes.clone());
        exec.status = status;
        exec.closed_at = Some(now_secs());
        exec.decision = DecisionState::Idle;
        exec.decision_pending = false;

        let workflow_id = exec.execution.workflow_id.clone();
        let child = exec.execution.clone();
        let child_type = exec.workflow_type.clone();
        let parent = exec.parent.clone();

        if self.open_runs.get(&workflow_id).map(String::as_str) == Some(run_id) {
            self.open_runs.remove(&workflow_id);
        }

        let Some((parent_execution, initiated_event_id)) = parent else {
            return;
        };
        let parent_event = match status {
            ExecutionStatus::Completed => "ChildWorkflowExecutionCompleted",
            ExecutionStatus::Failed => "ChildWorkflowExecutionFailed",
            ExecutionStatus::Canceled => "ChildWorkflowExecutionCanceled",
            ExecutionStatus::Open | ExecutionStatus::ContinuedAsNew => return,
        };
        let Some(parent) = self
            .executions
            .get_mut(&parent_execution.run_id)
            .filter(|p| p.is_open())
        else {
            return;
        };

        let mut payload = attributes.as_object().cloned().unwrap_or_default();
        payload.remove("decisionTaskCompletedEventId");
        payload.insert("workflowExecution".into(), json!(child));
        payload.insert("workflowType".into(), json!(child_type));
        payload.insert("initiatedEventId".into(), json!(initiated_event_id));
        parent.append(parent_event, Value::Object(payload));
        self.schedule_decision(&parent_execution.run_id);
    }

    /// Apply a decision batch. With `unhandled` set, events arrived while the
    /// decider was working and close decisions are rejected.
    fn apply_decisions(
        &mut self,
        run_id: &str,
        completed_event_id: i64,
        decisions: Vec<WireDecision>,
        unhandled: bool,
        effects: &mut Vec<Effect>,
    ) {
        for decision in decisions {
            let open = self
                .executions
                .get(run_id)
                .map(Execution::is_open)
                .unwrap_or(false);
            if !open {
                trace!(decision_type = %decision.decision_type, "Ignoring decision for closed execution");
                continue;
            }
            if unhandled {
                if let Some(failed) = close_failure_event(&decision.decision_type) {
                    debug!(decision_type = %decision.decision_type, "Rejecting close decision with unhandled events");
                    if let Some(exec) = self.executions.get_mut(run_id) {
                        exec.append(
                            failed,
                            json!({
                                "cause": "UNHANDLED_DECISION",
                                "decisionTaskCompletedEventId": completed_event_id,
                            }),
                        );
                    }
                    continue;
                }
            }
            self.apply_decision(run_id, completed_event_id, decision, effects);
        }
    }

    fn apply_decision(
        &mut self,
        run_id: &str,
        completed: i64,
        decision: WireDecision,
        effects: &mut Vec<Effect>,
    ) {
        match decision.decision_type.as_str() {
            "ScheduleActivityTask" => {
                let attrs = decision
                    .schedule_activity_task_decision_attributes
                    .unwrap_or_default();
                self.schedule_activity(run_id, completed, attrs);
            }
            "RequestCancelActivityTask" => {
                let attrs = decision
                    .request_cancel_activity_task_decision_attributes
                    .unwrap_or_default();
                self.cancel_activity(run_id, &attrs.activity_id, Some(completed));
            }
            "CompleteWorkflowExecution" => {
                let attrs = decision
                    .complete_workflow_execution_decision_attributes
                    .unwrap_or_default();
                self.close(
                    run_id,
                    ExecutionStatus::Completed,
                    "WorkflowExecutionCompleted",
                    json!({"result": attrs.result, "decisionTaskCompletedEventId": completed}),
                );
            }
            "FailWorkflowExecution" => {
                let attrs = decision
                    .fail_workflow_execution_decision_attributes
                    .unwrap_or_default();
                self.close(
                    run_id,
                    ExecutionStatus::Failed,
                    "WorkflowExecutionFailed",
                    json!({
                        "reason": attrs.reason,
                        "details": attrs.details,
                        "decisionTaskCompletedEventId": completed,
                    }),
                );
            }
            "CancelWorkflowExecution" => {
                let attrs = decision
                    .cancel_workflow_execution_decision_attributes
                    .unwrap_or_default();
                self.close(
                    run_id,
                    ExecutionStatus::Canceled,
                    "WorkflowExecutionCanceled",
                    json!({"details": attrs.details, "decisionTaskCompletedEventId": completed}),
                );
            }
            "StartTimer" => {
                let attrs = decision.start_timer_decision_attributes.unwrap_or_default();
                let Some(exec) = self.executions.get_mut(run_id) else {
                    return;
                };
                if exec.timers.contains_key(&attrs.timer_id) {
                    exec.append(
                        "StartTimerFailed",
                        json!({
                            "timerId": attrs.timer_id,
                            "cause": "TIMER_ID_ALREADY_IN_USE",
                            "decisionTaskCompletedEventId": completed,
                        }),
                    );
                    self.schedule_decision(run_id);
                    return;
                }
                let after = attrs
                    .start_to_fire_timeout
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .unwrap_or_default();
                let started_event_id = exec.append(
                    "TimerStarted",
                    json!({
                        "timerId": attrs.timer_id,
                        "startToFireTimeout": attrs.start_to_fire_timeout,
                        "control": attrs.control,
                        "decisionTaskCompletedEventId": completed,
                    }),
                );
                exec.timers.insert(attrs.timer_id.clone(), started_event_id);
                effects.push(Effect::Timer {
                    run_id: run_id.to_string(),
                    timer_id: attrs.timer_id,
                    started_event_id,
                    after,
                });
            }
            "CancelTimer" => {
                let attrs = decision.cancel_timer_decision_attributes.unwrap_or_default();
                let Some(exec) = self.executions.get_mut(run_id) else {
                    return;
                };
                match exec.timers.remove(&attrs.timer_id) {
                    Some(started_event_id) => {
                        exec.append(
                            "TimerCanceled",
                            json!({
                                "timerId": attrs.timer_id,
                                "startedEventId": started_event_id,
                                "decisionTaskCompletedEventId": completed,
                            }),
                        );
                    }
                    None => {
                        exec.append(
                            "CancelTimerFailed",
                            json!({
                                "timerId": attrs.timer_id,
                                "cause": "TIMER_ID_UNKNOWN",
                                "decisionTaskCompletedEventId": completed,
                            }),
                        );
                        self.schedule_decision(run_id);
                    }
                }
            }
            "RecordMarker" => {
                let attrs = decision.record_marker_decision_attributes.unwrap_or_default();
                if let Some(exec) = self.executions.get_mut(run_id) {
                    exec.append(
                        "MarkerRecorded",
                        json!({
                            "markerName": attrs.marker_name,
                            "details": attrs.details,
                            "decisionTaskCompletedEventId": completed,
                        }),
                    );
                }
            }
            "SignalExternalWorkflowExecution" => {
                let attrs = decision
                    .signal_external_workflow_execution_decision_attributes
                    .unwrap_or_default();
                self.signal_external(run_id, completed, attrs);
            }
            "RequestCancelExternalWorkflowExecution" => {
                let attrs = decision
                    .request_cancel_external_workflow_execution_decision_attributes
                    .unwrap_or_default();
                self.cancel_external(run_id, completed, &attrs.workflow_id, attrs.run_id.as_deref());
            }
            "StartChildWorkflowExecution" => {
                let attrs = decision
                    .start_child_workflow_execution_decision_attributes
                    .unwrap_or_default();
                self.start_child(run_id, completed, attrs);
            }
            "ContinueAsNewWorkflowExecution" => {
                let attrs = decision
                    .continue_as_new_workflow_execution_decision_attributes
                    .unwrap_or_default();
                self.continue_as_new(run_id, completed, attrs);
            }
            other => {
                debug!(decision_type = other, "Unsupported decision type");
            }
        }
    }

    fn schedule_activity(
        &mut self,
        run_id: &str,
        completed: i64,
        attrs: ScheduleActivityTaskAttributes,
    ) {
        let registered = self.activity_types.get(&attrs.activity_type.key()).cloned();
        let Some(exec) = self.executions.get_mut(run_id) else {
            return;
        };

        let failure = match &registered {
            None => Some("ACTIVITY_TYPE_DOES_NOT_EXIST"),
            Some(_) if exec.activities.contains_key(&attrs.activity_id) => {
                Some("ACTIVITY_ID_ALREADY_IN_USE")
            }
            Some(ty) if attrs.task_list.is_none() && ty.default_task_list.is_none() => {
                Some("DEFAULT_TASK_LIST_UNDEFINED")
            }
            Some(_) => None,
        };
        let (Some(registered), None) = (registered, failure) else {
            exec.append(
                "ScheduleActivityTaskFailed",
                json!({
                    "activityId": attrs.activity_id,
                    "activityType": attrs.activity_type,
                    "cause": failure.unwrap_or("OPERATION_NOT_PERMITTED"),
                    "decisionTaskCompletedEventId": completed,
                }),
            );
            self.schedule_decision(run_id);
            return;
        };

        let task_list = attrs
            .task_list
            .clone()
            .or(registered.default_task_list)
            .unwrap_or_default();
        let scheduled_event_id = exec.append(
            "ActivityTaskScheduled",
            json!({
                "activityId": attrs.activity_id,
                "activityType": attrs.activity_type,
                "input": attrs.input,
                "control": attrs.control,
                "taskList": task_list,
                "heartbeatTimeout": attrs.heartbeat_timeout.or(registered.default_task_heartbeat_timeout),
                "scheduleToCloseTimeout": attrs.schedule_to_close_timeout.or(registered.default_task_schedule_to_close_timeout),
                "scheduleToStartTimeout": attrs.schedule_to_start_timeout.or(registered.default_task_schedule_to_start_timeout),
                "startToCloseTimeout": attrs.start_to_close_timeout.or(registered.default_task_start_to_close_timeout),
                "decisionTaskCompletedEventId": completed,
            }),
        );
        exec.activities.insert(
            attrs.activity_id.clone(),
            OpenActivity {
                scheduled_event_id,
                activity_type: attrs.activity_type,
                input: attrs.input,
                started: None,
                cancel_requested: false,
                details: None,
            },
        );
        self.activity_queues
            .entry(task_list.name)
            .or_default()
            .push_back((run_id.to_string(), attrs.activity_id));
    }

    /// Request cancellation of an activity
    ///
    /// An activity still waiting in its queue is canceled immediately; a
    /// running one learns about it on its next heartbeat.
    fn cancel_activity(&mut self, run_id: &str, activity_id: &str, completed: Option<i64>) -> bool {
        let Some(exec) = self.executions.get_mut(run_id) else {
            return false;
        };
        let Some((scheduled_event_id, running)) = exec
            .activities
            .get(activity_id)
            .map(|a| (a.scheduled_event_id, a.started.is_some()))
        else {
            if let Some(completed) = completed {
                exec.append(
                    "RequestCancelActivityTaskFailed",
                    json!({
                        "activityId": activity_id,
                        "cause": "ACTIVITY_ID_UNKNOWN",
                        "decisionTaskCompletedEventId": completed,
                    }),
                );
                self.schedule_decision(run_id);
            }
            return false;
        };

        let requested_event_id = exec.append(
            "ActivityTaskCancelRequested",
            json!({
                "activityId": activity_id,
                "decisionTaskCompletedEventId": completed,
            }),
        );

        if running {
            if let Some(activity) = exec.activities.get_mut(activity_id) {
                activity.cancel_requested = true;
            }
        } else {
            exec.activities.remove(activity_id);
            exec.append(
                "ActivityTaskCanceled",
                json!({
                    "scheduledEventId": scheduled_event_id,
                    "latestCancelRequestedEventId": requested_event_id,
                }),
            );
            self.schedule_decision(run_id);
        }
        true
    }

    fn signal_external(
        &mut self,
        run_id: &str,
        completed: i64,
        attrs: SignalExternalWorkflowExecutionAttributes,
    ) {
        let target = self.find_open_run(&attrs.workflow_id, attrs.run_id.as_deref());
        let Some(source) = self.executions.get_mut(run_id) else {
            return;
        };
        let source_execution = source.execution.clone();
        let initiated = source.append(
            "SignalExternalWorkflowExecutionInitiated",
            json!({
                "workflowId": attrs.workflow_id,
                "runId": attrs.run_id,
                "signalName": attrs.signal_name,
                "input": attrs.input,
                "control": attrs.control,
                "decisionTaskCompletedEventId": completed,
            }),
        );

        match target {
            Some(target_run) => {
                let mut target_execution = None;
                if let Some(target) = self.executions.get_mut(&target_run) {
                    target_execution = Some(target.execution.clone());
                    target.append(
                        "WorkflowExecutionSignaled",
                        json!({
                            "signalName": attrs.signal_name,
                            "input": attrs.input,
                            "externalWorkflowExecution": source_execution,
                            "externalInitiatedEventId": initiated,
                        }),
                    );
                }
                self.schedule_decision(&target_run);
                if let Some(source) = self.executions.get_mut(run_id) {
                    source.append(
                        "ExternalWorkflowExecutionSignaled",
                        json!({
                            "workflowExecution": target_execution,
                            "initiatedEventId": initiated,
                        }),
                    );
                }
            }
            None => {
                if let Some(source) = self.executions.get_mut(run_id) {
                    source.append(
                        "SignalExternalWorkflowExecutionFailed",
                        json!({
                            "workflowId": attrs.workflow_id,
                            "runId": attrs.run_id,
                            "cause": "UNKNOWN_EXTERNAL_WORKFLOW_EXECUTION",
                            "initiatedEventId": initiated,
                            "decisionTaskCompletedEventId": completed,
                        }),
                    );
                }
            }
        }
        self.schedule_decision(run_id);
    }

    fn cancel_external(&mut self, run_id: &str, completed: i64, workflow_id: &str, target_run: Option<&str>) {
        let target = self.find_open_run(workflow_id, target_run);
        let Some(source) = self.executions.get_mut(run_id) else {
            return;
        };
        let source_execution = source.execution.clone();
        let initiated = source.append(
            "RequestCancelExternalWorkflowExecutionInitiated",
            json!({
                "workflowId": workflow_id,
                "runId": target_run,
                "decisionTaskCompletedEventId": completed,
            }),
        );

        match target {
            Some(target_run) => {
                let mut target_execution = None;
                if let Some(target) = self.executions.get_mut(&target_run) {
                    target_execution = Some(target.execution.clone());
                    if !target.cancel_requested {
                        target.cancel_requested = true;
                        target.append(
                            "WorkflowExecutionCancelRequested",
                            json!({
                                "externalWorkflowExecution": source_execution,
                                "externalInitiatedEventId": initiated,
                            }),
                        );
                    }
                }
                self.schedule_decision(&target_run);
                if let Some(source) = self.executions.get_mut(run_id) {
                    source.append(
                        "ExternalWorkflowExecutionCancelRequested",
                        json!({
                            "workflowExecution": target_execution,
                            "initiatedEventId": initiated,
                        }),
                    );
                }
            }
            None => {
                if let Some(source) = self.executions.get_mut(run_id) {
                    source.append(
                        "RequestCancelExternalWorkflowExecutionFailed",
                        json!({
                            "workflowId": workflow_id,
                            "runId": target_run,
                            "cause": "UNKNOWN_EXTERNAL_WORKFLOW_EXECUTION",
                            "initiatedEventId": initiated,
                            "decisionTaskCompletedEventId": completed,
                        }),
                    );
                }
            }
        }
        self.schedule_decision(run_id);
    }

    fn start_child(
        &mut self,
        run_id: &str,
        completed: i64,
        attrs: StartChildWorkflowExecutionAttributes,
    ) {
        let Some(parent) = self.executions.get_mut(run_id) else {
            return;
        };
        let parent_execution = parent.execution.clone();
        let fallback = parent.decision_timeout;
        let initiated = parent.append(
            "StartChildWorkflowExecutionInitiated",
            json!({
                "workflowId": attrs.workflow_id,
                "workflowType": attrs.workflow_type,
                "input": attrs.input,
                "control": attrs.control,
                "taskList": attrs.task_list,
                "childPolicy": attrs.child_policy,
                "tagList": attrs.tag_list,
                "decisionTaskCompletedEventId": completed,
            }),
        );

        let started = self.start_execution(
            NewExecution {
                workflow_id: attrs.workflow_id.clone(),
                workflow_type: attrs.workflow_type.clone(),
                task_list: attrs.task_list.clone(),
                input: attrs.input.clone(),
                execution_start_to_close_timeout: attrs.execution_start_to_close_timeout.clone(),
                task_start_to_close_timeout: attrs.task_start_to_close_timeout.clone(),
                child_policy: attrs.child_policy,
                tag_list: attrs.tag_list.clone(),
                parent: Some((parent_execution, initiated)),
            },
            fallback,
        );

        let Some(parent) = self.executions.get_mut(run_id) else {
            return;
        };
        match started {
            Ok(child_run) => {
                parent.children.push(child_run.clone());
                parent.append(
                    "ChildWorkflowExecutionStarted",
                    json!({
                        "workflowExecution": WorkflowExecution::new(&attrs.workflow_id, child_run),
                        "workflowType": attrs.workflow_type,
                        "initiatedEventId": initiated,
                    }),
                );
            }
            Err(e) => {
                let cause = match e.kind {
                    ServiceErrorKind::WorkflowExecutionAlreadyStarted => {
                        "WORKFLOW_ALREADY_RUNNING"
                    }
                    ServiceErrorKind::UnknownResource => "WORKFLOW_TYPE_DOES_NOT_EXIST",
                    ServiceErrorKind::DefaultUndefined => "DEFAULT_TASK_LIST_UNDEFINED",
                    _ => "OPERATION_NOT_PERMITTED",
                };
                parent.append(
                    "StartChildWorkflowExecutionFailed",
                    json!({
                        "workflowId": attrs.workflow_id,
                        "workflowType": attrs.workflow_type,
                        "cause": cause,
                        "initiatedEventId": initiated,
                        "decisionTaskCompletedEventId": completed,
                    }),
                );
            }
        }
        self.schedule_decision(run_id);
    }

    fn continue_as_new(
        &mut self,
        run_id: &str,
        completed: i64,
        attrs: ContinueAsNewWorkflowExecutionAttributes,
    ) {
        let Some(exec) = self.executions.get(run_id) else {
            return;
        };
        let workflow_id = exec.execution.workflow_id.clone();
        let mut workflow_type = exec.workflow_type.clone();
        if let Some(version) = attrs.workflow_type_version.clone() {
            workflow_type.version = version;
        }
        let params = NewExecution {
            workflow_id: workflow_id.clone(),
            workflow_type: workflow_type.clone(),
            task_list: attrs.task_list.clone().or_else(|| Some(exec.task_list.clone())),
            input: attrs.input.clone(),
            execution_start_to_close_timeout: attrs.execution_start_to_close_timeout.clone(),
            task_start_to_close_timeout: attrs.task_start_to_close_timeout.clone(),
            child_policy: attrs.child_policy,
            tag_list: attrs.tag_list.clone(),
            parent: exec.parent.clone(),
        };
        let fallback = exec.decision_timeout;

        self.open_runs.remove(&workflow_id);
        match self.start_execution(params, fallback) {
            Ok(new_run) => {
                self.close(
                    run_id,
                    ExecutionStatus::ContinuedAsNew,
                    "WorkflowExecutionContinuedAsNew",
                    json!({
                        "input": attrs.input,
                        "newExecutionRunId": new_run,
                        "taskList": attrs.task_list,
                        "workflowType": workflow_type,
                        "decisionTaskCompletedEventId": completed,
                    }),
                );
            }
            Err(e) => {
                self.open_runs.insert(workflow_id, run_id.to_string());
                if let Some(exec) = self.executions.get_mut(run_id) {
                    exec.append(
                        "ContinueAsNewWorkflowExecutionFailed",
                        json!({
                            "cause": e.kind.as_str().to_uppercase(),
                            "decisionTaskCompletedEventId": completed,
                        }),
                    );
                }
                self.schedule_decision(run_id);
            }
        }
    }

    fn take_decision_task(
        &mut self,
        task_list: &str,
        identity: Option<&str>,
        page_size: usize,
    ) -> Option<(DecisionTaskPage, Effect)> {
        let queue = self.decision_queues.get_mut(task_list)?;
        while let Some(run_id) = queue.pop_front() {
            let Some(exec) = self.executions.get_mut(&run_id) else {
                continue;
            };
            if !exec.is_open() || exec.decision != DecisionState::Scheduled {
                continue;
            }

            let scheduled_event_id = exec.scheduled_event_id;
            let started_event_id = exec.append(
                "DecisionTaskStarted",
                json!({"scheduledEventId": scheduled_event_id, "identity": identity}),
            );
            let token = format!("dt-{}", Uuid::now_v7());
            exec.decision = DecisionState::Started {
                scheduled_event_id,
                started_event_id,
                token: token.clone(),
            };
            self.decision_leases.insert(token.clone(), run_id.clone());

            let template = DecisionTaskPage {
                task_token: Some(token.clone()),
                workflow_execution: Some(exec.execution.clone()),
                workflow_type: Some(exec.workflow_type.clone()),
                events: Vec::new(),
                next_page_token: None,
                previous_started_event_id: exec.previous_started_event_id,
                started_event_id,
            };
            let effect = Effect::DecisionTimeout {
                run_id: run_id.clone(),
                token,
                after: exec.decision_timeout,
            };
            let pending = PendingPages {
                template,
                remaining: exec.history.iter().cloned().collect(),
                page_size,
            };
            return Some((self.next_page(pending), effect));
        }
        None
    }

    /// Cut the next page, parking the rest under a fresh page token
    fn next_page(&mut self, mut pending: PendingPages) -> DecisionTaskPage {
        let count = pending.page_size.min(pending.remaining.len());
        let mut page = pending.template.clone();
        page.events = pending.remaining.drain(..count).collect();
        if !pending.remaining.is_empty() {
            let token = format!("page-{}", Uuid::now_v7());
            page.next_page_token = Some(token.clone());
            self.pages.insert(token, pending);
        }
        page
    }

    fn take_activity_task(&mut self, task_list: &str, identity: Option<&str>) -> Option<ActivityTaskResponse> {
        let queue = self.activity_queues.get_mut(task_list)?;
        while let Some((run_id, activity_id)) = queue.pop_front() {
            let Some(exec) = self.executions.get_mut(&run_id) else {
                continue;
            };
            if !exec.is_open() {
                continue;
            }
            let Some((scheduled_event_id, activity_type, input)) = exec
                .activities
                .get(&activity_id)
                .filter(|a| a.started.is_none())
                .map(|a| (a.scheduled_event_id, a.activity_type.clone(), a.input.clone()))
            else {
                continue;
            };

            let started_event_id = exec.append(
                "ActivityTaskStarted",
                json!({"scheduledEventId": scheduled_event_id, "identity": identity}),
            );
            let token = format!("at-{}", Uuid::now_v7());
            if let Some(activity) = exec.activities.get_mut(&activity_id) {
                activity.started = Some((started_event_id, token.clone()));
            }
            let execution = exec.execution.clone();
            self.activity_leases
                .insert(token.clone(), (run_id, activity_id.clone()));

            return Some(ActivityTaskResponse {
                task_token: Some(token),
                activity_id: Some(activity_id),
                activity_type: Some(activity_type),
                input,
                started_event_id,
                workflow_execution: Some(execution),
            });
        }
        None
    }

    /// Close out an activity with its outcome event
    fn finish_activity(&mut self, token: &str, event_type: &str, attributes: Value) -> Result<(), ServiceError> {
        let (run_id, activity_id) = self.activity_leases.remove(token).ok_or_else(unknown_token)?;
        let exec = self
            .executions
            .get_mut(&run_id)
            .filter(|e| e.is_open())
            .ok_or_else(unknown_token)?;
        let activity = exec.activities.remove(&activity_id).ok_or_else(unknown_token)?;

        let mut payload: Map<String, Value> = attributes.as_object().cloned().unwrap_or_default();
        payload.insert("scheduledEventId".into(), json!(activity.scheduled_event_id));
        payload.insert(
            "startedEventId".into(),
            json!(activity.started.map(|(id, _)| id).unwrap_or_default()),
        );
        exec.append(event_type, Value::Object(payload));
        self.schedule_decision(&run_id);
        Ok(())
    }
}

struct Inner {
    config: InMemoryConfig,
    state: Mutex<State>,
    decision_ready: Notify,
    activity_ready: Notify,
    decision_polls: AtomicUsize,
    activity_polls: AtomicUsize,
}

impl Inner {
    fn wake(&self) {
        self.decision_ready.notify_waiters();
        self.activity_ready.notify_waiters();
    }

    fn expire_decision(&self, run_id: &str, token: &str) {
        {
            let mut state = self.state.lock();
            let Some(exec) = state.executions.get_mut(run_id) else {
                return;
            };
            let (scheduled_event_id, started_event_id) = match &exec.decision {
                DecisionState::Started {
                    scheduled_event_id,
                    started_event_id,
                    token: current,
                } if current == token && exec.status == ExecutionStatus::Open => {
                    (*scheduled_event_id, *started_event_id)
                }
                _ => return,
            };
            exec.append(
                "DecisionTaskTimedOut",
                json!({
                    "scheduledEventId": scheduled_event_id,
                    "startedEventId": started_event_id,
                    "timeoutType": "START_TO_CLOSE",
                }),
            );
            exec.decision = DecisionState::Idle;
            exec.decision_pending = false;
            state.decision_leases.remove(token);
            state.schedule_decision(run_id);
        }
        debug!(%run_id, "Decision task timed out");
        self.wake();
    }

    fn fire_timer(&self, run_id: &str, timer_id: &str, started_event_id: i64) {
        {
            let mut state = self.state.lock();
            let Some(exec) = state.executions.get_mut(run_id).filter(|e| e.is_open()) else {
                return;
            };
            if exec.timers.get(timer_id) != Some(&started_event_id) {
                return;
            }
            exec.timers.remove(timer_id);
            exec.append(
                "TimerFired",
                json!({"timerId": timer_id, "startedEventId": started_event_id}),
            );
            state.schedule_decision(run_id);
        }
        self.wake();
    }
}

/// Workflow service kept entirely in process memory
///
/// # Example
///
/// ```ignore
/// let service = InMemoryWorkflowService::new(
///     InMemoryConfig::new().with_poll_timeout(Duration::from_millis(200)),
/// );
/// let client = WorkflowClient::new(Arc::new(service.clone()), ClientConfig::new("test"));
/// ```
#[derive(Clone)]
pub struct InMemoryWorkflowService {
    inner: Arc<Inner>,
}

impl Default for InMemoryWorkflowService {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

impl InMemoryWorkflowService {
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
                decision_ready: Notify::new(),
                activity_ready: Notify::new(),
                decision_polls: AtomicUsize::new(0),
                activity_polls: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of decision long polls received (page fetches excluded)
    pub fn decision_poll_count(&self) -> usize {
        self.inner.decision_polls.load(Ordering::SeqCst)
    }

    /// Number of activity long polls received
    pub fn activity_poll_count(&self) -> usize {
        self.inner.activity_polls.load(Ordering::SeqCst)
    }

    /// History of the latest run of a workflow, oldest first
    pub fn history(&self, workflow_id: &str) -> Vec<HistoryEvent> {
        let state = self.inner.state.lock();
        state
            .latest_runs
            .get(workflow_id)
            .and_then(|run_id| state.executions.get(run_id))
            .map(|exec| exec.history.iter().map(WireHistoryEvent::to_event).collect())
            .unwrap_or_default()
    }

    /// Status of the latest run of a workflow
    pub fn execution_status(&self, workflow_id: &str) -> Option<ExecutionStatus> {
        let state = self.inner.state.lock();
        state
            .latest_runs
            .get(workflow_id)
            .and_then(|run_id| state.executions.get(run_id))
            .map(|exec| exec.status)
    }

    /// Request cancellation of an open activity from outside its workflow
    pub fn request_activity_cancel(&self, workflow_id: &str, activity_id: &str) -> bool {
        let found = {
            let mut state = self.inner.state.lock();
            match state.open_runs.get(workflow_id).cloned() {
                Some(run_id) => state.cancel_activity(&run_id, activity_id, None),
                None => false,
            }
        };
        self.inner.wake();
        found
    }

    fn spawn_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            let inner = Arc::clone(&self.inner);
            match effect {
                Effect::DecisionTimeout {
                    run_id,
                    token,
                    after,
                } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        inner.expire_decision(&run_id, &token);
                    });
                }
                Effect::Timer {
                    run_id,
                    timer_id,
                    started_event_id,
                    after,
                } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        inner.fire_timer(&run_id, &timer_id, started_event_id);
                    });
                }
            }
        }
    }
}

#[async_trait]
impl WorkflowService for InMemoryWorkflowService {
    async fn register_workflow_type(
        &self,
        request: RegisterWorkflowTypeRequest,
    ) -> Result<(), ServiceError> {
        let key = WorkflowType::new(&request.name, &request.version).key();
        let mut state = self.inner.state.lock();
        if state.workflow_types.contains_key(&key) {
            return Err(ServiceError::new(
                ServiceErrorKind::TypeAlreadyExists,
                format!(
                    "WorkflowType=[name={}, version={}]",
                    request.name, request.version
                ),
            ));
        }
        state.workflow_types.insert(key, request);
        Ok(())
    }

    async fn register_activity_type(
        &self,
        request: RegisterActivityTypeRequest,
    ) -> Result<(), ServiceError> {
        let key = ActivityType::new(&request.name, &request.version).key();
        let mut state = self.inner.state.lock();
        if state.activity_types.contains_key(&key) {
            return Err(ServiceError::new(
                ServiceErrorKind::TypeAlreadyExists,
                format!(
                    "ActivityType=[name={}, version={}]",
                    request.name, request.version
                ),
            ));
        }
        state.activity_types.insert(key, request);
        Ok(())
    }

    async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
    ) -> Result<Run, ServiceError> {
        let run_id = self.inner.state.lock().start_execution(
            NewExecution {
                workflow_id: request.workflow_id,
                workflow_type: request.workflow_type,
                task_list: request.task_list,
                input: request.input,
                execution_start_to_close_timeout: request.execution_start_to_close_timeout,
                task_start_to_close_timeout: request.task_start_to_close_timeout,
                child_policy: request.child_policy,
                tag_list: request.tag_list,
                parent: None,
            },
            self.inner.config.decision_task_timeout,
        )?;
        self.inner.wake();
        Ok(Run { run_id })
    }

    async fn poll_for_decision_task(
        &self,
        request: PollForDecisionTaskRequest,
    ) -> Result<DecisionTaskPage, ServiceError> {
        if let Some(token) = request.next_page_token.as_deref().filter(|t| !t.is_empty()) {
            let mut state = self.inner.state.lock();
            let pending = state.pages.remove(token).ok_or_else(|| {
                ServiceError::unknown_resource("Unknown next page token")
            })?;
            return Ok(state.next_page(pending));
        }

        self.inner.decision_polls.fetch_add(1, Ordering::SeqCst);
        let page_size = request
            .maximum_page_size
            .map(|size| size.max(1) as usize)
            .unwrap_or(self.inner.config.page_size);
        let deadline = Instant::now() + self.inner.config.poll_timeout;

        loop {
            let notified = self.inner.decision_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let taken = self.inner.state.lock().take_decision_task(
                &request.task_list.name,
                request.identity.as_deref(),
                page_size,
            );
            if let Some((page, timeout)) = taken {
                self.spawn_effects(vec![timeout]);
                return Ok(page);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(DecisionTaskPage::default());
            }
        }
    }

    async fn poll_for_activity_task(
        &self,
        request: PollForActivityTaskRequest,
    ) -> Result<ActivityTaskResponse, ServiceError> {
        self.inner.activity_polls.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + self.inner.config.poll_timeout;

        loop {
            let notified = self.inner.activity_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let taken = self
                .inner
                .state
                .lock()
                .take_activity_task(&request.task_list.name, request.identity.as_deref());
            if let Some(task) = taken {
                return Ok(task);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(ActivityTaskResponse::default());
            }
        }
    }

    async fn respond_decision_task_completed(
        &self,
        request: RespondDecisionTaskCompletedRequest,
    ) -> Result<(), ServiceError> {
        let mut effects = Vec::new();
        {
            let mut state = self.inner.state.lock();
            let run_id = state
                .decision_leases
                .remove(&request.task_token)
                .ok_or_else(unknown_token)?;
            let exec = state
                .executions
                .get_mut(&run_id)
                .filter(|e| e.is_open())
                .ok_or_else(unknown_token)?;
            let (scheduled_event_id, started_event_id) = match &exec.decision {
                DecisionState::Started {
                    scheduled_event_id,
                    started_event_id,
                    token,
                } if *token == request.task_token => (*scheduled_event_id, *started_event_id),
                _ => return Err(unknown_token()),
            };

            let completed = exec.append(
                "DecisionTaskCompleted",
                json!({
                    "scheduledEventId": scheduled_event_id,
                    "startedEventId": started_event_id,
                    "executionContext": request.execution_context,
                }),
            );
            exec.previous_started_event_id = started_event_id;
            exec.decision = DecisionState::Idle;
            exec.latest_execution_context = request.execution_context.clone();
            let pending = std::mem::take(&mut exec.decision_pending);

            state.apply_decisions(&run_id, completed, request.decisions, pending, &mut effects);
            if pending {
                state.schedule_decision(&run_id);
            }
        }
        self.spawn_effects(effects);
        self.inner.wake();
        Ok(())
    }

    async fn respond_activity_task_completed(
        &self,
        request: RespondActivityTaskCompletedRequest,
    ) -> Result<(), ServiceError> {
        self.inner.state.lock().finish_activity(
            &request.task_token,
            "ActivityTaskCompleted",
            json!({"result": request.result}),
        )?;
        self.inner.wake();
        Ok(())
    }

    async fn respond_activity_task_failed(
        &self,
        request: RespondActivityTaskFailedRequest,
    ) -> Result<(), ServiceError> {
        self.inner.state.lock().finish_activity(
            &request.task_token,
            "ActivityTaskFailed",
            json!({"reason": request.reason, "details": request.details}),
        )?;
        self.inner.wake();
        Ok(())
    }

    async fn respond_activity_task_canceled(
        &self,
        request: RespondActivityTaskCanceledRequest,
    ) -> Result<(), ServiceError> {
        self.inner.state.lock().finish_activity(
            &request.task_token,
            "ActivityTaskCanceled",
            json!({"details": request.details}),
        )?;
        self.inner.wake();
        Ok(())
    }

    async fn record_activity_task_heartbeat(
        &self,
        request: RecordActivityTaskHeartbeatRequest,
    ) -> Result<ActivityTaskStatus, ServiceError> {
        let mut state = self.inner.state.lock();
        let (run_id, activity_id) = state
            .activity_leases
            .get(&request.task_token)
            .cloned()
            .ok_or_else(unknown_token)?;
        let activity = state
            .executions
            .get_mut(&run_id)
            .filter(|e| e.is_open())
            .and_then(|e| e.activities.get_mut(&activity_id))
            .ok_or_else(unknown_token)?;

        activity.details = request.details;
        Ok(ActivityTaskStatus {
            cancel_requested: activity.cancel_requested,
        })
    }

    async fn request_cancel_workflow_execution(
        &self,
        request: RequestCancelWorkflowExecutionRequest,
    ) -> Result<(), ServiceError> {
        {
            let mut state = self.inner.state.lock();
            let run_id = state
                .find_open_run(&request.workflow_id, request.run_id.as_deref())
                .ok_or_else(|| unknown_execution(&request.workflow_id))?;
            let Some(exec) = state.executions.get_mut(&run_id) else {
                return Err(unknown_execution(&request.workflow_id));
            };
            if exec.cancel_requested {
                return Ok(());
            }
            exec.cancel_requested = true;
            exec.append("WorkflowExecutionCancelRequested", json!({}));
            state.schedule_decision(&run_id);
        }
        self.inner.wake();
        Ok(())
    }

    async fn describe_workflow_execution(
        &self,
        request: DescribeWorkflowExecutionRequest,
    ) -> Result<WorkflowExecutionDetail, ServiceError> {
        let state = self.inner.state.lock();
        let exec = state
            .executions
            .get(&request.execution.run_id)
            .filter(|e| e.execution.workflow_id == request.execution.workflow_id)
            .ok_or_else(|| unknown_execution(&request.execution.workflow_id))?;

        let open_children = exec
            .children
            .iter()
            .filter(|run| state.executions.get(*run).is_some_and(Execution::is_open))
            .count();

        Ok(WorkflowExecutionDetail {
            execution_info: WorkflowExecutionInfo {
                execution: exec.execution.clone(),
                workflow_type: exec.workflow_type.clone(),
                start_timestamp: exec.started_at,
                close_timestamp: exec.closed_at,
                execution_status: (if exec.is_open() { "OPEN" } else { "CLOSED" }).to_string(),
                close_status: exec.status.close_status().map(str::to_string),
                cancel_requested: exec.cancel_requested,
                tag_list: exec.tag_list.clone(),
                parent: exec.parent.as_ref().map(|(p, _)| p.clone()),
            },
            open_counts: WorkflowExecutionOpenCounts {
                open_activity_tasks: exec.activities.len() as u32,
                open_decision_tasks: u32::from(exec.decision != DecisionState::Idle),
                open_timers: exec.timers.len() as u32,
                open_child_workflow_executions: open_children as u32,
            },
            execution_configuration: Some(json!({
                "taskList": exec.task_list,
                "taskStartToCloseTimeout": encode_duration(exec.decision_timeout),
            })),
            latest_execution_context: exec.latest_execution_context.clone(),
        })
    }
}
