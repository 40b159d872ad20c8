//! Protocol client
//!
//! Thin translation layer between the engine's typed tasks and decisions and
//! the service's request shapes. Every operation checks its required
//! parameters before calling out. Registration treats "type already exists"
//! as success, and failure/heartbeat responses treat "unknown resource"
//! (the task already timed out) as success.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use super::service::{ServiceError, ServiceErrorKind, WorkflowService};
use super::wire::{
    encode_duration, encode_payload, parse_payload, DescribeWorkflowExecutionRequest,
    PollForActivityTaskRequest, PollForDecisionTaskRequest, RecordActivityTaskHeartbeatRequest,
    RegisterActivityTypeRequest, RegisterWorkflowTypeRequest, RequestCancelWorkflowExecutionRequest,
    RespondActivityTaskCanceledRequest, RespondActivityTaskCompletedRequest,
    RespondActivityTaskFailedRequest, RespondDecisionTaskCompletedRequest,
    StartWorkflowExecutionRequest, WireDecision, WireHistoryEvent, WorkflowExecutionDetail,
};
use crate::workflow::{
    ActivityDescriptor, ActivityTask, ChildPolicy, Decision, DecisionTask, HistoryEvent, TaskList,
    WorkflowExecution, WorkflowType, WorkflowTypeOptions,
};

/// Protocol client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Domain used for every request
    pub domain: String,

    /// Identity reported when polling (recorded in history)
    pub identity: String,

    /// Page size requested when fetching decision task history
    pub maximum_page_size: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            domain: "migrate".to_string(),
            identity: format!("migrate-{}", Uuid::now_v7()),
            maximum_page_size: None,
        }
    }
}

impl ClientConfig {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_maximum_page_size(mut self, size: u32) -> Self {
        self.maximum_page_size = Some(size.max(1));
        self
    }
}

/// Options for starting a workflow execution
///
/// Anything left unset falls back to the workflow type's registered defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartWorkflowOptions {
    /// Generated when absent
    pub workflow_id: Option<String>,
    pub workflow_type: WorkflowType,
    pub task_list: Option<TaskList>,
    pub input: Option<Value>,
    pub execution_start_to_close_timeout: Option<Duration>,
    pub task_start_to_close_timeout: Option<Duration>,
    pub child_policy: Option<ChildPolicy>,
    pub tag_list: Vec<String>,
}

impl StartWorkflowOptions {
    pub fn new(workflow_type: WorkflowType) -> Self {
        Self {
            workflow_type,
            ..Default::default()
        }
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_task_list(mut self, task_list: TaskList) -> Self {
        self.task_list = Some(task_list);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag_list.push(tag.into());
        self
    }
}

/// Protocol client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A required parameter was empty; a caller bug, never retried
    #[error("{operation}: missing required parameter `{parameter}`")]
    MissingParameter {
        operation: &'static str,
        parameter: &'static str,
    },

    /// Error returned by the service
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A task response lacked a field the engine depends on
    #[error("{operation}: malformed response: {detail}")]
    MalformedResponse {
        operation: &'static str,
        detail: String,
    },
}

impl ClientError {
    /// Service fault kind, if this error came from the service
    pub fn service_kind(&self) -> Option<ServiceErrorKind> {
        match self {
            ClientError::Service(e) => Some(e.kind),
            _ => None,
        }
    }
}

fn require(
    operation: &'static str,
    parameter: &'static str,
    value: &str,
) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        return Err(ClientError::MissingParameter {
            operation,
            parameter,
        });
    }
    Ok(())
}

/// Client for the workflow service
///
/// Cheap to clone; all clones share one service handle.
#[derive(Clone)]
pub struct WorkflowClient {
    service: Arc<dyn WorkflowService>,
    config: ClientConfig,
}

impl std::fmt::Debug for WorkflowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorkflowClient {
    pub fn new(service: Arc<dyn WorkflowService>, config: ClientConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn domain(&self) -> &str {
        &self.config.domain
    }

    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    /// Register a workflow type; an existing registration is not an error
    #[instrument(skip(self, options), fields(workflow_type = %options.workflow_type))]
    pub async fn register_workflow_type(
        &self,
        options: &WorkflowTypeOptions,
    ) -> Result<(), ClientError> {
        const OP: &str = "RegisterWorkflowType";
        require(OP, "domain", &self.config.domain)?;
        require(OP, "name", &options.workflow_type.name)?;
        require(OP, "version", &options.workflow_type.version)?;

        let request = RegisterWorkflowTypeRequest {
            domain: self.config.domain.clone(),
            name: options.workflow_type.name.clone(),
            version: options.workflow_type.version.clone(),
            description: options.description.clone(),
            default_task_list: options.default_task_list.clone(),
            default_execution_start_to_close_timeout: options
                .default_execution_start_to_close_timeout
                .map(encode_duration),
            default_task_start_to_close_timeout: options
                .default_task_start_to_close_timeout
                .map(encode_duration),
            default_child_policy: options.default_child_policy,
        };

        match self.service.register_workflow_type(request).await {
            Ok(()) => {
                debug!("Registered workflow type");
                Ok(())
            }
            Err(e) if e.is(ServiceErrorKind::TypeAlreadyExists) => {
                debug!("Workflow type already registered");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Register an activity type; an existing registration is not an error
    #[instrument(skip(self, descriptor), fields(activity_type = %descriptor.key()))]
    pub async fn register_activity_type(
        &self,
        descriptor: &ActivityDescriptor,
    ) -> Result<(), ClientError> {
        const OP: &str = "RegisterActivityType";
        require(OP, "domain", &self.config.domain)?;
        require(OP, "name", &descriptor.name)?;
        require(OP, "version", &descriptor.version)?;

        let default_task_list = if descriptor.task_list_name.is_empty() {
            None
        } else {
            Some(TaskList::new(&descriptor.task_list_name))
        };

        let request = RegisterActivityTypeRequest {
            domain: self.config.domain.clone(),
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            description: descriptor.description.clone(),
            default_task_list,
            default_task_heartbeat_timeout: Some(encode_duration(
                descriptor.default_task_heartbeat_timeout,
            )),
            default_task_schedule_to_close_timeout: Some(encode_duration(
                descriptor.default_task_schedule_to_close_timeout,
            )),
            default_task_schedule_to_start_timeout: Some(encode_duration(
                descriptor.default_task_schedule_to_start_timeout,
            )),
            default_task_start_to_close_timeout: Some(encode_duration(
                descriptor.default_task_start_to_close_timeout,
            )),
        };

        match self.service.register_activity_type(request).await {
            Ok(()) => {
                debug!("Registered activity type");
                Ok(())
            }
            Err(e) if e.is(ServiceErrorKind::TypeAlreadyExists) => {
                debug!("Activity type already registered");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Start a workflow execution, generating a workflow id when none is given
    #[instrument(skip(self, options), fields(workflow_type = %options.workflow_type))]
    pub async fn start_workflow_execution(
        &self,
        options: StartWorkflowOptions,
    ) -> Result<WorkflowExecution, ClientError> {
        const OP: &str = "StartWorkflowExecution";
        require(OP, "domain", &self.config.domain)?;
        require(OP, "workflowType.name", &options.workflow_type.name)?;
        require(OP, "workflowType.version", &options.workflow_type.version)?;

        let workflow_id = options
            .workflow_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        let request = StartWorkflowExecutionRequest {
            domain: self.config.domain.clone(),
            workflow_id: workflow_id.clone(),
            workflow_type: options.workflow_type,
            task_list: options.task_list,
            input: options.input.as_ref().map(encode_payload),
            execution_start_to_close_timeout: options
                .execution_start_to_close_timeout
                .map(encode_duration),
            task_start_to_close_timeout: options.task_start_to_close_timeout.map(encode_duration),
            child_policy: options.child_policy,
            tag_list: options.tag_list,
        };

        let run = self.service.start_workflow_execution(request).await?;
        debug!(%workflow_id, run_id = %run.run_id, "Started workflow execution");
        Ok(WorkflowExecution::new(workflow_id, run.run_id))
    }

    /// Long-poll one decision task list
    ///
    /// Fetches every history page before returning, so the task always holds
    /// the complete history ordered by event id.
    #[instrument(skip(self), fields(task_list = %task_list))]
    pub async fn poll_for_decision_task(
        &self,
        task_list: &TaskList,
    ) -> Result<Option<DecisionTask>, ClientError> {
        const OP: &str = "PollForDecisionTask";
        require(OP, "domain", &self.config.domain)?;
        require(OP, "taskListName", &task_list.name)?;

        let mut request = PollForDecisionTaskRequest {
            domain: self.config.domain.clone(),
            task_list: task_list.clone(),
            identity: Some(self.config.identity.clone()),
            maximum_page_size: self.config.maximum_page_size,
            next_page_token: None,
            reverse_order: None,
        };

        let first = self.service.poll_for_decision_task(request.clone()).await?;
        let Some(task_token) = first.task_token.filter(|t| !t.is_empty()) else {
            trace!("Decision poll returned no task");
            return Ok(None);
        };

        let mut wire_events: Vec<WireHistoryEvent> = first.events;
        let mut next_page_token = first.next_page_token;
        let mut pages = 1;
        while let Some(token) = next_page_token.take().filter(|t| !t.is_empty()) {
            request.next_page_token = Some(token);
            let page = self.service.poll_for_decision_task(request.clone()).await?;
            wire_events.extend(page.events);
            next_page_token = page.next_page_token;
            pages += 1;
        }

        let workflow_execution =
            first
                .workflow_execution
                .ok_or_else(|| ClientError::MalformedResponse {
                    operation: OP,
                    detail: "missing workflowExecution".to_string(),
                })?;
        let workflow_type = first
            .workflow_type
            .ok_or_else(|| ClientError::MalformedResponse {
                operation: OP,
                detail: "missing workflowType".to_string(),
            })?;

        let mut events: Vec<HistoryEvent> =
            wire_events.iter().map(WireHistoryEvent::to_event).collect();
        events.sort_by_key(|e| e.event_id);

        debug!(
            workflow_id = %workflow_execution.workflow_id,
            events = events.len(),
            pages,
            "Received decision task"
        );

        Ok(Some(DecisionTask {
            task_token,
            workflow_execution,
            workflow_type,
            events,
            previous_started_event_id: first.previous_started_event_id,
            started_event_id: first.started_event_id,
        }))
    }

    /// Long-poll one activity task list
    #[instrument(skip(self), fields(task_list = %task_list))]
    pub async fn poll_for_activity_task(
        &self,
        task_list: &TaskList,
    ) -> Result<Option<ActivityTask>, ClientError> {
        const OP: &str = "PollForActivityTask";
        require(OP, "domain", &self.config.domain)?;
        require(OP, "taskListName", &task_list.name)?;

        let request = PollForActivityTaskRequest {
            domain: self.config.domain.clone(),
            task_list: task_list.clone(),
            identity: Some(self.config.identity.clone()),
        };

        let response = self.service.poll_for_activity_task(request).await?;
        let Some(task_token) = response.task_token.filter(|t| !t.is_empty()) else {
            trace!("Activity poll returned no task");
            return Ok(None);
        };

        let malformed = |detail: &str| ClientError::MalformedResponse {
            operation: OP,
            detail: detail.to_string(),
        };

        let task = ActivityTask {
            task_token,
            activity_id: response
                .activity_id
                .ok_or_else(|| malformed("missing activityId"))?,
            activity_type: response
                .activity_type
                .ok_or_else(|| malformed("missing activityType"))?,
            input: response.input.as_deref().map(parse_payload),
            started_event_id: response.started_event_id,
            workflow_execution: response
                .workflow_execution
                .ok_or_else(|| malformed("missing workflowExecution"))?,
        };

        debug!(
            activity_id = %task.activity_id,
            activity_type = %task.activity_type,
            "Received activity task"
        );
        Ok(Some(task))
    }

    /// Submit the decisions for one decision task
    #[instrument(skip(self, task_token, decisions), fields(decisions = decisions.len()))]
    pub async fn respond_decision_task_completed(
        &self,
        task_token: &str,
        decisions: &[Decision],
        execution_context: Option<String>,
    ) -> Result<(), ClientError> {
        require("RespondDecisionTaskCompleted", "taskToken", task_token)?;

        let request = RespondDecisionTaskCompletedRequest {
            task_token: task_token.to_string(),
            decisions: decisions.iter().map(WireDecision::from).collect(),
            execution_context,
        };
        self.service.respond_decision_task_completed(request).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn respond_activity_task_completed(
        &self,
        task_token: &str,
        result: Option<&Value>,
    ) -> Result<(), ClientError> {
        require("RespondActivityTaskCompleted", "taskToken", task_token)?;

        let request = RespondActivityTaskCompletedRequest {
            task_token: task_token.to_string(),
            result: result.map(encode_payload),
        };
        self.service.respond_activity_task_completed(request).await?;
        Ok(())
    }

    /// Report a failed activity; a task that already timed out is not an error
    #[instrument(skip(self, task_token, details))]
    pub async fn respond_activity_task_failed(
        &self,
        task_token: &str,
        reason: Option<&str>,
        details: Option<&str>,
    ) -> Result<(), ClientError> {
        require("RespondActivityTaskFailed", "taskToken", task_token)?;

        let request = RespondActivityTaskFailedRequest {
            task_token: task_token.to_string(),
            reason: reason.map(str::to_string),
            details: details.map(str::to_string),
        };
        match self.service.respond_activity_task_failed(request).await {
            Err(e) if e.is(ServiceErrorKind::UnknownResource) => {
                warn!(error = %e, "Activity task no longer known to the service");
                Ok(())
            }
            other => Ok(other?),
        }
    }

    #[instrument(skip_all)]
    pub async fn respond_activity_task_canceled(
        &self,
        task_token: &str,
        details: Option<&str>,
    ) -> Result<(), ClientError> {
        require("RespondActivityTaskCanceled", "taskToken", task_token)?;

        let request = RespondActivityTaskCanceledRequest {
            task_token: task_token.to_string(),
            details: details.map(str::to_string),
        };
        self.service.respond_activity_task_canceled(request).await?;
        Ok(())
    }

    /// Report liveness; returns whether cancellation has been requested
    ///
    /// A task the service no longer knows reports `false`.
    #[instrument(skip_all)]
    pub async fn record_activity_task_heartbeat(
        &self,
        task_token: &str,
        details: Option<&str>,
    ) -> Result<bool, ClientError> {
        require("RecordActivityTaskHeartbeat", "taskToken", task_token)?;

        let request = RecordActivityTaskHeartbeatRequest {
            task_token: task_token.to_string(),
            details: details.map(str::to_string),
        };
        match self.service.record_activity_task_heartbeat(request).await {
            Ok(status) => Ok(status.cancel_requested),
            Err(e) if e.is(ServiceErrorKind::UnknownResource) => {
                warn!(error = %e, "Heartbeat for a task no longer known to the service");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn request_cancel_workflow_execution(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
    ) -> Result<(), ClientError> {
        const OP: &str = "RequestCancelWorkflowExecution";
        require(OP, "domain", &self.config.domain)?;
        require(OP, "workflowId", workflow_id)?;

        let request = RequestCancelWorkflowExecutionRequest {
            domain: self.config.domain.clone(),
            workflow_id: workflow_id.to_string(),
            run_id: run_id.map(str::to_string),
        };
        self.service.request_cancel_workflow_execution(request).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(execution = %execution))]
    pub async fn describe_workflow_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<WorkflowExecutionDetail, ClientError> {
        const OP: &str = "DescribeWorkflowExecution";
        require(OP, "domain", &self.config.domain)?;
        require(OP, "workflowId", &execution.workflow_id)?;
        require(OP, "runId", &execution.run_id)?;

        let request = DescribeWorkflowExecutionRequest {
            domain: self.config.domain.clone(),
            execution: execution.clone(),
        };
        Ok(self.service.describe_workflow_execution(request).await?)
    }
}
