//! Workflow service RPC surface
//!
//! One method per service verb, over the wire shapes in [`super::wire`].
//! Implementations: [`super::HttpWorkflowService`] for a real endpoint and
//! [`super::InMemoryWorkflowService`] for tests and local runs.

use std::fmt;

use async_trait::async_trait;

use super::wire::{
    ActivityTaskResponse, ActivityTaskStatus, DecisionTaskPage, DescribeWorkflowExecutionRequest,
    PollForActivityTaskRequest, PollForDecisionTaskRequest, RecordActivityTaskHeartbeatRequest,
    RegisterActivityTypeRequest, RegisterWorkflowTypeRequest, RequestCancelWorkflowExecutionRequest,
    RespondActivityTaskCanceledRequest, RespondActivityTaskCompletedRequest,
    RespondActivityTaskFailedRequest, RespondDecisionTaskCompletedRequest, Run,
    StartWorkflowExecutionRequest, WorkflowExecutionDetail,
};

/// Category of a service fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceErrorKind {
    TypeAlreadyExists,
    UnknownResource,
    WorkflowExecutionAlreadyStarted,
    TypeDeprecated,
    DomainDeprecated,
    OperationNotPermitted,
    LimitExceeded,
    DefaultUndefined,
    /// The request never produced a service response
    Transport,
    Unexpected,
}

impl ServiceErrorKind {
    /// Map a fault name such as `com.amazonaws.swf.base.model#UnknownResourceFault`
    pub fn from_fault(fault: &str) -> Self {
        let name = fault.rsplit('#').next().unwrap_or(fault);
        let name = name
            .strip_suffix("Fault")
            .or_else(|| name.strip_suffix("Exception"))
            .unwrap_or(name);

        match name {
            "TypeAlreadyExists" => ServiceErrorKind::TypeAlreadyExists,
            "UnknownResource" => ServiceErrorKind::UnknownResource,
            "WorkflowExecutionAlreadyStarted" => {
                ServiceErrorKind::WorkflowExecutionAlreadyStarted
            }
            "TypeDeprecated" => ServiceErrorKind::TypeDeprecated,
            "DomainDeprecated" => ServiceErrorKind::DomainDeprecated,
            "OperationNotPermitted" => ServiceErrorKind::OperationNotPermitted,
            "LimitExceeded" => ServiceErrorKind::LimitExceeded,
            "DefaultUndefined" => ServiceErrorKind::DefaultUndefined,
            _ => ServiceErrorKind::Unexpected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceErrorKind::TypeAlreadyExists => "type_already_exists",
            ServiceErrorKind::UnknownResource => "unknown_resource",
            ServiceErrorKind::WorkflowExecutionAlreadyStarted => {
                "workflow_execution_already_started"
            }
            ServiceErrorKind::TypeDeprecated => "type_deprecated",
            ServiceErrorKind::DomainDeprecated => "domain_deprecated",
            ServiceErrorKind::OperationNotPermitted => "operation_not_permitted",
            ServiceErrorKind::LimitExceeded => "limit_exceeded",
            ServiceErrorKind::DefaultUndefined => "default_undefined",
            ServiceErrorKind::Transport => "transport",
            ServiceErrorKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a workflow service call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_resource(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::UnknownResource, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Transport, message)
    }

    pub fn is(&self, kind: ServiceErrorKind) -> bool {
        self.kind == kind
    }
}

/// The workflow service's RPC surface
#[async_trait]
pub trait WorkflowService: Send + Sync {
    async fn register_workflow_type(
        &self,
        request: RegisterWorkflowTypeRequest,
    ) -> Result<(), ServiceError>;

    async fn register_activity_type(
        &self,
        request: RegisterActivityTypeRequest,
    ) -> Result<(), ServiceError>;

    async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
    ) -> Result<Run, ServiceError>;

    /// Long poll; returns a page without a task token when the poll times out
    async fn poll_for_decision_task(
        &self,
        request: PollForDecisionTaskRequest,
    ) -> Result<DecisionTaskPage, ServiceError>;

    /// Long poll; returns a response without a task token when the poll times out
    async fn poll_for_activity_task(
        &self,
        request: PollForActivityTaskRequest,
    ) -> Result<ActivityTaskResponse, ServiceError>;

    async fn respond_decision_task_completed(
        &self,
        request: RespondDecisionTaskCompletedRequest,
    ) -> Result<(), ServiceError>;

    async fn respond_activity_task_completed(
        &self,
        request: RespondActivityTaskCompletedRequest,
    ) -> Result<(), ServiceError>;

    async fn respond_activity_task_failed(
        &self,
        request: RespondActivityTaskFailedRequest,
    ) -> Result<(), ServiceError>;

    async fn respond_activity_task_canceled(
        &self,
        request: RespondActivityTaskCanceledRequest,
    ) -> Result<(), ServiceError>;

    async fn record_activity_task_heartbeat(
        &self,
        request: RecordActivityTaskHeartbeatRequest,
    ) -> Result<ActivityTaskStatus, ServiceError>;

    async fn request_cancel_workflow_execution(
        &self,
        request: RequestCancelWorkflowExecutionRequest,
    ) -> Result<(), ServiceError>;

    async fn describe_workflow_execution(
        &self,
        request: DescribeWorkflowExecutionRequest,
    ) -> Result<WorkflowExecutionDetail, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_fault_name() {
        assert_eq!(
            ServiceErrorKind::from_fault("com.amazonaws.swf.base.model#TypeAlreadyExistsFault"),
            ServiceErrorKind::TypeAlreadyExists
        );
        assert_eq!(
            ServiceErrorKind::from_fault("UnknownResourceFault"),
            ServiceErrorKind::UnknownResource
        );
        assert_eq!(
            ServiceErrorKind::from_fault("com.amazon.coral.availability#ThrottlingException"),
            ServiceErrorKind::Unexpected
        );
    }

    #[test]
    fn test_error_display() {
        let err = ServiceError::unknown_resource("task token expired");
        assert_eq!(err.to_string(), "unknown_resource: task token expired");
        assert!(err.is(ServiceErrorKind::UnknownResource));
    }
}
