//! HTTP transport for the workflow service (SWF JSON 1.0 protocol)
//!
//! Requests are not signed. Point the endpoint at a signing proxy or attach
//! pre-computed headers with [`HttpWorkflowService::with_header`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};

use super::service::{ServiceError, ServiceErrorKind, WorkflowService};
use super::wire::{
    ActivityTaskResponse, ActivityTaskStatus, DecisionTaskPage, DescribeWorkflowExecutionRequest,
    PollForActivityTaskRequest, PollForDecisionTaskRequest, RecordActivityTaskHeartbeatRequest,
    RegisterActivityTypeRequest, RegisterWorkflowTypeRequest, RequestCancelWorkflowExecutionRequest,
    RespondActivityTaskCanceledRequest, RespondActivityTaskCompletedRequest,
    RespondActivityTaskFailedRequest, RespondDecisionTaskCompletedRequest, Run,
    StartWorkflowExecutionRequest, WorkflowExecutionDetail,
};

const TARGET_PREFIX: &str = "SimpleWorkflowService";
const CONTENT_TYPE_JSON_1_0: &str = "application/x-amz-json-1.0";

/// Long polls are held open for up to 60s by the service
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(70);

/// Fault body returned with non-2xx responses
#[derive(Debug, Deserialize)]
struct Fault {
    #[serde(rename = "__type", default)]
    fault_type: String,
    #[serde(alias = "Message", default)]
    message: String,
}

pub struct HttpWorkflowService {
    endpoint: String,
    http: reqwest::Client,
    headers: HeaderMap,
}

impl HttpWorkflowService {
    pub fn new(endpoint: &str) -> Result<Self, ServiceError> {
        Self::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::transport(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
            headers: HeaderMap::new(),
        })
    }

    /// Attach a header sent with every request
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ServiceError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ServiceError::new(ServiceErrorKind::Unexpected, e.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ServiceError::new(ServiceErrorKind::Unexpected, e.to_string()))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(skip(self, body), fields(endpoint = %self.endpoint))]
    async fn call<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        operation: &str,
        body: &B,
    ) -> Result<T, ServiceError> {
        let response = self
            .http
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header("X-Amz-Target", format!("{}.{}", TARGET_PREFIX, operation))
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON_1_0)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::transport(e.to_string()))?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "Service returned a fault");
            return Err(parse_fault(status.as_u16(), &text));
        }

        let text = if text.trim().is_empty() { "{}" } else { &text };
        serde_json::from_str(text).map_err(|e| {
            ServiceError::new(
                ServiceErrorKind::Unexpected,
                format!("Malformed {} response: {}", operation, e),
            )
        })
    }
}

fn parse_fault(status: u16, body: &str) -> ServiceError {
    match serde_json::from_str::<Fault>(body) {
        Ok(fault) if !fault.fault_type.is_empty() => ServiceError::new(
            ServiceErrorKind::from_fault(&fault.fault_type),
            fault.message,
        ),
        _ => ServiceError::new(
            ServiceErrorKind::Unexpected,
            format!("HTTP {}: {}", status, body),
        ),
    }
}

/// Empty JSON object returned by verbs without a payload
#[derive(Debug, Default, Deserialize)]
struct Empty {}

#[async_trait]
impl WorkflowService for HttpWorkflowService {
    async fn register_workflow_type(
        &self,
        request: RegisterWorkflowTypeRequest,
    ) -> Result<(), ServiceError> {
        self.call::<_, Empty>("RegisterWorkflowType", &request)
            .await
            .map(|_| ())
    }

    async fn register_activity_type(
        &self,
        request: RegisterActivityTypeRequest,
    ) -> Result<(), ServiceError> {
        self.call::<_, Empty>("RegisterActivityType", &request)
            .await
            .map(|_| ())
    }

    async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
    ) -> Result<Run, ServiceError> {
        self.call("StartWorkflowExecution", &request).await
    }

    async fn poll_for_decision_task(
        &self,
        request: PollForDecisionTaskRequest,
    ) -> Result<DecisionTaskPage, ServiceError> {
        self.call("PollForDecisionTask", &request).await
    }

    async fn poll_for_activity_task(
        &self,
        request: PollForActivityTaskRequest,
    ) -> Result<ActivityTaskResponse, ServiceError> {
        self.call("PollForActivityTask", &request).await
    }

    async fn respond_decision_task_completed(
        &self,
        request: RespondDecisionTaskCompletedRequest,
    ) -> Result<(), ServiceError> {
        self.call::<_, Empty>("RespondDecisionTaskCompleted", &request)
            .await
            .map(|_| ())
    }

    async fn respond_activity_task_completed(
        &self,
        request: RespondActivityTaskCompletedRequest,
    ) -> Result<(), ServiceError> {
        self.call::<_, Empty>("RespondActivityTaskCompleted", &request)
            .await
            .map(|_| ())
    }

    async fn respond_activity_task_failed(
        &self,
        request: RespondActivityTaskFailedRequest,
    ) -> Result<(), ServiceError> {
        self.call::<_, Empty>("RespondActivityTaskFailed", &request)
            .await
            .map(|_| ())
    }

    async fn respond_activity_task_canceled(
        &self,
        request: RespondActivityTaskCanceledRequest,
    ) -> Result<(), ServiceError> {
        self.call::<_, Empty>("RespondActivityTaskCanceled", &request)
            .await
            .map(|_| ())
    }

    async fn record_activity_task_heartbeat(
        &self,
        request: RecordActivityTaskHeartbeatRequest,
    ) -> Result<ActivityTaskStatus, ServiceError> {
        self.call("RecordActivityTaskHeartbeat", &request).await
    }

    async fn request_cancel_workflow_execution(
        &self,
        request: RequestCancelWorkflowExecutionRequest,
    ) -> Result<(), ServiceError> {
        self.call::<_, Empty>("RequestCancelWorkflowExecution", &request)
            .await
            .map(|_| ())
    }

    async fn describe_workflow_execution(
        &self,
        request: DescribeWorkflowExecutionRequest,
    ) -> Result<WorkflowExecutionDetail, ServiceError> {
        self.call("DescribeWorkflowExecution", &request).await
    }
}
