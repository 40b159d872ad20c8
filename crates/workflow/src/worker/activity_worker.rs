//! Executes one activity task and reports its outcome
//!
//! The worker runs the activity with a [`HeartbeatMonitor`] beside it. Every
//! exit path, panics included, tears the heartbeat down and sends exactly one
//! response for the task token.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::activity::{Activity, ActivityContext};
use super::heartbeat::HeartbeatMonitor;
use crate::client::{ClientError, WorkflowClient};
use crate::workflow::ActivityTask;

/// Response sent for an activity task
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityOutcome {
    Completed(Option<Value>),
    Failed {
        reason: String,
        details: Option<String>,
    },
    Canceled {
        details: Option<String>,
    },
}

impl ActivityOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityOutcome::Completed(_) => "completed",
            ActivityOutcome::Failed { .. } => "failed",
            ActivityOutcome::Canceled { .. } => "canceled",
        }
    }
}

/// Runs one activity task to a single response
pub struct ActivityWorker {
    client: WorkflowClient,
    activity: Arc<dyn Activity>,
    task: ActivityTask,
}

impl ActivityWorker {
    pub fn new(client: WorkflowClient, activity: Arc<dyn Activity>, task: ActivityTask) -> Self {
        Self {
            client,
            activity,
            task,
        }
    }

    /// Run on a new task
    pub fn spawn(self) -> JoinHandle<ActivityOutcome> {
        tokio::spawn(self.run())
    }

    /// Execute, tear down the heartbeat and report
    #[instrument(
        skip(self),
        fields(
            activity_id = %self.task.activity_id,
            activity_type = %self.task.activity_type,
            execution = %self.task.workflow_execution,
        )
    )]
    pub async fn run(self) -> ActivityOutcome {
        info!("Processing activity task");

        let ctx = ActivityContext::new(&self.task);
        let heartbeat_timeout = self.activity.descriptor().default_task_heartbeat_timeout;
        let mut heartbeat = HeartbeatMonitor::new(self.client.clone(), ctx.clone(), heartbeat_timeout);
        heartbeat.start();

        let result = AssertUnwindSafe(self.activity.execute(&ctx, self.task.input.clone()))
            .catch_unwind()
            .await;

        heartbeat.destroy();

        let outcome = match result {
            Ok(Ok(value)) => ActivityOutcome::Completed(value),
            Ok(Err(e)) if e.cancelled => ActivityOutcome::Canceled { details: e.details },
            Ok(Err(e)) => {
                warn!(reason = %e.reason, "Activity failed");
                ActivityOutcome::Failed {
                    reason: e.reason,
                    details: e.details,
                }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Activity panicked");
                ActivityOutcome::Failed {
                    reason: "activity panicked".to_string(),
                    details: Some(message),
                }
            }
        };

        match self.report(&outcome).await {
            Ok(()) => debug!(outcome = outcome.kind(), "Activity task reported"),
            Err(e) => error!(outcome = outcome.kind(), error = %e, "Failed to report activity task"),
        }
        outcome
    }

    async fn report(&self, outcome: &ActivityOutcome) -> Result<(), ClientError> {
        let token = &self.task.task_token;
        match outcome {
            ActivityOutcome::Completed(result) => {
                self.client
                    .respond_activity_task_completed(token, result.as_ref())
                    .await
            }
            ActivityOutcome::Failed { reason, details } => {
                self.client
                    .respond_activity_task_failed(token, Some(reason), details.as_deref())
                    .await
            }
            ActivityOutcome::Canceled { details } => {
                self.client
                    .respond_activity_task_canceled(token, details.as_deref())
                    .await
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::client::{
        ClientConfig, ExecutionStatus, InMemoryConfig, InMemoryWorkflowService,
        StartWorkflowOptions,
    };
    use crate::worker::activity::{ActivityError, PlaceholderActivity};
    use crate::workflow::{
        ActivityDescriptor, ActivityType, Decision, TaskList, WorkflowType, WorkflowTypeOptions,
    };

    struct Harness {
        service: Arc<InMemoryWorkflowService>,
        client: WorkflowClient,
    }

    fn descriptor() -> ActivityDescriptor {
        ActivityDescriptor::new("migrate", "0.1.0", "activities")
            .with_heartbeat_timeout(Duration::from_millis(40))
    }

    /// Start an execution and schedule one `migrate` activity for it
    async fn scheduled_task() -> (Harness, ActivityTask) {
        let service = Arc::new(InMemoryWorkflowService::new(
            InMemoryConfig::new().with_poll_timeout(Duration::from_millis(100)),
        ));
        let client = WorkflowClient::new(service.clone(), ClientConfig::new("test"));

        let workflow_type = WorkflowType::new("migration", "1.0");
        client
            .register_workflow_type(
                &WorkflowTypeOptions::new(workflow_type.clone())
                    .with_default_task_list(TaskList::new("decisions")),
            )
            .await
            .unwrap();
        client.register_activity_type(&descriptor()).await.unwrap();
        client
            .start_workflow_execution(
                StartWorkflowOptions::new(workflow_type).with_workflow_id("job-1"),
            )
            .await
            .unwrap();

        let decision_task = client
            .poll_for_decision_task(&TaskList::new("decisions"))
            .await
            .unwrap()
            .unwrap();
        client
            .respond_decision_task_completed(
                &decision_task.task_token,
                &[Decision::schedule_activity(
                    "migrate-3",
                    ActivityType::new("migrate", "0.1.0"),
                    Some(json!({"userId": "u1"})),
                )],
                None,
            )
            .await
            .unwrap();

        let task = client
            .poll_for_activity_task(&TaskList::new("activities"))
            .await
            .unwrap()
            .unwrap();
        (Harness { service, client }, task)
    }

    fn last_event_type(service: &InMemoryWorkflowService) -> String {
        service
            .history("job-1")
            .iter()
            .rev()
            .find(|e| e.event_type().starts_with("ActivityTask"))
            .map(|e| e.event_type().to_string())
            .unwrap_or_default()
    }

    struct Panicking;

    #[async_trait]
    impl Activity for Panicking {
        fn descriptor(&self) -> ActivityDescriptor {
            descriptor()
        }

        async fn execute(
            &self,
            _ctx: &ActivityContext,
            _input: Option<Value>,
        ) -> Result<Option<Value>, ActivityError> {
            panic!("disk on fire");
        }
    }

    struct Failing;

    #[async_trait]
    impl Activity for Failing {
        fn descriptor(&self) -> ActivityDescriptor {
            descriptor()
        }

        async fn execute(
            &self,
            _ctx: &ActivityContext,
            input: Option<Value>,
        ) -> Result<Option<Value>, ActivityError> {
            Err(ActivityError::failed("mailbox unavailable")
                .with_details(input.map(|v| v.to_string()).unwrap_or_default()))
        }
    }

    #[tokio::test]
    async fn test_completed_activity_reports_result() {
        let (harness, task) = scheduled_task().await;
        let activity = PlaceholderActivity::new(descriptor())
            .with_duration(Duration::from_millis(5))
            .with_result(Some(json!({"status": 200})));

        let outcome = ActivityWorker::new(harness.client.clone(), Arc::new(activity), task)
            .spawn()
            .await
            .unwrap();

        assert_eq!(outcome, ActivityOutcome::Completed(Some(json!({"status": 200}))));
        assert_eq!(last_event_type(&harness.service), "ActivityTaskCompleted");
    }

    #[tokio::test]
    async fn test_failed_activity_reports_reason() {
        let (harness, task) = scheduled_task().await;

        let outcome = ActivityWorker::new(harness.client.clone(), Arc::new(Failing), task)
            .run()
            .await;

        assert_eq!(
            outcome,
            ActivityOutcome::Failed {
                reason: "mailbox unavailable".into(),
                details: Some("{\"userId\":\"u1\"}".into()),
            }
        );
        assert_eq!(last_event_type(&harness.service), "ActivityTaskFailed");
    }

    #[tokio::test]
    async fn test_panic_is_reported_as_failure() {
        let (harness, task) = scheduled_task().await;

        let outcome = ActivityWorker::new(harness.client.clone(), Arc::new(Panicking), task)
            .run()
            .await;

        assert_eq!(
            outcome,
            ActivityOutcome::Failed {
                reason: "activity panicked".into(),
                details: Some("disk on fire".into()),
            }
        );
        assert_eq!(last_event_type(&harness.service), "ActivityTaskFailed");
        assert_eq!(
            harness.service.execution_status("job-1"),
            Some(ExecutionStatus::Open)
        );
    }

    #[tokio::test]
    async fn test_cancel_request_reaches_activity_through_heartbeat() {
        let (harness, task) = scheduled_task().await;
        let activity = PlaceholderActivity::new(descriptor()).with_duration(Duration::from_secs(30));

        let running = ActivityWorker::new(harness.client.clone(), Arc::new(activity), task).spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(harness.service.request_activity_cancel("job-1", "migrate-3"));

        let outcome = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(outcome, ActivityOutcome::Canceled { .. }));
        assert_eq!(last_event_type(&harness.service), "ActivityTaskCanceled");
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
