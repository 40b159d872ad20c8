//! Account migrations driven end to end through a host and the in-memory service

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use migrate_workflow::client::{
    ClientConfig, ExecutionStatus, InMemoryConfig, InMemoryWorkflowService, WorkflowClient,
};
use migrate_workflow::decider::{AccountMigration, Step, DEFAULT_ACTIVITY_VERSION};
use migrate_workflow::worker::{
    Activity, ActivityPollerConfig, AdmissionConfig, DecisionPollerConfig, PlaceholderActivity,
    ResourceProbe, ResourceSample, WorkflowHost,
};
use migrate_workflow::workflow::{
    ActivityDescriptor, EventAttributes, HistoryEvent, TaskList, WorkflowTypeOptions,
};

const DECISIONS: &str = "migration-decisions";
const ACTIVITIES: &str = "migration-activities";

/// Plenty of memory, idle CPUs
struct IdleProbe;

impl ResourceProbe for IdleProbe {
    fn sample(&self) -> ResourceSample {
        ResourceSample {
            available_memory_bytes: 64 * 1024 * 1024 * 1024,
            load_per_cpu: 0.0,
        }
    }
}

async fn host() -> (Arc<InMemoryWorkflowService>, WorkflowHost) {
    let service = Arc::new(InMemoryWorkflowService::new(
        InMemoryConfig::new().with_poll_timeout(Duration::from_millis(50)),
    ));
    let client = WorkflowClient::new(service.clone(), ClientConfig::new("migrations"));
    let options = WorkflowTypeOptions::new(AccountMigration::workflow_type("1.0"))
        .with_default_task_list(TaskList::new(DECISIONS));

    let host = WorkflowHost::new(client, options)
        .await
        .unwrap()
        .with_probe(Arc::new(IdleProbe))
        .with_decision_defaults(
            DecisionPollerConfig::new(TaskList::new(DECISIONS))
                .with_error_backoff(Duration::from_millis(20)),
        )
        .with_activity_defaults(
            ActivityPollerConfig::new(TaskList::new(ACTIVITIES)).with_admission(
                AdmissionConfig::new().with_throttle_interval(Duration::from_millis(10)),
            ),
        );

    host.register_decider(&TaskList::new(DECISIONS), || {
        Box::new(AccountMigration::new())
    });
    (service, host)
}

/// One quick placeholder per step, with `overrides` replacing some of them
fn activities(overrides: Vec<(Step, PlaceholderActivity)>) -> Vec<Arc<dyn Activity>> {
    Step::ALL
        .iter()
        .map(|step| {
            let custom = overrides
                .iter()
                .find(|(s, _)| s == step)
                .map(|(_, activity)| activity.clone());
            let activity = custom.unwrap_or_else(|| {
                let result = match step {
                    Step::AnalyzeResults => json!({"status": 200, "data": {"successRate": 1.0}}),
                    _ => json!({"status": 200}),
                };
                PlaceholderActivity::new(descriptor(*step))
                    .with_duration(Duration::from_millis(5))
                    .with_result(Some(result))
            });
            Arc::new(activity) as Arc<dyn Activity>
        })
        .collect()
}

fn descriptor(step: Step) -> ActivityDescriptor {
    ActivityDescriptor::new(step.name(), DEFAULT_ACTIVITY_VERSION, ACTIVITIES)
}

async fn wait_until<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn scheduled_steps(history: &[HistoryEvent]) -> Vec<String> {
    history
        .iter()
        .filter_map(|e| match &e.attributes {
            EventAttributes::ActivityTaskScheduled { activity_type, .. } => {
                Some(activity_type.name.clone())
            }
            _ => None,
        })
        .collect()
}

#[test_log::test(tokio::test)]
async fn test_successful_migration_completes() {
    let (service, host) = host().await;
    host.register_activities(&TaskList::new(ACTIVITIES), activities(Vec::new()))
        .await
        .unwrap();
    host.start().unwrap();

    let execution = host
        .start_execution(Some("migration-ok".into()), Some(json!({"userId": "u1"})))
        .await
        .unwrap();

    let completed = wait_until(Duration::from_secs(10), || {
        service.execution_status(&execution.workflow_id) == Some(ExecutionStatus::Completed)
    })
    .await;
    host.shutdown().await.unwrap();
    assert!(completed, "history: {:?}", service.history("migration-ok"));

    let history = service.history("migration-ok");
    assert_eq!(
        scheduled_steps(&history),
        vec![
            "loadCustomer",
            "authorizePayment",
            "migrate",
            "analyzeResults",
            "report",
            "capturePayment",
            "invoice",
        ]
    );
    match &history.last().map(|e| &e.attributes) {
        Some(EventAttributes::WorkflowExecutionCompleted { result }) => {
            assert_eq!(
                result,
                &Some(json!({"userId": "u1", "jobId": null, "successful": true}))
            );
        }
        other => panic!("unexpected last event {:?}", other),
    }

    // every decision records the machine state it ended in
    let contexts: Vec<Option<String>> = history
        .iter()
        .filter_map(|e| match &e.attributes {
            EventAttributes::DecisionTaskCompleted {
                execution_context, ..
            } => Some(execution_context.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(contexts.last(), Some(&Some("closed".to_string())));
}

#[test_log::test(tokio::test)]
async fn test_missing_customer_fails_migration() {
    let (service, host) = host().await;
    let missing = PlaceholderActivity::new(descriptor(Step::LoadCustomer))
        .with_duration(Duration::from_millis(5))
        .with_result(Some(
            json!({"status": 404, "message": "Customer u2 not found"}),
        ));
    host.register_activities(
        &TaskList::new(ACTIVITIES),
        activities(vec![(Step::LoadCustomer, missing)]),
    )
    .await
    .unwrap();
    host.start().unwrap();

    host.start_execution(Some("migration-404".into()), Some(json!({"userId": "u2"})))
        .await
        .unwrap();

    let failed = wait_until(Duration::from_secs(10), || {
        service.execution_status("migration-404") == Some(ExecutionStatus::Failed)
    })
    .await;
    host.shutdown().await.unwrap();
    assert!(failed);

    let history = service.history("migration-404");
    assert_eq!(scheduled_steps(&history), vec!["loadCustomer"]);
    match &history.last().map(|e| &e.attributes) {
        Some(EventAttributes::WorkflowExecutionFailed { reason, details }) => {
            assert_eq!(reason.as_deref(), Some("Account migration failed"));
            let errors: Vec<String> =
                serde_json::from_str(details.as_deref().unwrap_or("[]")).unwrap();
            assert_eq!(errors, vec!["Customer u2 not found".to_string()]);
        }
        other => panic!("unexpected last event {:?}", other),
    }
}

#[test_log::test(tokio::test)]
async fn test_cancel_request_cancels_migration() {
    let (service, host) = host().await;
    let slow = PlaceholderActivity::new(descriptor(Step::LoadCustomer))
        .with_duration(Duration::from_secs(1));
    host.register_activities(
        &TaskList::new(ACTIVITIES),
        activities(vec![(Step::LoadCustomer, slow)]),
    )
    .await
    .unwrap();
    host.start().unwrap();

    host.start_execution(Some("migration-cancel".into()), Some(json!({"userId": "u3"})))
        .await
        .unwrap();

    let running = wait_until(Duration::from_secs(5), || {
        service.history("migration-cancel").iter().any(|e| {
            matches!(e.attributes, EventAttributes::ActivityTaskStarted { .. })
        })
    })
    .await;
    assert!(running);

    host.cancel_execution("migration-cancel", None).await.unwrap();

    let canceled = wait_until(Duration::from_secs(5), || {
        service.execution_status("migration-cancel") == Some(ExecutionStatus::Canceled)
    })
    .await;
    host.shutdown().await.unwrap();
    assert!(canceled);

    let history = service.history("migration-cancel");
    assert!(history.iter().any(|e| matches!(
        &e.attributes,
        EventAttributes::ActivityTaskCancelRequested { activity_id } if activity_id.starts_with("loadCustomer-")
    )));
}

#[tokio::test]
async fn test_registration_is_idempotent() {
    let (service, host) = host().await;
    let list = TaskList::new(ACTIVITIES);

    host.register_activities(&list, activities(Vec::new()))
        .await
        .unwrap();
    host.register_activities(&list, activities(Vec::new()))
        .await
        .unwrap();

    let client = WorkflowClient::new(service, ClientConfig::new("migrations"));
    client
        .register_workflow_type(&WorkflowTypeOptions::new(AccountMigration::workflow_type(
            "1.0",
        )))
        .await
        .unwrap();

    assert_eq!(host.pollers().len(), 2);
}
