//! HTTP transport tests against a mock SWF-compatible endpoint

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use migrate_workflow::client::{
    ClientConfig, ClientError, HttpWorkflowService, ServiceErrorKind, WorkflowClient,
};
use migrate_workflow::decider::{AccountMigration, DeciderRegistry};
use migrate_workflow::workflow::{ActivityDescriptor, Decision, TaskList};

const TARGET: &str = "X-Amz-Target";

async fn client_for(server: &MockServer) -> WorkflowClient {
    let service = HttpWorkflowService::new(&server.uri()).unwrap();
    WorkflowClient::new(
        Arc::new(service),
        ClientConfig::new("migrations").with_identity("test-worker"),
    )
}

fn target(verb: &str) -> String {
    format!("SimpleWorkflowService.{}", verb)
}

fn started_event(id: i64) -> Value {
    json!({
        "eventId": id,
        "eventTimestamp": 1700000000.5,
        "eventType": "WorkflowExecutionStarted",
        "workflowExecutionStartedEventAttributes": {
            "input": "{\"userId\":\"u1\"}",
            "workflowType": {"name": "accountMigration", "version": "1.0"},
            "taskList": {"name": "decisions"},
            "childPolicy": "TERMINATE"
        }
    })
}

fn decision_scheduled_event(id: i64) -> Value {
    json!({
        "eventId": id,
        "eventTimestamp": 1700000001.0,
        "eventType": "DecisionTaskScheduled",
        "decisionTaskScheduledEventAttributes": {"taskList": {"name": "decisions"}}
    })
}

fn decision_started_event(id: i64, scheduled: i64) -> Value {
    json!({
        "eventId": id,
        "eventTimestamp": 1700000002.0,
        "eventType": "DecisionTaskStarted",
        "decisionTaskStartedEventAttributes": {
            "scheduledEventId": scheduled,
            "identity": "test-worker"
        }
    })
}

#[tokio::test]
async fn test_decision_task_pages_are_joined_and_sorted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header(TARGET, target("PollForDecisionTask").as_str()))
        .and(body_partial_json(json!({"nextPageToken": "page-2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskToken": "token-1",
            "workflowExecution": {"workflowId": "m-1", "runId": "run-1"},
            "workflowType": {"name": "accountMigration", "version": "1.0"},
            "events": [decision_started_event(3, 2)],
            "previousStartedEventId": 0,
            "startedEventId": 3
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(header(TARGET, target("PollForDecisionTask").as_str()))
        .and(header("Content-Type", "application/x-amz-json-1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskToken": "token-1",
            "workflowExecution": {"workflowId": "m-1", "runId": "run-1"},
            "workflowType": {"name": "accountMigration", "version": "1.0"},
            "events": [decision_scheduled_event(2), started_event(1)],
            "nextPageToken": "page-2",
            "previousStartedEventId": 0,
            "startedEventId": 3
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let task = client
        .poll_for_decision_task(&TaskList::new("decisions"))
        .await
        .unwrap()
        .expect("a decision task");

    let ids: Vec<i64> = task.events.iter().map(|e| e.event_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(task.workflow_execution.workflow_id, "m-1");
    assert_eq!(task.started_event_id, 3);

    let mut registry = DeciderRegistry::new();
    registry.register(&AccountMigration::workflow_type("1.0"), || {
        Box::new(AccountMigration::new())
    });
    let outcome = registry.engine_for(&task).unwrap().run().unwrap();
    assert_eq!(outcome.state, "initialized");
    assert_eq!(outcome.decisions.len(), 1);
}

#[tokio::test]
async fn test_empty_long_poll_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header(TARGET, target("PollForActivityTask").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"startedEventId": 0})))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let task = client
        .poll_for_activity_task(&TaskList::new("activities"))
        .await
        .unwrap();
    assert!(task.is_none());
}

#[tokio::test]
async fn test_activity_task_payload_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header(TARGET, target("PollForActivityTask").as_str()))
        .and(body_partial_json(json!({
            "domain": "migrations",
            "taskList": {"name": "activities"},
            "identity": "test-worker"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskToken": "act-1",
            "activityId": "loadCustomer-3",
            "activityType": {"name": "loadCustomer", "version": "0.1.0"},
            "input": "{\"userId\":\"u1\"}",
            "startedEventId": 6,
            "workflowExecution": {"workflowId": "m-1", "runId": "run-1"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let task = client
        .poll_for_activity_task(&TaskList::new("activities"))
        .await
        .unwrap()
        .expect("an activity task");
    assert_eq!(task.activity_id, "loadCustomer-3");
    assert_eq!(task.input, Some(json!({"userId": "u1"})));
}

#[tokio::test]
async fn test_decisions_are_sent_with_execution_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header(TARGET, target("RespondDecisionTaskCompleted").as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client
        .respond_decision_task_completed(
            "token-1",
            &[Decision::complete(Some(json!({"successful": true})))],
            Some("closed".to_string()),
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["taskToken"], "token-1");
    assert_eq!(body["executionContext"], "closed");
    assert_eq!(body["decisions"][0]["decisionType"], "CompleteWorkflowExecution");
    assert_eq!(
        body["decisions"][0]["completeWorkflowExecutionDecisionAttributes"]["result"],
        "{\"successful\":true}"
    );
}

#[tokio::test]
async fn test_existing_type_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header(TARGET, target("RegisterActivityType").as_str()))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "__type": "com.amazonaws.swf.base.model#TypeAlreadyExistsFault",
            "message": "loadCustomer/0.1.0"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let descriptor = ActivityDescriptor::new("loadCustomer", "0.1.0", "activities");
    client.register_activity_type(&descriptor).await.unwrap();
    client.register_activity_type(&descriptor).await.unwrap();
}

#[tokio::test]
async fn test_faults_map_to_service_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header(TARGET, target("RequestCancelWorkflowExecution").as_str()))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "__type": "com.amazonaws.swf.base.model#UnknownResourceFault",
            "message": "Unknown execution: m-404"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .request_cancel_workflow_execution("m-404", None)
        .await
        .unwrap_err();
    match err {
        ClientError::Service(e) => {
            assert_eq!(e.kind, ServiceErrorKind::UnknownResource);
            assert!(e.message.contains("m-404"));
        }
        other => panic!("expected service error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_heartbeat_reports_cancel_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header(TARGET, target("RecordActivityTaskHeartbeat").as_str()))
        .and(body_partial_json(json!({"taskToken": "act-1", "details": "50%"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cancelRequested": true})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header(TARGET, target("RecordActivityTaskHeartbeat").as_str()))
        .and(body_partial_json(json!({"taskToken": "gone"})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "__type": "UnknownResourceFault",
            "message": "task closed"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert!(client
        .record_activity_task_heartbeat("act-1", Some("50%"))
        .await
        .unwrap());
    assert!(!client
        .record_activity_task_heartbeat("gone", None)
        .await
        .unwrap());
}
