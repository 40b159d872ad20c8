//! Replay properties of the decision engine over account-migration histories

use serde_json::{json, Value};

use migrate_workflow::decider::{AccountMigration, DeciderError, DecisionEngine, Step};
use migrate_workflow::workflow::{
    ActivityType, Decision, EventAttributes, HistoryEvent, TaskList,
};

/// Builds a history the way the service appends it
#[derive(Default)]
struct HistoryBuilder {
    events: Vec<HistoryEvent>,
}

impl HistoryBuilder {
    fn started(input: Value) -> Self {
        let mut builder = Self::default();
        builder.push(EventAttributes::WorkflowExecutionStarted {
            input: Some(input),
            workflow_type: AccountMigration::workflow_type("1.0"),
            task_list: TaskList::new("decisions"),
            tag_list: Vec::new(),
            parent_workflow_execution: None,
        });
        builder
    }

    fn push(&mut self, attributes: EventAttributes) -> i64 {
        let id = self.events.len() as i64 + 1;
        self.events.push(HistoryEvent::new(id, attributes));
        id
    }

    fn decision_task(&mut self) -> i64 {
        let scheduled = self.push(EventAttributes::DecisionTaskScheduled {
            task_list: TaskList::new("decisions"),
        });
        self.push(EventAttributes::DecisionTaskStarted {
            scheduled_event_id: scheduled,
            identity: None,
        })
    }

    fn complete_decision(&mut self, started: i64) -> i64 {
        self.push(EventAttributes::DecisionTaskCompleted {
            scheduled_event_id: started - 1,
            started_event_id: started,
            execution_context: None,
        })
    }

    fn step(&mut self, step: Step, result: Value) {
        let started = self.decision_task();
        let completed = self.complete_decision(started);
        let scheduled = self.push(EventAttributes::ActivityTaskScheduled {
            activity_id: format!("{}-{}", step.name(), started),
            activity_type: ActivityType::new(step.name(), "0.1.0"),
            input: None,
            control: None,
            task_list: TaskList::new("activities"),
            decision_task_completed_event_id: completed,
        });
        let activity_started = self.push(EventAttributes::ActivityTaskStarted {
            scheduled_event_id: scheduled,
            identity: None,
        });
        self.push(EventAttributes::ActivityTaskCompleted {
            scheduled_event_id: scheduled,
            started_event_id: activity_started,
            result: Some(result),
        });
    }

    fn unknown(&mut self, event_type: &str) -> i64 {
        self.push(EventAttributes::Other {
            event_type: event_type.to_string(),
            attributes: json!({"note": "ignored"}),
        })
    }

    fn build(&self) -> Vec<HistoryEvent> {
        self.events.clone()
    }
}

fn run(events: Vec<HistoryEvent>) -> Result<migrate_workflow::decider::DecisionOutcome, DeciderError> {
    DecisionEngine::new(Box::new(AccountMigration::new()), events).run()
}

fn scheduled_name(decision: &Decision) -> Option<&str> {
    match decision {
        Decision::ScheduleActivityTask { activity_type, .. } => Some(&activity_type.name),
        _ => None,
    }
}

#[test]
fn test_same_history_same_decisions() {
    let mut history = HistoryBuilder::started(json!({"userId": "u1", "jobId": "j9"}));
    history.step(Step::LoadCustomer, json!({"status": 200}));
    history.step(Step::AuthorizePayment, json!({"status": 200}));
    history.decision_task();
    let events = history.build();

    let first = run(events.clone()).unwrap();
    let second = run(events).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.state, "migrating");
    assert_eq!(scheduled_name(&first.decisions[0]), Some("migrate"));
}

#[test]
fn test_only_the_last_event_decides() {
    let mut history = HistoryBuilder::started(json!({"userId": "u1"}));
    // replaying this DecisionTaskStarted alone would schedule loadCustomer
    history.decision_task();
    history.unknown("WorkflowExecutionSignaled");
    let events = history.build();

    let outcome = run(events.clone()).unwrap();
    assert!(outcome.decisions.is_empty());
    assert_eq!(outcome.replayed, events.len() - 1);

    let decided = run(events[..3].to_vec()).unwrap();
    assert_eq!(decided.decisions.len(), 1);
    assert_eq!(scheduled_name(&decided.decisions[0]), Some("loadCustomer"));
}

#[test]
fn test_unknown_events_do_not_change_state() {
    let mut plain = HistoryBuilder::started(json!({"userId": "u1"}));
    plain.step(Step::LoadCustomer, json!({"status": 200}));
    plain.decision_task();

    let mut noisy = HistoryBuilder::started(json!({"userId": "u1"}));
    noisy.unknown("MarkerRecordedSomewhereElse");
    noisy.step(Step::LoadCustomer, json!({"status": 200}));
    noisy.unknown("LambdaFunctionScheduled");
    noisy.decision_task();

    let plain = run(plain.build()).unwrap();
    let noisy = run(noisy.build()).unwrap();
    assert_eq!(plain.state, noisy.state);
    assert_eq!(
        plain.decisions.iter().map(scheduled_name).collect::<Vec<_>>(),
        noisy.decisions.iter().map(scheduled_name).collect::<Vec<_>>()
    );
}

#[test]
fn test_activity_ids_follow_decision_event() {
    let mut history = HistoryBuilder::started(json!({"userId": "u1"}));
    let started = history.decision_task();

    let outcome = run(history.build()).unwrap();
    match &outcome.decisions[..] {
        [Decision::ScheduleActivityTask { activity_id, .. }] => {
            assert_eq!(activity_id, &format!("loadCustomer-{}", started));
        }
        other => panic!("unexpected decisions {:?}", other),
    }
}

#[test]
fn test_empty_history_decides_nothing() {
    let outcome = run(Vec::new()).unwrap();
    assert!(outcome.decisions.is_empty());
    assert_eq!(outcome.state, "uninitialized");
    assert_eq!(outcome.replayed, 0);
}

#[test]
fn test_out_of_order_history_rejected() {
    let mut history = HistoryBuilder::started(json!({"userId": "u1"}));
    history.decision_task();
    let mut events = history.build();
    events.swap(1, 2);

    let err = run(events).unwrap_err();
    assert!(matches!(
        err,
        DeciderError::OutOfOrder {
            previous: 3,
            event_id: 2
        }
    ));
}

#[test]
fn test_cancel_request_cancels_outstanding_activity() {
    let mut history = HistoryBuilder::started(json!({"userId": "u1"}));
    let started = history.decision_task();
    let completed = history.complete_decision(started);
    history.push(EventAttributes::ActivityTaskScheduled {
        activity_id: format!("loadCustomer-{}", started),
        activity_type: ActivityType::new("loadCustomer", "0.1.0"),
        input: None,
        control: None,
        task_list: TaskList::new("activities"),
        decision_task_completed_event_id: completed,
    });
    history.push(EventAttributes::WorkflowExecutionCancelRequested { cause: None });
    history.decision_task();

    let outcome = run(history.build()).unwrap();
    assert_eq!(outcome.state, "closed");
    assert_eq!(
        outcome.decisions[0],
        Decision::request_cancel_activity(format!("loadCustomer-{}", started))
    );
    assert!(matches!(
        outcome.decisions[1],
        Decision::CancelWorkflowExecution { .. }
    ));
}
