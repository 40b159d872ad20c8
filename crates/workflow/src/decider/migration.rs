//! Account migration decider
//!
//! Walks a migration job through its steps, one activity at a time:
//!
//! ```text
//! uninitialized -> initialized (loadCustomer)
//!               -> authorizing-payment (authorizePayment)
//!               -> migrating (migrate)
//!               -> analyzing-results (analyzeResults)
//!               -> reporting (report)
//!               -> capturing-payment (capturePayment, only when the migration succeeded)
//!               -> invoicing (invoice)
//!               -> finalizing -> closed
//! ```
//!
//! Any state can move to `canceling` when cancellation of the execution is
//! requested. Results and failures move the machine between states; the
//! scheduling decision for the current step is made on `DecisionTaskStarted`
//! while no activity is outstanding. A close that times out or is refused by
//! the service returns the machine to the state it closed from, so the next
//! decision task issues it again.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::machine::{DeciderError, StateMachine};
use crate::workflow::{ActivityType, Decision, EventAttributes, HistoryEvent, WorkflowType};

/// Workflow type name registered for migration jobs
pub const WORKFLOW_NAME: &str = "accountMigration";

/// Version used for every step's activity type unless overridden
pub const DEFAULT_ACTIVITY_VERSION: &str = "0.1.0";

/// Success rate above which the payment is captured
const CAPTURE_THRESHOLD: f64 = 0.95;

const STATUS_OK: u16 = 200;
const STATUS_NOT_FOUND: u16 = 404;

/// One activity in the migration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    LoadCustomer,
    AuthorizePayment,
    Migrate,
    AnalyzeResults,
    Report,
    CapturePayment,
    Invoice,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::LoadCustomer,
        Step::AuthorizePayment,
        Step::Migrate,
        Step::AnalyzeResults,
        Step::Report,
        Step::CapturePayment,
        Step::Invoice,
    ];

    /// Activity type name
    pub fn name(&self) -> &'static str {
        match self {
            Step::LoadCustomer => "loadCustomer",
            Step::AuthorizePayment => "authorizePayment",
            Step::Migrate => "migrate",
            Step::AnalyzeResults => "analyzeResults",
            Step::Report => "report",
            Step::CapturePayment => "capturePayment",
            Step::Invoice => "invoice",
        }
    }

    fn from_activity_name(name: &str) -> Option<Step> {
        Step::ALL.into_iter().find(|s| s.name() == name)
    }

    fn state(&self) -> MigrationState {
        match self {
            Step::LoadCustomer => MigrationState::Initialized,
            Step::AuthorizePayment => MigrationState::AuthorizingPayment,
            Step::Migrate => MigrationState::Migrating,
            Step::AnalyzeResults => MigrationState::AnalyzingResults,
            Step::Report => MigrationState::Reporting,
            Step::CapturePayment => MigrationState::CapturingPayment,
            Step::Invoice => MigrationState::Invoicing,
        }
    }
}

/// Named states of the migration machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Uninitialized,
    Initialized,
    AuthorizingPayment,
    Migrating,
    AnalyzingResults,
    Reporting,
    CapturingPayment,
    Invoicing,
    Finalizing,
    Canceling,
    Closed,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::Uninitialized => "uninitialized",
            MigrationState::Initialized => "initialized",
            MigrationState::AuthorizingPayment => "authorizing-payment",
            MigrationState::Migrating => "migrating",
            MigrationState::AnalyzingResults => "analyzing-results",
            MigrationState::Reporting => "reporting",
            MigrationState::CapturingPayment => "capturing-payment",
            MigrationState::Invoicing => "invoicing",
            MigrationState::Finalizing => "finalizing",
            MigrationState::Canceling => "canceling",
            MigrationState::Closed => "closed",
        }
    }

    /// The step whose activity runs in this state
    fn step(&self) -> Option<Step> {
        match self {
            MigrationState::Initialized => Some(Step::LoadCustomer),
            MigrationState::AuthorizingPayment => Some(Step::AuthorizePayment),
            MigrationState::Migrating => Some(Step::Migrate),
            MigrationState::AnalyzingResults => Some(Step::AnalyzeResults),
            MigrationState::Reporting => Some(Step::Report),
            MigrationState::CapturingPayment => Some(Step::CapturePayment),
            MigrationState::Invoicing => Some(Step::Invoice),
            _ => None,
        }
    }
}

/// Job parameters carried by `WorkflowExecutionStarted`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    user_id: String,
    #[serde(default)]
    job_id: Option<String>,
}

/// Result shape every migration activity returns
#[derive(Debug, Clone, Deserialize)]
struct StepResult {
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
}

fn default_status() -> u16 {
    STATUS_OK
}

impl StepResult {
    fn parse(result: Option<&Value>) -> Self {
        match result {
            None => StepResult {
                status: STATUS_OK,
                data: Value::Null,
                message: None,
            },
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|_| StepResult {
                status: STATUS_OK,
                data: value.clone(),
                message: None,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Outstanding {
    step: Step,
    activity_id: String,
    scheduled_event_id: i64,
    cancel_requested: bool,
}

/// The account migration state machine
#[derive(Debug, Clone)]
pub struct AccountMigration {
    state: MigrationState,
    /// State to return to if a closing decision times out or is refused
    closing_from: Option<MigrationState>,
    activity_version: String,
    task_list: Option<String>,
    job: Option<Job>,
    outstanding: Option<Outstanding>,
    successful: bool,
    errors: Vec<String>,
}

impl Default for AccountMigration {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountMigration {
    pub fn new() -> Self {
        Self {
            state: MigrationState::Uninitialized,
            closing_from: None,
            activity_version: DEFAULT_ACTIVITY_VERSION.to_string(),
            task_list: None,
            job: None,
            outstanding: None,
            successful: false,
            errors: Vec::new(),
        }
    }

    /// Workflow type this machine decides for
    pub fn workflow_type(version: impl Into<String>) -> WorkflowType {
        WorkflowType::new(WORKFLOW_NAME, version)
    }

    /// Version of the step activity types
    pub fn with_activity_version(mut self, version: impl Into<String>) -> Self {
        self.activity_version = version.into();
        self
    }

    /// Schedule activities on this task list instead of the type default
    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.task_list = Some(task_list.into());
        self
    }

    pub fn current(&self) -> MigrationState {
        self.state
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn transition(&mut self, next: MigrationState) {
        if self.state != next {
            debug!(from = self.state.as_str(), to = next.as_str(), "Migration transition");
            self.state = next;
        }
    }

    fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.transition(MigrationState::Finalizing);
    }

    fn step_input(&self, step: Step) -> Value {
        let Some(job) = &self.job else {
            return Value::Null;
        };
        match step {
            Step::LoadCustomer => json!({"userId": job.user_id}),
            _ => match &job.job_id {
                Some(job_id) => json!({"userId": job.user_id, "jobId": job_id}),
                None => json!({"userId": job.user_id}),
            },
        }
    }

    fn schedule(&self, step: Step, decision_started_event_id: i64) -> Decision {
        let activity_type = ActivityType::new(step.name(), &self.activity_version);
        let activity_id = format!("{}-{}", step.name(), decision_started_event_id);
        let mut decision =
            Decision::schedule_activity(activity_id, activity_type, Some(self.step_input(step)));
        if let Decision::ScheduleActivityTask { task_list_name, .. } = &mut decision {
            task_list_name.clone_from(&self.task_list);
        }
        decision
    }

    fn close(&mut self) -> Result<Vec<Decision>, DeciderError> {
        self.closing_from = Some(self.state);
        let decision = if self.errors.is_empty() {
            let result = json!({
                "userId": self.job.as_ref().map(|j| j.user_id.clone()),
                "jobId": self.job.as_ref().and_then(|j| j.job_id.clone()),
                "successful": self.successful,
            });
            Decision::complete(Some(result))
        } else {
            let details = serde_json::to_string(&self.errors)?;
            Decision::fail("Account migration failed", Some(details))
        };
        self.transition(MigrationState::Closed);
        Ok(vec![decision])
    }

    fn cancel(&mut self) -> Vec<Decision> {
        self.closing_from = Some(self.state);
        let mut decisions = Vec::new();
        if let Some(outstanding) = self.outstanding.as_ref().filter(|o| !o.cancel_requested) {
            decisions.push(Decision::request_cancel_activity(&outstanding.activity_id));
        }
        decisions.push(Decision::cancel(Some(
            "Migration canceled on request".to_string(),
        )));
        self.transition(MigrationState::Closed);
        decisions
    }

    fn on_decision_task_started(&mut self, event_id: i64) -> Result<Vec<Decision>, DeciderError> {
        match self.state {
            MigrationState::Finalizing => self.close(),
            MigrationState::Canceling => Ok(self.cancel()),
            state => match state.step() {
                Some(step) if self.outstanding.is_none() => {
                    Ok(vec![self.schedule(step, event_id)])
                }
                _ => Ok(Vec::new()),
            },
        }
    }

    fn on_completed(&mut self, result: Option<&Value>) {
        let Some(outstanding) = self.outstanding.take() else {
            return;
        };
        if self.state == MigrationState::Canceling || self.state == MigrationState::Closed {
            return;
        }

        let result = StepResult::parse(result);
        match result.status {
            STATUS_OK => {}
            STATUS_NOT_FOUND => {
                self.record_error(
                    result
                        .message
                        .unwrap_or_else(|| "Resource not found.".to_string()),
                );
                return;
            }
            status => {
                self.record_error(format!(
                    "Unexpected status [{}] from workflow state {}::ActivityTaskCompleted",
                    status,
                    self.state.as_str()
                ));
                return;
            }
        }

        let next = match outstanding.step {
            Step::LoadCustomer => MigrationState::AuthorizingPayment,
            Step::AuthorizePayment => MigrationState::Migrating,
            Step::Migrate => MigrationState::AnalyzingResults,
            Step::AnalyzeResults => {
                self.successful = result
                    .data
                    .get("successRate")
                    .and_then(Value::as_f64)
                    .map(|rate| rate > CAPTURE_THRESHOLD)
                    .unwrap_or(false);
                MigrationState::Reporting
            }
            Step::Report if self.successful => MigrationState::CapturingPayment,
            Step::Report => MigrationState::Invoicing,
            Step::CapturePayment => MigrationState::Invoicing,
            Step::Invoice => MigrationState::Finalizing,
        };
        self.transition(next);
    }

    fn on_activity_closed(&mut self, scheduled_event_id: i64, message: String) {
        let matches = self
            .outstanding
            .as_ref()
            .is_some_and(|o| o.scheduled_event_id == scheduled_event_id);
        if !matches {
            return;
        }
        self.outstanding = None;
        if self.state != MigrationState::Canceling && self.state != MigrationState::Closed {
            self.record_error(message);
        }
    }

    /// Undo a close the service never applied
    fn reopen(&mut self) {
        if self.state == MigrationState::Closed {
            if let Some(previous) = self.closing_from.take() {
                self.transition(previous);
            }
        }
    }

    fn step_label(&self) -> &'static str {
        self.outstanding
            .as_ref()
            .map(|o| o.step.name())
            .unwrap_or("unknown")
    }
}

impl StateMachine for AccountMigration {
    fn state(&self) -> &str {
        self.state.as_str()
    }

    fn handle(&mut self, event: &HistoryEvent) -> Result<Vec<Decision>, DeciderError> {
        match &event.attributes {
            EventAttributes::WorkflowExecutionStarted { input, .. }
                if self.state == MigrationState::Uninitialized =>
            {
                let job = input
                    .as_ref()
                    .and_then(|v| serde_json::from_value::<Job>(v.clone()).ok())
                    .filter(|job| !job.user_id.is_empty());
                match job {
                    Some(job) => {
                        self.job = Some(job);
                        self.transition(MigrationState::Initialized);
                    }
                    None => self.record_error("No job was included in workflow task"),
                }
                Ok(Vec::new())
            }

            EventAttributes::WorkflowExecutionCancelRequested { .. } => {
                if self.state != MigrationState::Closed {
                    self.transition(MigrationState::Canceling);
                }
                Ok(Vec::new())
            }

            EventAttributes::DecisionTaskStarted { .. } => {
                self.on_decision_task_started(event.event_id)
            }

            EventAttributes::DecisionTaskTimedOut { .. } => {
                self.reopen();
                Ok(Vec::new())
            }

            EventAttributes::CompleteWorkflowExecutionFailed { cause, .. }
            | EventAttributes::FailWorkflowExecutionFailed { cause, .. }
            | EventAttributes::CancelWorkflowExecutionFailed { cause, .. } => {
                debug!(cause = %cause, state = self.state.as_str(), "Close decision refused");
                self.reopen();
                Ok(Vec::new())
            }

            EventAttributes::ActivityTaskScheduled {
                activity_id,
                activity_type,
                ..
            } => {
                if let Some(step) = Step::from_activity_name(&activity_type.name) {
                    self.outstanding = Some(Outstanding {
                        step,
                        activity_id: activity_id.clone(),
                        scheduled_event_id: event.event_id,
                        cancel_requested: false,
                    });
                }
                Ok(Vec::new())
            }

            EventAttributes::ActivityTaskCancelRequested { activity_id } => {
                if let Some(outstanding) = self
                    .outstanding
                    .as_mut()
                    .filter(|o| &o.activity_id == activity_id)
                {
                    outstanding.cancel_requested = true;
                }
                Ok(Vec::new())
            }

            EventAttributes::ScheduleActivityTaskFailed {
                activity_type,
                cause,
                ..
            } => {
                if self.state != MigrationState::Canceling && self.state != MigrationState::Closed {
                    self.record_error(format!(
                        "Could not schedule {}: {}",
                        activity_type.name, cause
                    ));
                }
                Ok(Vec::new())
            }

            EventAttributes::ActivityTaskCompleted {
                scheduled_event_id,
                result,
                ..
            } => {
                let matches = self
                    .outstanding
                    .as_ref()
                    .is_some_and(|o| o.scheduled_event_id == *scheduled_event_id);
                if matches {
                    self.on_completed(result.as_ref());
                }
                Ok(Vec::new())
            }

            EventAttributes::ActivityTaskFailed {
                scheduled_event_id,
                reason,
                details,
                ..
            } => {
                let message = format!(
                    "{} failed: {}{}",
                    self.step_label(),
                    reason.as_deref().unwrap_or("no reason given"),
                    details
                        .as_deref()
                        .map(|d| format!(" ({})", d))
                        .unwrap_or_default()
                );
                self.on_activity_closed(*scheduled_event_id, message);
                Ok(Vec::new())
            }

            EventAttributes::ActivityTaskTimedOut {
                scheduled_event_id,
                timeout_type,
                ..
            } => {
                let message = format!("{} timed out ({})", self.step_label(), timeout_type);
                self.on_activity_closed(*scheduled_event_id, message);
                Ok(Vec::new())
            }

            EventAttributes::ActivityTaskCanceled {
                scheduled_event_id,
                ..
            } => {
                let message = format!("{} was canceled", self.step_label());
                self.on_activity_closed(*scheduled_event_id, message);
                Ok(Vec::new())
            }

            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::DecisionEngine;
    use crate::workflow::TaskList;

    struct History {
        events: Vec<HistoryEvent>,
    }

    impl History {
        fn started(input: Option<Value>) -> Self {
            let mut history = History { events: Vec::new() };
            history.push(EventAttributes::WorkflowExecutionStarted {
                input,
                workflow_type: AccountMigration::workflow_type("1.0"),
                task_list: TaskList::new("decisions"),
                tag_list: Vec::new(),
                parent_workflow_execution: None,
            });
            history
        }

        fn next_id(&self) -> i64 {
            self.events.len() as i64 + 1
        }

        fn push(&mut self, attributes: EventAttributes) -> i64 {
            let id = self.next_id();
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

        /// Decide to schedule `step` and record it; returns the scheduled event id
        fn schedule_step(&mut self, step: Step) -> i64 {
            let started = self.decision_task();
            let completed = self.complete_decision(started);
            self.push(EventAttributes::ActivityTaskScheduled {
                activity_id: format!("{}-{}", step.name(), started),
                activity_type: ActivityType::new(step.name(), DEFAULT_ACTIVITY_VERSION),
                input: None,
                control: None,
                task_list: TaskList::new("activities"),
                decision_task_completed_event_id: completed,
            })
        }

        /// Schedule, start and complete one step's activity
        fn run_step(&mut self, step: Step, result: Value) {
            let started = self.decision_task();
            let completed = self.complete_decision(started);
            let scheduled = self.push(EventAttributes::ActivityTaskScheduled {
                activity_id: format!("{}-{}", step.name(), started),
                activity_type: ActivityType::new(step.name(), DEFAULT_ACTIVITY_VERSION),
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

        fn decide(&self) -> (Vec<Decision>, String) {
            let outcome = DecisionEngine::new(Box::new(AccountMigration::new()), self.events.clone())
                .run()
                .unwrap();
            (outcome.decisions, outcome.state)
        }
    }

    fn scheduled_step(decision: &Decision) -> &str {
        match decision {
            Decision::ScheduleActivityTask { activity_type, .. } => &activity_type.name,
            other => panic!("expected ScheduleActivityTask, got {:?}", other),
        }
    }

    #[test]
    fn test_first_decision_loads_customer() {
        let mut history = History::started(Some(json!({"userId": "123abc"})));
        history.decision_task();

        let (decisions, state) = history.decide();

        assert_eq!(state, "initialized");
        assert_eq!(
            decisions,
            vec![Decision::schedule_activity(
                "loadCustomer-3",
                ActivityType::new("loadCustomer", DEFAULT_ACTIVITY_VERSION),
                Some(json!({"userId": "123abc"})),
            )]
        );
    }

    #[test]
    fn test_steps_follow_in_order() {
        let mut history = History::started(Some(json!({"userId": "u1", "jobId": "j1"})));
        history.run_step(Step::LoadCustomer, json!({"status": 200, "data": {"id": "u1"}}));
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "authorizing-payment");
        assert_eq!(decisions.len(), 1);
        assert_eq!(scheduled_step(&decisions[0]), "authorizePayment");
        match &decisions[0] {
            Decision::ScheduleActivityTask { input, .. } => {
                assert_eq!(input, &Some(json!({"userId": "u1", "jobId": "j1"})));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_capture_only_when_successful() {
        let run = |rate: f64| {
            let mut history = History::started(Some(json!({"userId": "u1"})));
            history.run_step(Step::LoadCustomer, json!({"status": 200}));
            history.run_step(Step::AuthorizePayment, json!({"status": 200}));
            history.run_step(Step::Migrate, json!({"status": 200}));
            history.run_step(
                Step::AnalyzeResults,
                json!({"status": 200, "data": {"successRate": rate}}),
            );
            history.run_step(Step::Report, json!({"status": 200}));
            history.decision_task();
            history.decide()
        };

        let (decisions, state) = run(0.99);
        assert_eq!(state, "capturing-payment");
        assert_eq!(scheduled_step(&decisions[0]), "capturePayment");

        let (decisions, state) = run(0.5);
        assert_eq!(state, "invoicing");
        assert_eq!(scheduled_step(&decisions[0]), "invoice");
    }

    #[test]
    fn test_completes_after_invoice() {
        let mut history = History::started(Some(json!({"userId": "u1"})));
        for step in [
            Step::LoadCustomer,
            Step::AuthorizePayment,
            Step::Migrate,
            Step::AnalyzeResults,
            Step::Report,
        ] {
            history.run_step(step, json!({"status": 200, "data": {"successRate": 1.0}}));
        }
        history.run_step(Step::CapturePayment, json!({"status": 200}));
        history.run_step(Step::Invoice, json!({"status": 200}));
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "closed");
        assert_eq!(
            decisions,
            vec![Decision::complete(Some(
                json!({"userId": "u1", "jobId": null, "successful": true})
            ))]
        );
    }

    #[test]
    fn test_unexpected_status_fails_workflow() {
        let mut history = History::started(Some(json!({"userId": "u1"})));
        history.run_step(Step::LoadCustomer, json!({"status": 500, "message": "down"}));
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "closed");
        match &decisions[..] {
            [Decision::FailWorkflowExecution { reason, details }] => {
                assert_eq!(reason.as_deref(), Some("Account migration failed"));
                let errors: Vec<String> =
                    serde_json::from_str(details.as_deref().unwrap()).unwrap();
                assert_eq!(
                    errors,
                    vec!["Unexpected status [500] from workflow state initialized::ActivityTaskCompleted"]
                );
            }
            other => panic!("unexpected decisions: {:?}", other),
        }
    }

    #[test]
    fn test_missing_job_fails_workflow() {
        let mut history = History::started(None);
        history.decision_task();

        let (decisions, _) = history.decide();
        match &decisions[..] {
            [Decision::FailWorkflowExecution { details, .. }] => {
                assert!(details
                    .as_deref()
                    .unwrap()
                    .contains("No job was included in workflow task"));
            }
            other => panic!("unexpected decisions: {:?}", other),
        }
    }

    #[test]
    fn test_activity_failure_fails_workflow() {
        let mut history = History::started(Some(json!({"userId": "u1"})));
        let started = history.decision_task();
        let completed = history.complete_decision(started);
        let scheduled = history.push(EventAttributes::ActivityTaskScheduled {
            activity_id: format!("loadCustomer-{}", started),
            activity_type: ActivityType::new("loadCustomer", DEFAULT_ACTIVITY_VERSION),
            input: None,
            control: None,
            task_list: TaskList::new("activities"),
            decision_task_completed_event_id: completed,
        });
        history.push(EventAttributes::ActivityTaskFailed {
            scheduled_event_id: scheduled,
            started_event_id: scheduled + 1,
            reason: Some("boom".into()),
            details: None,
        });
        history.decision_task();

        let (decisions, _) = history.decide();
        assert!(matches!(
            &decisions[..],
            [Decision::FailWorkflowExecution { details: Some(d), .. }] if d.contains("loadCustomer failed: boom")
        ));
    }

    #[test]
    fn test_cancel_request_cancels_outstanding_activity() {
        let mut history = History::started(Some(json!({"userId": "u1"})));
        let started = history.decision_task();
        let completed = history.complete_decision(started);
        history.push(EventAttributes::ActivityTaskScheduled {
            activity_id: format!("loadCustomer-{}", started),
            activity_type: ActivityType::new("loadCustomer", DEFAULT_ACTIVITY_VERSION),
            input: None,
            control: None,
            task_list: TaskList::new("activities"),
            decision_task_completed_event_id: completed,
        });
        history.push(EventAttributes::WorkflowExecutionCancelRequested { cause: None });
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "closed");
        assert_eq!(decisions.len(), 2);
        assert_eq!(
            decisions[0],
            Decision::request_cancel_activity(format!("loadCustomer-{}", started))
        );
        assert!(matches!(decisions[1], Decision::CancelWorkflowExecution { .. }));
    }

    #[test]
    fn test_no_duplicate_schedule_while_outstanding() {
        let mut history = History::started(Some(json!({"userId": "u1"})));
        let started = history.decision_task();
        let completed = history.complete_decision(started);
        history.push(EventAttributes::ActivityTaskScheduled {
            activity_id: format!("loadCustomer-{}", started),
            activity_type: ActivityType::new("loadCustomer", DEFAULT_ACTIVITY_VERSION),
            input: None,
            control: None,
            task_list: TaskList::new("activities"),
            decision_task_completed_event_id: completed,
        });
        history.push(EventAttributes::WorkflowExecutionSignaled {
            signal_name: "poke".into(),
            input: None,
        });
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "initialized");
        assert!(decisions.is_empty());
    }

    #[test]
    fn test_decision_timeout_reissues_close() {
        let mut history = History::started(None);
        let started = history.decision_task();
        history.push(EventAttributes::DecisionTaskTimedOut {
            scheduled_event_id: started - 1,
            started_event_id: started,
            timeout_type: "START_TO_CLOSE".into(),
        });
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "closed");
        assert!(matches!(
            &decisions[..],
            [Decision::FailWorkflowExecution { .. }]
        ));
    }

    #[test]
    fn test_custom_task_list_and_version() {
        let mut machine = AccountMigration::new()
            .with_activity_version("0.2.0")
            .with_task_list("heavy");
        let mut history = History::started(Some(json!({"userId": "u1"})));
        history.decision_task();

        let mut decisions = Vec::new();
        for event in &history.events {
            decisions = machine.handle(event).unwrap();
        }
        match &decisions[..] {
            [Decision::ScheduleActivityTask {
                activity_type,
                task_list_name,
                ..
            }] => {
                assert_eq!(activity_type.version, "0.2.0");
                assert_eq!(task_list_name.as_deref(), Some("heavy"));
            }
            other => panic!("unexpected decisions: {:?}", other),
        }
    }

    fn failure_details(decisions: &[Decision]) -> Vec<String> {
        match decisions {
            [Decision::FailWorkflowExecution { reason, details }] => {
                assert_eq!(reason.as_deref(), Some("Account migration failed"));
                serde_json::from_str(details.as_deref().unwrap_or("[]")).unwrap()
            }
            other => panic!("expected FailWorkflowExecution, got {:?}", other),
        }
    }

    #[test]
    fn test_schedule_failure_fails_workflow() {
        let mut history = History::started(Some(json!({"userId": "u1"})));
        history.run_step(Step::LoadCustomer, json!({"status": 200}));
        let started = history.decision_task();
        history.complete_decision(started);
        history.push(EventAttributes::ScheduleActivityTaskFailed {
            activity_id: format!("authorizePayment-{}", started),
            activity_type: ActivityType::new("authorizePayment", DEFAULT_ACTIVITY_VERSION),
            cause: "ACTIVITY_TYPE_DOES_NOT_EXIST".into(),
        });
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "closed");
        assert_eq!(
            failure_details(&decisions),
            vec!["Could not schedule authorizePayment: ACTIVITY_TYPE_DOES_NOT_EXIST"]
        );
    }

    #[test]
    fn test_activity_timeout_fails_workflow() {
        let mut history = History::started(Some(json!({"userId": "u1"})));
        history.run_step(Step::LoadCustomer, json!({"status": 200}));
        history.run_step(Step::AuthorizePayment, json!({"status": 200}));
        let scheduled = history.schedule_step(Step::Migrate);
        history.push(EventAttributes::ActivityTaskTimedOut {
            scheduled_event_id: scheduled,
            started_event_id: 0,
            timeout_type: "HEARTBEAT".into(),
            details: None,
        });
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "closed");
        assert_eq!(
            failure_details(&decisions),
            vec!["migrate timed out (HEARTBEAT)"]
        );
    }

    #[test]
    fn test_activity_canceled_fails_workflow() {
        let mut history = History::started(Some(json!({"userId": "u1"})));
        let scheduled = history.schedule_step(Step::LoadCustomer);
        history.push(EventAttributes::ActivityTaskCanceled {
            scheduled_event_id: scheduled,
            started_event_id: scheduled + 1,
            details: None,
        });
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "closed");
        assert_eq!(
            failure_details(&decisions),
            vec!["loadCustomer was canceled"]
        );
    }

    #[test]
    fn test_outcome_for_other_activity_is_ignored() {
        let mut history = History::started(Some(json!({"userId": "u1"})));
        let scheduled = history.schedule_step(Step::LoadCustomer);
        history.push(EventAttributes::ActivityTaskCompleted {
            scheduled_event_id: scheduled + 100,
            started_event_id: scheduled + 101,
            result: Some(json!({"status": 500})),
        });
        history.push(EventAttributes::ActivityTaskFailed {
            scheduled_event_id: scheduled + 200,
            started_event_id: scheduled + 201,
            reason: Some("boom".into()),
            details: None,
        });
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "initialized");
        assert!(decisions.is_empty());
    }

    #[test]
    fn test_refused_failure_is_reissued() {
        let mut history = History::started(Some(json!({"userId": "u1"})));
        history.run_step(Step::LoadCustomer, json!({"status": 500}));
        let started = history.decision_task();
        history.push(EventAttributes::WorkflowExecutionSignaled {
            signal_name: "poke".into(),
            input: None,
        });
        let completed = history.complete_decision(started);
        history.push(EventAttributes::FailWorkflowExecutionFailed {
            cause: "UNHANDLED_DECISION".into(),
            decision_task_completed_event_id: completed,
        });
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "closed");
        assert_eq!(
            failure_details(&decisions),
            vec!["Unexpected status [500] from workflow state initialized::ActivityTaskCompleted"]
        );
    }

    #[test]
    fn test_refused_completion_is_reissued() {
        let mut history = History::started(Some(json!({"userId": "u1"})));
        for step in [
            Step::LoadCustomer,
            Step::AuthorizePayment,
            Step::Migrate,
            Step::AnalyzeResults,
            Step::Report,
            Step::Invoice,
        ] {
            history.run_step(step, json!({"status": 200, "data": {"successRate": 0.5}}));
        }
        let started = history.decision_task();
        let completed = history.complete_decision(started);
        history.push(EventAttributes::CompleteWorkflowExecutionFailed {
            cause: "UNHANDLED_DECISION".into(),
            decision_task_completed_event_id: completed,
        });
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "closed");
        assert!(matches!(
            &decisions[..],
            [Decision::CompleteWorkflowExecution { .. }]
        ));
    }

    #[test]
    fn test_refused_cancel_is_reissued_without_second_activity_cancel() {
        let mut history = History::started(Some(json!({"userId": "u1"})));
        let scheduled = history.schedule_step(Step::LoadCustomer);
        let activity_id = match &history.events[(scheduled - 1) as usize].attributes {
            EventAttributes::ActivityTaskScheduled { activity_id, .. } => activity_id.clone(),
            other => panic!("unexpected event {:?}", other),
        };
        history.push(EventAttributes::WorkflowExecutionCancelRequested { cause: None });
        let started = history.decision_task();
        let completed = history.complete_decision(started);
        history.push(EventAttributes::ActivityTaskCancelRequested {
            activity_id: activity_id.clone(),
        });
        history.push(EventAttributes::CancelWorkflowExecutionFailed {
            cause: "UNHANDLED_DECISION".into(),
            decision_task_completed_event_id: completed,
        });
        history.decision_task();

        let (decisions, state) = history.decide();
        assert_eq!(state, "closed");
        assert!(matches!(
            &decisions[..],
            [Decision::CancelWorkflowExecution { .. }]
        ));
    }
}
