//! Decisions emitted by a decider
//!
//! A decision is the answer to "what should happen next" for one workflow
//! execution. Serialized form is `{"type": "<Variant>", ...fields}`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ActivityType, ChildPolicy, WorkflowType};

/// Output of a decision engine run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Decision {
    /// Schedule an activity task
    ScheduleActivityTask {
        activity_id: String,
        activity_type: ActivityType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        control: Option<Value>,
        /// Overrides the activity type's default task list
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_list_name: Option<String>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "duration_secs_opt"
        )]
        heartbeat_timeout: Option<Duration>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "duration_secs_opt"
        )]
        schedule_to_close_timeout: Option<Duration>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "duration_secs_opt"
        )]
        schedule_to_start_timeout: Option<Duration>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "duration_secs_opt"
        )]
        start_to_close_timeout: Option<Duration>,
    },

    StartTimer {
        timer_id: String,
        #[serde(with = "duration_secs")]
        start_to_fire_timeout: Duration,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        control: Option<Value>,
    },

    CompleteWorkflowExecution {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },

    FailWorkflowExecution {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },

    CancelWorkflowExecution {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },

    SignalExternalWorkflowExecution {
        workflow_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        signal_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        control: Option<Value>,
    },

    StartChildWorkflowExecution {
        workflow_id: String,
        workflow_type: WorkflowType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        control: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_list_name: Option<String>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "duration_secs_opt"
        )]
        execution_start_to_close_timeout: Option<Duration>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "duration_secs_opt"
        )]
        task_start_to_close_timeout: Option<Duration>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        child_policy: Option<ChildPolicy>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tag_list: Vec<String>,
    },

    RecordMarker {
        marker_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },

    RequestCancelActivityTask {
        activity_id: String,
    },

    ContinueAsNewWorkflowExecution {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_list_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workflow_type_version: Option<String>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "duration_secs_opt"
        )]
        execution_start_to_close_timeout: Option<Duration>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "duration_secs_opt"
        )]
        task_start_to_close_timeout: Option<Duration>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        child_policy: Option<ChildPolicy>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tag_list: Vec<String>,
    },

    CancelTimer {
        timer_id: String,
    },

    RequestCancelExternalWorkflowExecution {
        workflow_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        control: Option<Value>,
    },
}

impl Decision {
    /// Schedule an activity using the type's registered defaults
    pub fn schedule_activity(
        activity_id: impl Into<String>,
        activity_type: ActivityType,
        input: Option<Value>,
    ) -> Self {
        Decision::ScheduleActivityTask {
            activity_id: activity_id.into(),
            activity_type,
            input,
            control: None,
            task_list_name: None,
            heartbeat_timeout: None,
            schedule_to_close_timeout: None,
            schedule_to_start_timeout: None,
            start_to_close_timeout: None,
        }
    }

    pub fn complete(result: Option<Value>) -> Self {
        Decision::CompleteWorkflowExecution { result }
    }

    pub fn fail(reason: impl Into<String>, details: Option<String>) -> Self {
        Decision::FailWorkflowExecution {
            reason: Some(reason.into()),
            details,
        }
    }

    pub fn cancel(details: Option<String>) -> Self {
        Decision::CancelWorkflowExecution { details }
    }

    pub fn start_timer(timer_id: impl Into<String>, start_to_fire_timeout: Duration) -> Self {
        Decision::StartTimer {
            timer_id: timer_id.into(),
            start_to_fire_timeout,
            control: None,
        }
    }

    pub fn request_cancel_activity(activity_id: impl Into<String>) -> Self {
        Decision::RequestCancelActivityTask {
            activity_id: activity_id.into(),
        }
    }

    /// Variant tag, identical to the service's decision type name
    pub fn decision_type(&self) -> &'static str {
        match self {
            Decision::ScheduleActivityTask { .. } => "ScheduleActivityTask",
            Decision::StartTimer { .. } => "StartTimer",
            Decision::CompleteWorkflowExecution { .. } => "CompleteWorkflowExecution",
            Decision::FailWorkflowExecution { .. } => "FailWorkflowExecution",
            Decision::CancelWorkflowExecution { .. } => "CancelWorkflowExecution",
            Decision::SignalExternalWorkflowExecution { .. } => "SignalExternalWorkflowExecution",
            Decision::StartChildWorkflowExecution { .. } => "StartChildWorkflowExecution",
            Decision::RecordMarker { .. } => "RecordMarker",
            Decision::RequestCancelActivityTask { .. } => "RequestCancelActivityTask",
            Decision::ContinueAsNewWorkflowExecution { .. } => "ContinueAsNewWorkflowExecution",
            Decision::CancelTimer { .. } => "CancelTimer",
            Decision::RequestCancelExternalWorkflowExecution { .. } => {
                "RequestCancelExternalWorkflowExecution"
            }
        }
    }

    /// Whether this decision closes the execution
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Decision::CompleteWorkflowExecution { .. }
                | Decision::FailWorkflowExecution { .. }
                | Decision::CancelWorkflowExecution { .. }
                | Decision::ContinueAsNewWorkflowExecution { .. }
        )
    }
}

/// Serde support for Duration as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
