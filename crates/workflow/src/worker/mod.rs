//! Pollers and activity execution
//!
//! This module provides:
//! - [`DecisionTaskPoller`] - Long-polls decision tasks into a bounded pool
//! - [`ActivityTaskPoller`] - Long-polls activity tasks behind admission control
//! - [`ActivityWorker`] and [`HeartbeatMonitor`] - Run one activity task with liveness reporting
//! - [`WorkflowHost`] - Registration and lifecycle for one workflow type
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────── WorkflowHost ──────────────────────────────┐
//! │                                                                          │
//! │  DecisionTaskPoller (per task list)    ActivityTaskPoller (per task list) │
//! │   │ acquire pool slot                   │ AdmissionState::check()         │
//! │   │ PollForDecisionTask                 │ PollForActivityTask             │
//! │   ▼                                     ▼                                 │
//! │  DecisionEngine (replay, decide)       ActivityWorker ── HeartbeatMonitor │
//! │   │                                     │                                 │
//! │   ▼                                     ▼                                 │
//! │  RespondDecisionTaskCompleted          RespondActivityTask{Completed,     │
//! │                                          Failed,Canceled}                 │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

mod activity;
mod activity_poller;
mod activity_worker;
mod admission;
mod decision_poller;
mod heartbeat;
mod host;
mod lifecycle;

pub use activity::{
    Activity, ActivityContext, ActivityError, ActivityRegistry, ActivityRegistryError,
    PlaceholderActivity,
};
pub use activity_poller::{ActivityPollerConfig, ActivityTaskPoller};
pub use activity_worker::{ActivityOutcome, ActivityWorker};
pub use admission::{
    Admission, AdmissionConfig, AdmissionError, AdmissionState, ResourceProbe, ResourceSample,
    RunningGuard, SystemProbe,
};
pub use decision_poller::{DecisionPollerConfig, DecisionTaskPoller};
pub use heartbeat::{heartbeat_interval, HeartbeatMonitor, DEFAULT_HEARTBEAT_TIMEOUT};
pub use host::{HostError, WorkflowHost};
pub use lifecycle::{Poller, PollerError, PollerStatus};

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
