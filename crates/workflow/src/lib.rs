//! # Migration Workflow Engine
//!
//! Client-side orchestration for account migrations driven by an SWF-style
//! workflow service. The service owns every execution's history; this crate
//! polls for work, replays history to decide what comes next, and runs the
//! activities those decisions schedule.
//!
//! ## Features
//!
//! - **Replay-based deciding**: A fresh state machine rebuilds its state from the full history on every decision task
//! - **Bounded decision pool**: A pool slot is taken before polling, so no task is pulled that cannot start at once
//! - **Admission control**: Activity polling pauses while memory, load or the running count is over its threshold
//! - **Heartbeats**: Each running activity reports liveness and learns about cancellation through heartbeats
//! - **Pluggable transport**: HTTP for a real service, in-memory for tests and local runs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkflowHost                           │
//! │  (registers the workflow type, owns pollers per task list)   │
//! └─────────────────────────────────────────────────────────────┘
//!              │                                  │
//!              ▼                                  ▼
//! ┌──────────────────────────┐     ┌──────────────────────────────┐
//! │   DecisionTaskPoller     │     │     ActivityTaskPoller        │
//! │  DecisionEngine replay   │     │  ActivityWorker + Heartbeat   │
//! └──────────────────────────┘     └──────────────────────────────┘
//!              │                                  │
//!              ▼                                  ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowClient                          │
//! │          (WorkflowService: HTTP or in-memory)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use migrate_workflow::prelude::*;
//!
//! let config = EngineConfig::from_env();
//! let service = Arc::new(InMemoryWorkflowService::new(InMemoryConfig::default()));
//! let client = WorkflowClient::new(service, config.client_config());
//!
//! let host = WorkflowHost::new(client, config.workflow_type_options()).await?;
//! host.register_decider(&TaskList::new(&config.decision_task_list), || {
//!     Box::new(AccountMigration::new())
//! });
//! host.start()?;
//! ```

pub mod client;
pub mod config;
pub mod decider;
pub mod worker;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::client::{
        ClientConfig, ClientError, HttpWorkflowService, InMemoryConfig, InMemoryWorkflowService,
        ServiceError, ServiceErrorKind, WorkflowClient, WorkflowService,
    };
    pub use crate::config::{ConfigError, EngineConfig};
    pub use crate::decider::{
        AccountMigration, DecisionEngine, DeciderRegistry, StateMachine, Step,
    };
    pub use crate::worker::{
        Activity, ActivityContext, ActivityError, ActivityTaskPoller, DecisionTaskPoller,
        PlaceholderActivity, Poller, PollerError, WorkflowHost,
    };
    pub use crate::workflow::{
        ActivityDescriptor, Decision, HistoryEvent, TaskList, WorkflowType, WorkflowTypeOptions,
    };
    pub use std::sync::Arc;
}

// Re-export key types at crate root
pub use client::{ClientError, WorkflowClient, WorkflowService};
pub use config::{ConfigError, EngineConfig};
pub use decider::{AccountMigration, DecisionEngine, StateMachine};
pub use worker::{ActivityTaskPoller, DecisionTaskPoller, Poller, WorkflowHost};
pub use workflow::{Decision, HistoryEvent, TaskList, WorkflowType};
