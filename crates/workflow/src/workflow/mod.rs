//! Workflow data model
//!
//! This module provides:
//! - Type identifiers ([`WorkflowType`], [`ActivityType`], [`TaskList`], [`WorkflowExecution`])
//! - History events ([`HistoryEvent`], [`EventAttributes`])
//! - Decisions ([`Decision`])
//! - Tasks delivered by the service ([`DecisionTask`], [`ActivityTask`])

mod decision;
mod event;
mod task;
mod types;

pub use decision::Decision;
pub use event::{EventAttributes, HistoryEvent};
pub use task::{ActivityTask, DecisionTask};
pub use types::{
    ActivityDescriptor, ActivityType, ChildPolicy, TaskList, WorkflowExecution, WorkflowType,
    WorkflowTypeOptions,
};
