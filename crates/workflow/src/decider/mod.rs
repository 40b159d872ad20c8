//! Deciders
//!
//! This module provides:
//! - [`StateMachine`]: the interface a workflow's decision logic implements
//! - [`DecisionEngine`]: single-use replay of one decision task's history
//! - [`DeciderRegistry`]: workflow type to machine factory lookup
//! - [`AccountMigration`]: the account migration state machine

mod engine;
mod machine;
mod migration;
mod registry;

pub use engine::{DecisionEngine, DecisionOutcome};
pub use machine::{DeciderError, StateMachine};
pub use migration::{
    AccountMigration, MigrationState, Step, DEFAULT_ACTIVITY_VERSION, WORKFLOW_NAME,
};
pub use registry::{DeciderFactory, DeciderRegistry, RegistryError};
