//! Decider registry
//!
//! Maps workflow types to factories producing a fresh state machine for
//! every decision task.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::engine::DecisionEngine;
use super::machine::StateMachine;
use crate::workflow::{DecisionTask, WorkflowType};

/// Factory creating one machine per decision task
pub type DeciderFactory = Arc<dyn Fn() -> Box<dyn StateMachine> + Send + Sync>;

/// Errors from registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No decider registered for the workflow type
    #[error("unknown workflow type: {0}")]
    UnknownWorkflowType(String),
}

/// Registry of decider factories keyed by `name/version`
#[derive(Clone, Default)]
pub struct DeciderRegistry {
    factories: HashMap<String, DeciderFactory>,
}

impl DeciderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a workflow type, replacing any previous one
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut registry = DeciderRegistry::new();
    /// registry.register(&WorkflowType::new("migration", "1.0"), || {
    ///     Box::new(AccountMigration::new())
    /// });
    /// ```
    pub fn register<F>(&mut self, workflow_type: &WorkflowType, factory: F)
    where
        F: Fn() -> Box<dyn StateMachine> + Send + Sync + 'static,
    {
        self.factories
            .insert(workflow_type.key(), Arc::new(factory));
    }

    pub fn contains(&self, workflow_type: &WorkflowType) -> bool {
        self.factories.contains_key(&workflow_type.key())
    }

    /// Create a fresh machine for a workflow type
    pub fn create(
        &self,
        workflow_type: &WorkflowType,
    ) -> Result<Box<dyn StateMachine>, RegistryError> {
        let factory = self
            .factories
            .get(&workflow_type.key())
            .ok_or_else(|| RegistryError::UnknownWorkflowType(workflow_type.key()))?;
        Ok(factory())
    }

    /// Build a single-use engine over a decision task's history
    pub fn engine_for(&self, task: &DecisionTask) -> Result<DecisionEngine, RegistryError> {
        let machine = self.create(&task.workflow_type)?;
        Ok(DecisionEngine::new(machine, task.events.clone()))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered `name/version` keys
    pub fn workflow_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|s| s.as_str())
    }
}

impl fmt::Debug for DeciderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeciderRegistry")
            .field("workflow_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::machine::DeciderError;
    use crate::workflow::{Decision, HistoryEvent};

    struct Idle;

    impl StateMachine for Idle {
        fn state(&self) -> &str {
            "idle"
        }

        fn handle(&mut self, _event: &HistoryEvent) -> Result<Vec<Decision>, DeciderError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_register_and_create() {
        let workflow_type = WorkflowType::new("migration", "1.0");
        let mut registry = DeciderRegistry::new();
        assert!(registry.is_empty());

        registry.register(&workflow_type, || Box::new(Idle));

        assert!(registry.contains(&workflow_type));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.create(&workflow_type).unwrap().state(), "idle");
        assert_eq!(
            registry.workflow_types().collect::<Vec<_>>(),
            vec!["migration/1.0"]
        );
    }

    #[test]
    fn test_unknown_version_is_an_error() {
        let mut registry = DeciderRegistry::new();
        registry.register(&WorkflowType::new("migration", "1.0"), || Box::new(Idle));

        let err = registry
            .create(&WorkflowType::new("migration", "2.0"))
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::UnknownWorkflowType(ref key) if key == "migration/2.0"));
    }
}
