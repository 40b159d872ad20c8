//! Workflow host
//!
//! Owns everything one process runs for a workflow type: the type's
//! registration, one decision poller per decision task list and one activity
//! poller per activity task list. Lifecycle calls fan out to every poller.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::activity::{Activity, ActivityRegistryError};
use super::activity_poller::{ActivityPollerConfig, ActivityTaskPoller};
use super::admission::{ResourceProbe, SystemProbe};
use super::decision_poller::{DecisionPollerConfig, DecisionTaskPoller};
use super::lifecycle::{Poller, PollerError};
use crate::client::{ClientError, StartWorkflowOptions, WorkflowClient};
use crate::decider::{DeciderRegistry, StateMachine};
use crate::workflow::{TaskList, WorkflowExecution, WorkflowType, WorkflowTypeOptions};

/// Workflow host errors
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Protocol client error
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Poller lifecycle error
    #[error(transparent)]
    Poller(#[from] PollerError),

    /// Activity could not be registered
    #[error(transparent)]
    Activity(#[from] ActivityRegistryError),
}

/// Pollers and registration for one workflow type
///
/// # Example
///
/// ```ignore
/// let host = WorkflowHost::new(client, options).await?;
/// host.register_decider(&TaskList::new("migration-decisions"), || {
///     Box::new(AccountMigration::new())
/// });
/// host.register_activities(&TaskList::new("migration-activities"), activities).await?;
/// host.start()?;
///
/// let execution = host.start_execution(None, Some(json!({"userId": "123abc"}))).await?;
///
/// host.shutdown().await?;
/// ```
pub struct WorkflowHost {
    client: WorkflowClient,
    options: WorkflowTypeOptions,
    decision_defaults: DecisionPollerConfig,
    activity_defaults: ActivityPollerConfig,
    probe: Arc<dyn ResourceProbe>,
    deciders: Mutex<BTreeMap<String, Arc<DecisionTaskPoller>>>,
    workers: Mutex<BTreeMap<String, Arc<ActivityTaskPoller>>>,
}

impl WorkflowHost {
    /// Register the workflow type and create an empty host
    #[instrument(skip_all, fields(workflow_type = %options.workflow_type))]
    pub async fn new(
        client: WorkflowClient,
        options: WorkflowTypeOptions,
    ) -> Result<Self, HostError> {
        client.register_workflow_type(&options).await?;

        let task_list = options
            .default_task_list
            .clone()
            .unwrap_or_else(|| TaskList::new(&options.workflow_type.name));

        Ok(Self {
            client,
            decision_defaults: DecisionPollerConfig::new(task_list.clone()),
            activity_defaults: ActivityPollerConfig::new(task_list),
            options,
            probe: Arc::new(SystemProbe::new()),
            deciders: Mutex::new(BTreeMap::new()),
            workers: Mutex::new(BTreeMap::new()),
        })
    }

    /// Settings for decision pollers created later; the task list is replaced
    pub fn with_decision_defaults(mut self, config: DecisionPollerConfig) -> Self {
        self.decision_defaults = config;
        self
    }

    /// Settings for activity pollers created later; the task list is replaced
    pub fn with_activity_defaults(mut self, config: ActivityPollerConfig) -> Self {
        self.activity_defaults = config;
        self
    }

    /// Resource readings used by activity pollers created later
    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn workflow_type(&self) -> &WorkflowType {
        &self.options.workflow_type
    }

    pub fn client(&self) -> &WorkflowClient {
        &self.client
    }

    /// Decide for this workflow type on `task_list`
    ///
    /// The poller for a task list is created once and reused.
    pub fn register_decider<F>(&self, task_list: &TaskList, factory: F) -> Arc<DecisionTaskPoller>
    where
        F: Fn() -> Box<dyn StateMachine> + Send + Sync + 'static,
    {
        let mut deciders = self.deciders.lock();
        let poller = deciders.entry(task_list.name.clone()).or_insert_with(|| {
            info!(task_list = %task_list, "Creating decision poller");
            let config = DecisionPollerConfig {
                task_list: task_list.clone(),
                ..self.decision_defaults.clone()
            };
            Arc::new(DecisionTaskPoller::new(
                self.client.clone(),
                DeciderRegistry::new(),
                config,
            ))
        });
        poller.register_decider(&self.options.workflow_type, factory);
        Arc::clone(poller)
    }

    /// Run `activities` from `task_list`, registering their types with the service
    pub async fn register_activities(
        &self,
        task_list: &TaskList,
        activities: Vec<Arc<dyn Activity>>,
    ) -> Result<Arc<ActivityTaskPoller>, HostError> {
        let poller = {
            let mut workers = self.workers.lock();
            let poller = workers.entry(task_list.name.clone()).or_insert_with(|| {
                info!(task_list = %task_list, "Creating activity poller");
                let config = ActivityPollerConfig {
                    task_list: task_list.clone(),
                    ..self.activity_defaults.clone()
                };
                Arc::new(ActivityTaskPoller::with_probe(
                    self.client.clone(),
                    config,
                    Arc::clone(&self.probe),
                ))
            });
            Arc::clone(poller)
        };

        for activity in activities {
            let descriptor = activity.descriptor();
            if descriptor.task_list_name != task_list.name {
                warn!(
                    activity_type = %descriptor.key(),
                    default_task_list = %descriptor.task_list_name,
                    task_list = %task_list,
                    "Activity polled outside its default task list"
                );
            }
            poller.register_activity(activity)?;
        }
        poller.register_types().await?;
        Ok(poller)
    }

    /// Start an execution of this workflow type
    ///
    /// A workflow id is generated when none is given.
    pub async fn start_execution(
        &self,
        workflow_id: Option<String>,
        input: Option<Value>,
    ) -> Result<WorkflowExecution, HostError> {
        let workflow_id = workflow_id
            .unwrap_or_else(|| format!("{}-{}", self.options.workflow_type.name, Uuid::now_v7()));
        let mut options =
            StartWorkflowOptions::new(self.options.workflow_type.clone()).with_workflow_id(workflow_id);
        options.input = input;

        Ok(self.client.start_workflow_execution(options).await?)
    }

    /// Ask the service to cancel an execution
    pub async fn cancel_execution(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
    ) -> Result<(), HostError> {
        Ok(self
            .client
            .request_cancel_workflow_execution(workflow_id, run_id)
            .await?)
    }

    /// Every poller, decision pollers first
    pub fn pollers(&self) -> Vec<Arc<dyn Poller>> {
        let mut pollers: Vec<Arc<dyn Poller>> = Vec::new();
        for poller in self.deciders.lock().values() {
            pollers.push(Arc::clone(poller) as Arc<dyn Poller>);
        }
        for poller in self.workers.lock().values() {
            pollers.push(Arc::clone(poller) as Arc<dyn Poller>);
        }
        pollers
    }

    pub fn start(&self) -> Result<(), HostError> {
        for poller in self.pollers() {
            poller.start()?;
        }
        info!(workflow_type = %self.options.workflow_type, "Workflow host started");
        Ok(())
    }

    pub fn stop(&self) {
        for poller in self.pollers() {
            poller.stop();
        }
        info!(workflow_type = %self.options.workflow_type, "Workflow host stopped");
    }

    /// Shut every poller down; the first error is returned after all have been tried
    pub async fn shutdown(&self) -> Result<(), HostError> {
        let results =
            futures::future::join_all(self.pollers().into_iter().map(|poller| async move {
                let task_list = poller.task_list().clone();
                poller.shutdown().await.map_err(|e| (task_list, e))
            }))
            .await;

        let mut first = None;
        for result in results {
            if let Err((task_list, e)) = result {
                warn!(task_list = %task_list, error = %e, "Poller shutdown failed");
                first.get_or_insert(e);
            }
        }

        info!(workflow_type = %self.options.workflow_type, "Workflow host shut down");
        match first {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for WorkflowHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowHost")
            .field("workflow_type", &self.options.workflow_type)
            .field("deciders", &self.deciders.lock().keys().collect::<Vec<_>>())
            .field("workers", &self.workers.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}
