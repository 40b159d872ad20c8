//! Decision task poller
//!
//! Long-polls one decision task list and hands each task to a bounded pool.
//! A pool slot is acquired before polling, so a task is never pulled that
//! cannot be processed right away. Processing builds a fresh
//! [`DecisionEngine`](crate::decider::DecisionEngine) over the task's full
//! history, runs it and responds with its decisions.
//!
//! A task that fails to process is logged and left unanswered; the service
//! times it out and schedules a new decision task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, trace};

use super::lifecycle::{LoopSignals, Poller, PollerControl, PollerError, PollerStatus};
use crate::client::WorkflowClient;
use crate::decider::{DecisionOutcome, DeciderRegistry, StateMachine};
use crate::workflow::{DecisionTask, TaskList, WorkflowType};

/// Decision poller configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionPollerConfig {
    pub task_list: TaskList,

    /// Decision tasks processed concurrently
    pub pool_size: usize,

    /// Pause after a failed poll
    #[serde(with = "super::duration_millis")]
    pub error_backoff: Duration,

    /// How long `shutdown()` waits for in-flight tasks
    #[serde(with = "super::duration_millis")]
    pub shutdown_timeout: Duration,
}

impl DecisionPollerConfig {
    pub fn new(task_list: TaskList) -> Self {
        Self {
            task_list,
            pool_size: 4,
            error_backoff: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(90),
        }
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

struct DecisionInner {
    client: WorkflowClient,
    deciders: RwLock<DeciderRegistry>,
    config: DecisionPollerConfig,
    pool: Arc<Semaphore>,
}

/// Poller for one decision task list
pub struct DecisionTaskPoller {
    inner: Arc<DecisionInner>,
    control: PollerControl,
}

impl DecisionTaskPoller {
    pub fn new(
        client: WorkflowClient,
        deciders: DeciderRegistry,
        config: DecisionPollerConfig,
    ) -> Self {
        let control = PollerControl::new("decision", config.task_list.clone());
        let pool = Arc::new(Semaphore::new(config.pool_size.max(1)));
        Self {
            inner: Arc::new(DecisionInner {
                client,
                deciders: RwLock::new(deciders),
                config,
                pool,
            }),
            control,
        }
    }

    pub fn config(&self) -> &DecisionPollerConfig {
        &self.inner.config
    }

    /// Add or replace the decider for a workflow type; applies to the next task
    pub fn register_decider<F>(&self, workflow_type: &WorkflowType, factory: F)
    where
        F: Fn() -> Box<dyn StateMachine> + Send + Sync + 'static,
    {
        self.inner.deciders.write().register(workflow_type, factory);
    }

    pub fn has_decider(&self, workflow_type: &WorkflowType) -> bool {
        self.inner.deciders.read().contains(workflow_type)
    }

    /// One long poll; `None` when the poll window closed without a task
    pub async fn poll(&self) -> Result<Option<DecisionTask>, PollerError> {
        self.inner.poll().await
    }

    /// Replay, decide and respond for one task
    pub async fn process(&self, task: DecisionTask) -> Result<DecisionOutcome, PollerError> {
        self.inner.process(task).await
    }

    /// Poll until shut down on the current task
    ///
    /// `start()` runs the same loop on a task of its own.
    pub async fn run(&self) {
        run_loop(Arc::clone(&self.inner), self.control.signals()).await;
    }

    /// Free pool slots
    pub fn available_slots(&self) -> usize {
        self.inner.pool.available_permits()
    }
}

impl DecisionInner {
    async fn poll(&self) -> Result<Option<DecisionTask>, PollerError> {
        Ok(self
            .client
            .poll_for_decision_task(&self.config.task_list)
            .await?)
    }

    #[instrument(
        skip(self, task),
        fields(
            execution = %task.workflow_execution,
            workflow_type = %task.workflow_type,
            started_event_id = task.started_event_id,
        )
    )]
    async fn process(&self, task: DecisionTask) -> Result<DecisionOutcome, PollerError> {
        let engine = self.deciders.read().engine_for(&task)?;
        let outcome = engine.run()?;

        self.client
            .respond_decision_task_completed(
                &task.task_token,
                &outcome.decisions,
                Some(outcome.state.clone()),
            )
            .await?;

        debug!(
            state = %outcome.state,
            decisions = outcome.decisions.len(),
            replayed = outcome.replayed,
            "Decision task completed"
        );
        Ok(outcome)
    }
}

async fn run_loop(inner: Arc<DecisionInner>, mut signals: LoopSignals) {
    info!(
        task_list = %inner.config.task_list,
        pool_size = inner.config.pool_size,
        "Decision poller started"
    );
    let mut in_flight = JoinSet::new();

    while signals.ready().await {
        while let Some(joined) = in_flight.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Decision task panicked");
            }
        }

        let permit = tokio::select! {
            permit = Arc::clone(&inner.pool).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = signals.shutdown_requested() => break,
        };

        match inner.poll().await {
            Ok(Some(task)) => {
                let inner = Arc::clone(&inner);
                in_flight.spawn(async move {
                    let _permit = permit;
                    let execution = task.workflow_execution.clone();
                    if let Err(e) = inner.process(task).await {
                        error!(
                            execution = %execution,
                            error = %e,
                            "Decision task failed, leaving it to time out"
                        );
                    }
                });
            }
            Ok(None) => trace!("Decision poll returned no task"),
            Err(e) => {
                drop(permit);
                error!(error = %e, "Decision poll failed");
                if signals.sleep(inner.config.error_backoff).await {
                    break;
                }
            }
        }
    }

    debug!(in_flight = in_flight.len(), "Draining decision tasks");
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Decision task panicked");
        }
    }
    info!(task_list = %inner.config.task_list, "Decision poller stopped");
}

#[async_trait]
impl Poller for DecisionTaskPoller {
    fn task_list(&self) -> &TaskList {
        self.control.task_list()
    }

    fn start(&self) -> Result<(), PollerError> {
        let inner = Arc::clone(&self.inner);
        self.control
            .start(move |signals| tokio::spawn(run_loop(inner, signals)))
    }

    fn stop(&self) {
        self.control.stop();
    }

    async fn shutdown(&self) -> Result<(), PollerError> {
        self.control
            .shutdown(self.inner.config.shutdown_timeout)
            .await
    }

    fn status(&self) -> PollerStatus {
        self.control.status()
    }
}

impl std::fmt::Debug for DecisionTaskPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionTaskPoller")
            .field("config", &self.inner.config)
            .field("deciders", &*self.inner.deciders.read())
            .field("status", &self.control.status())
            .finish()
    }
}
