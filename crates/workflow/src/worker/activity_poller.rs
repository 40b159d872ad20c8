//! Activity task poller
//!
//! Long-polls one activity task list and runs an [`ActivityWorker`] per task.
//! Before every poll the admission check decides whether this process can
//! take on more work; under pressure the poller waits out the throttle
//! interval instead of polling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use super::activity::{Activity, ActivityRegistry, ActivityRegistryError};
use super::activity_worker::ActivityWorker;
use super::admission::{Admission, AdmissionConfig, AdmissionState, ResourceProbe, SystemProbe};
use super::lifecycle::{LoopSignals, Poller, PollerControl, PollerError, PollerStatus};
use crate::client::{ClientError, WorkflowClient};
use crate::workflow::{ActivityTask, TaskList};

/// Activity poller configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityPollerConfig {
    pub task_list: TaskList,

    pub admission: AdmissionConfig,

    /// Pause after a failed poll
    #[serde(with = "super::duration_millis")]
    pub error_backoff: Duration,

    /// How long `shutdown()` waits for running activities
    #[serde(with = "super::duration_millis")]
    pub shutdown_timeout: Duration,
}

impl ActivityPollerConfig {
    pub fn new(task_list: TaskList) -> Self {
        Self {
            task_list,
            admission: AdmissionConfig::default(),
            error_backoff: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(90),
        }
    }

    pub fn with_admission(mut self, admission: AdmissionConfig) -> Self {
        self.admission = admission;
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

struct ActivityInner {
    client: WorkflowClient,
    activities: RwLock<ActivityRegistry>,
    config: ActivityPollerConfig,
    admission: Arc<AdmissionState>,
}

/// Poller for one activity task list
pub struct ActivityTaskPoller {
    inner: Arc<ActivityInner>,
    control: PollerControl,
}

impl ActivityTaskPoller {
    /// Create a poller gated on this host's memory and load
    pub fn new(client: WorkflowClient, config: ActivityPollerConfig) -> Self {
        Self::with_probe(client, config, Arc::new(SystemProbe::new()))
    }

    /// Create a poller gated on readings from `probe`
    pub fn with_probe(
        client: WorkflowClient,
        config: ActivityPollerConfig,
        probe: Arc<dyn ResourceProbe>,
    ) -> Self {
        let control = PollerControl::new("activity", config.task_list.clone());
        let admission = Arc::new(AdmissionState::new(config.admission.clone(), probe));
        Self {
            inner: Arc::new(ActivityInner {
                client,
                activities: RwLock::new(ActivityRegistry::new()),
                config,
                admission,
            }),
            control,
        }
    }

    pub fn config(&self) -> &ActivityPollerConfig {
        &self.inner.config
    }

    /// Add an activity locally; see [`register_types`](Self::register_types)
    pub fn register_activity(
        &self,
        activity: Arc<dyn Activity>,
    ) -> Result<(), ActivityRegistryError> {
        self.inner.activities.write().register(activity)
    }

    /// Register every local activity type with the service
    pub async fn register_types(&self) -> Result<(), ClientError> {
        let registry = self.inner.activities.read().clone();
        registry.register_types(&self.inner.client).await
    }

    /// Activities this poller can run
    pub fn activities(&self) -> ActivityRegistry {
        self.inner.activities.read().clone()
    }

    /// Activities currently running
    pub fn running(&self) -> usize {
        self.inner.admission.running()
    }

    /// Reason the last admission check refused work, if it did
    pub fn throttle_reason(&self) -> Option<String> {
        self.inner.admission.throttle_reason()
    }

    /// One long poll; `None` when the poll window closed without a task
    pub async fn poll(&self) -> Result<Option<ActivityTask>, PollerError> {
        self.inner.poll().await
    }

    /// Poll until shut down on the current task
    ///
    /// `start()` runs the same loop on a task of its own.
    pub async fn run(&self) {
        run_loop(Arc::clone(&self.inner), self.control.signals()).await;
    }
}

impl ActivityInner {
    async fn poll(&self) -> Result<Option<ActivityTask>, PollerError> {
        Ok(self
            .client
            .poll_for_activity_task(&self.config.task_list)
            .await?)
    }

    /// Start a worker for the task, or fail the task if nothing can run it
    async fn dispatch(&self, task: ActivityTask, in_flight: &mut JoinSet<()>) {
        let activity = self.activities.read().get(&task.activity_type);
        let Some(activity) = activity else {
            let reason = format!(
                "The activity poller did not have a worker for activity type [{}]",
                task.activity_type.key()
            );
            warn!(activity_id = %task.activity_id, reason = %reason, "No activity registered");
            if let Err(e) = self
                .client
                .respond_activity_task_failed(&task.task_token, Some(&reason), None)
                .await
            {
                error!(activity_id = %task.activity_id, error = %e, "Failed to report activity task");
            }
            return;
        };

        let running = self.admission.activity_started();
        let worker = ActivityWorker::new(self.client.clone(), activity, task);
        in_flight.spawn(async move {
            let _running = running;
            worker.run().await;
        });
    }
}

async fn run_loop(inner: Arc<ActivityInner>, mut signals: LoopSignals) {
    info!(task_list = %inner.config.task_list, "Activity poller started");
    let mut in_flight = JoinSet::new();

    while signals.ready().await {
        while let Some(joined) = in_flight.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Activity worker panicked");
            }
        }

        if let Admission::Throttle(reason) = inner.admission.check() {
            debug!(reason = %reason, running = inner.admission.running(), "Activity poll throttled");
            if signals.sleep(inner.admission.throttle_interval()).await {
                break;
            }
            continue;
        }

        match inner.poll().await {
            Ok(Some(task)) => inner.dispatch(task, &mut in_flight).await,
            Ok(None) => trace!("Activity poll returned no task"),
            Err(e) => {
                error!(error = %e, "Activity poll failed");
                if signals.sleep(inner.config.error_backoff).await {
                    break;
                }
            }
        }
    }

    debug!(in_flight = in_flight.len(), "Draining activity workers");
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Activity worker panicked");
        }
    }
    info!(task_list = %inner.config.task_list, "Activity poller stopped");
}

#[async_trait]
impl Poller for ActivityTaskPoller {
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

impl std::fmt::Debug for ActivityTaskPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityTaskPoller")
            .field("config", &self.inner.config)
            .field("activities", &*self.inner.activities.read())
            .field("running", &self.inner.admission.running())
            .field("status", &self.control.status())
            .finish()
    }
}
