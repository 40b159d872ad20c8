//! Activity implementations and their registry
//!
//! An [`Activity`] performs one unit of work for an activity task. It is
//! handed an [`ActivityContext`] for reporting progress and observing
//! cancellation; both travel through the task's heartbeat.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::client::{ClientError, WorkflowClient};
use crate::workflow::{ActivityDescriptor, ActivityTask, ActivityType, WorkflowExecution};

/// Error returned by an activity
///
/// `cancelled` errors are reported as RespondActivityTaskCanceled, all
/// others as RespondActivityTaskFailed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason}")]
pub struct ActivityError {
    pub reason: String,
    pub details: Option<String>,
    pub cancelled: bool,
}

impl ActivityError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            details: None,
            cancelled: false,
        }
    }

    /// The activity stopped because cancellation was requested
    pub fn cancelled(details: Option<String>) -> Self {
        Self {
            reason: "canceled".to_string(),
            details,
            cancelled: true,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Handle given to an executing activity
///
/// Cheap to clone; clones share progress and cancellation state with the
/// task's heartbeat monitor.
#[derive(Clone)]
pub struct ActivityContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    task_token: String,
    activity_id: String,
    activity_type: ActivityType,
    workflow_execution: WorkflowExecution,
    progress: Mutex<Option<String>>,
    cancel_tx: watch::Sender<bool>,
}

impl ActivityContext {
    pub fn new(task: &ActivityTask) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ContextInner {
                task_token: task.task_token.clone(),
                activity_id: task.activity_id.clone(),
                activity_type: task.activity_type.clone(),
                workflow_execution: task.workflow_execution.clone(),
                progress: Mutex::new(None),
                cancel_tx,
            }),
        }
    }

    pub fn activity_id(&self) -> &str {
        &self.inner.activity_id
    }

    pub fn activity_type(&self) -> &ActivityType {
        &self.inner.activity_type
    }

    pub fn workflow_execution(&self) -> &WorkflowExecution {
        &self.inner.workflow_execution
    }

    pub(crate) fn task_token(&self) -> &str {
        &self.inner.task_token
    }

    /// Progress details sent with the next heartbeat
    pub fn record_progress(&self, details: impl Into<String>) {
        *self.inner.progress.lock() = Some(details.into());
    }

    pub fn progress(&self) -> Option<String> {
        self.inner.progress.lock().clone()
    }

    /// Whether a heartbeat has reported a cancellation request
    ///
    /// Cancellation is advisory: an activity that never checks runs to
    /// completion.
    pub fn is_cancel_requested(&self) -> bool {
        *self.inner.cancel_tx.borrow()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.inner.cancel_tx.subscribe();
        // the sender lives as long as `self`, so this only resolves on cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    pub(crate) fn request_cancel(&self) {
        self.inner.cancel_tx.send_replace(true);
    }
}

impl fmt::Debug for ActivityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityContext")
            .field("activity_id", &self.inner.activity_id)
            .field("activity_type", &self.inner.activity_type)
            .field("workflow_execution", &self.inner.workflow_execution)
            .field("cancel_requested", &self.is_cancel_requested())
            .finish()
    }
}

/// One kind of unit of work
///
/// # Example
///
/// ```ignore
/// struct LoadCustomer;
///
/// #[async_trait]
/// impl Activity for LoadCustomer {
///     fn descriptor(&self) -> ActivityDescriptor {
///         ActivityDescriptor::new("loadCustomer", "0.1.0", "migration-activities")
///     }
///
///     async fn execute(
///         &self,
///         ctx: &ActivityContext,
///         input: Option<Value>,
///     ) -> Result<Option<Value>, ActivityError> {
///         ctx.record_progress("50");
///         Ok(Some(json!({"status": 200})))
///     }
/// }
/// ```
#[async_trait]
pub trait Activity: Send + Sync {
    /// Registration descriptor; also sets the heartbeat period
    fn descriptor(&self) -> ActivityDescriptor;

    /// Perform the work for one task
    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: Option<Value>,
    ) -> Result<Option<Value>, ActivityError>;
}

/// Errors from activity registration
#[derive(Debug, thiserror::Error)]
pub enum ActivityRegistryError {
    /// The descriptor left a required field empty
    #[error("activity descriptor requires `{0}`")]
    MissingField(&'static str),

    /// Registering the type with the service failed
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Activities keyed by `name/version`
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an activity, replacing any with the same type
    pub fn register(&mut self, activity: Arc<dyn Activity>) -> Result<(), ActivityRegistryError> {
        let descriptor = activity.descriptor();
        if descriptor.name.trim().is_empty() {
            return Err(ActivityRegistryError::MissingField("name"));
        }
        if descriptor.version.trim().is_empty() {
            return Err(ActivityRegistryError::MissingField("version"));
        }
        if descriptor.task_list_name.trim().is_empty() {
            return Err(ActivityRegistryError::MissingField("taskListName"));
        }

        debug!(activity_type = %descriptor.key(), "Registered activity");
        self.activities.insert(descriptor.key(), activity);
        Ok(())
    }

    pub fn get(&self, activity_type: &ActivityType) -> Option<Arc<dyn Activity>> {
        self.activities.get(&activity_type.key()).cloned()
    }

    pub fn contains(&self, activity_type: &ActivityType) -> bool {
        self.activities.contains_key(&activity_type.key())
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn descriptors(&self) -> Vec<ActivityDescriptor> {
        self.activities.values().map(|a| a.descriptor()).collect()
    }

    /// Register every activity type with the service
    ///
    /// Safe to repeat on every process start.
    pub async fn register_types(&self, client: &WorkflowClient) -> Result<(), ClientError> {
        for descriptor in self.descriptors() {
            client.register_activity_type(&descriptor).await?;
        }
        info!(count = self.activities.len(), "Activity types registered");
        Ok(())
    }
}

impl fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("activity_types", &self.activities.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// Placeholder
// =============================================================================

/// Stand-in activity that waits and then returns a fixed result
///
/// Wakes early and reports cancellation when the heartbeat learns the task
/// was canceled.
#[derive(Debug, Clone)]
pub struct PlaceholderActivity {
    descriptor: ActivityDescriptor,
    duration: Duration,
    result: Option<Value>,
}

impl PlaceholderActivity {
    /// Waits thirty seconds and returns `{"status": 200}`
    pub fn new(descriptor: ActivityDescriptor) -> Self {
        Self {
            descriptor,
            duration: Duration::from_secs(30),
            result: Some(json!({"status": 200})),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_result(mut self, result: Option<Value>) -> Self {
        self.result = result;
        self
    }
}

#[async_trait]
impl Activity for PlaceholderActivity {
    fn descriptor(&self) -> ActivityDescriptor {
        self.descriptor.clone()
    }

    async fn execute(
        &self,
        ctx: &ActivityContext,
        _input: Option<Value>,
    ) -> Result<Option<Value>, ActivityError> {
        ctx.record_progress("0");
        tokio::select! {
            _ = tokio::time::sleep(self.duration) => {
                ctx.record_progress("100");
                Ok(self.result.clone())
            }
            _ = ctx.cancelled() => Err(ActivityError::cancelled(Some(format!(
                "{} canceled before finishing",
                ctx.activity_id()
            )))),
        }
    }
}
