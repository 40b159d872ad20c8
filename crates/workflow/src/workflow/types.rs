//! Identifiers shared by the decider and worker sides

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A registered workflow type
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowType {
    pub name: String,
    pub version: String,
}

impl WorkflowType {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Registry key in the form `name/version`
    pub fn key(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// A registered activity type
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityType {
    pub name: String,
    pub version: String,
}

impl ActivityType {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Registry key in the form `name/version`
    pub fn key(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// Named queue polled by deciders or workers
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskList {
    pub name: String,
}

impl TaskList {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl From<&str> for TaskList {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for TaskList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One run of a workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub run_id: String,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

impl fmt::Display for WorkflowExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workflow_id, self.run_id)
    }
}

/// How child executions are handled when their parent closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChildPolicy {
    Terminate,
    RequestCancel,
    Abandon,
}

impl ChildPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildPolicy::Terminate => "TERMINATE",
            ChildPolicy::RequestCancel => "REQUEST_CANCEL",
            ChildPolicy::Abandon => "ABANDON",
        }
    }
}

/// Registration options for a workflow type
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use migrate_workflow::workflow::{TaskList, WorkflowType, WorkflowTypeOptions};
///
/// let options = WorkflowTypeOptions::new(WorkflowType::new("migration", "1.0"))
///     .with_default_task_list(TaskList::new("migration-decisions"))
///     .with_execution_timeout(Duration::from_secs(86_400));
/// assert_eq!(options.workflow_type.key(), "migration/1.0");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTypeOptions {
    pub workflow_type: WorkflowType,
    pub description: Option<String>,
    pub default_task_list: Option<TaskList>,
    pub default_execution_start_to_close_timeout: Option<Duration>,
    pub default_task_start_to_close_timeout: Option<Duration>,
    pub default_child_policy: Option<ChildPolicy>,
}

impl WorkflowTypeOptions {
    pub fn new(workflow_type: WorkflowType) -> Self {
        Self {
            workflow_type,
            description: None,
            default_task_list: None,
            default_execution_start_to_close_timeout: Some(Duration::from_secs(86_400)),
            default_task_start_to_close_timeout: Some(Duration::from_secs(60)),
            default_child_policy: Some(ChildPolicy::Terminate),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default_task_list(mut self, task_list: TaskList) -> Self {
        self.default_task_list = Some(task_list);
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.default_execution_start_to_close_timeout = Some(timeout);
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.default_task_start_to_close_timeout = Some(timeout);
        self
    }

    pub fn with_child_policy(mut self, policy: ChildPolicy) -> Self {
        self.default_child_policy = Some(policy);
        self
    }
}

/// Registration descriptor an activity implementation provides to its poller
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityDescriptor {
    pub name: String,
    pub version: String,
    pub task_list_name: String,
    pub description: Option<String>,
    pub default_task_heartbeat_timeout: Duration,
    pub default_task_schedule_to_close_timeout: Duration,
    pub default_task_schedule_to_start_timeout: Duration,
    pub default_task_start_to_close_timeout: Duration,
}

impl ActivityDescriptor {
    /// Create a descriptor with the default timeouts
    ///
    /// Heartbeat defaults to two minutes, which gives a heartbeat period of 54s.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        task_list_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            task_list_name: task_list_name.into(),
            description: None,
            default_task_heartbeat_timeout: Duration::from_secs(120),
            default_task_schedule_to_close_timeout: Duration::from_secs(3_600),
            default_task_schedule_to_start_timeout: Duration::from_secs(600),
            default_task_start_to_close_timeout: Duration::from_secs(3_000),
        }
    }

    pub fn activity_type(&self) -> ActivityType {
        ActivityType::new(&self.name, &self.version)
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.default_task_heartbeat_timeout = timeout;
        self
    }

    pub fn with_schedule_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.default_task_schedule_to_close_timeout = timeout;
        self
    }

    pub fn with_schedule_to_start_timeout(mut self, timeout: Duration) -> Self {
        self.default_task_schedule_to_start_timeout = timeout;
        self
    }

    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.default_task_start_to_close_timeout = timeout;
        self
    }
}
