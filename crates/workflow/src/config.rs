// Engine configuration
//
// Settings for a migration worker process, loaded from environment variables.

use std::env;
use std::time::Duration;

use crate::client::ClientConfig;
use crate::decider::{DEFAULT_ACTIVITY_VERSION, WORKFLOW_NAME};
use crate::worker::{
    ActivityPollerConfig, AdmissionConfig, AdmissionError, DecisionPollerConfig,
};
use crate::workflow::{TaskList, WorkflowType, WorkflowTypeOptions};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required value is empty
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// A numeric value is out of range
    #[error("{name} is out of range: {detail}")]
    OutOfRange { name: &'static str, detail: String },

    /// Admission thresholds are inconsistent
    #[error(transparent)]
    Admission(#[from] AdmissionError),
}

/// Configuration for a worker process
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Service endpoint; the in-memory service is used when unset
    pub endpoint: Option<String>,

    pub domain: String,

    /// Identity reported when polling
    pub identity: Option<String>,

    pub workflow_name: String,
    pub workflow_version: String,
    pub activity_version: String,

    pub decision_task_list: String,
    pub activity_task_list: String,

    /// Decision tasks processed concurrently
    pub decider_pool_size: usize,

    /// Hard cap on running activities
    pub max_concurrent_activities: Option<usize>,

    /// Free memory below which activity polling pauses
    pub min_free_memory_mb: u64,

    /// One-minute load average per CPU above which activity polling pauses
    pub max_load_per_cpu: f64,

    /// Pause between admission checks while throttled
    pub throttle_interval: Duration,

    /// How long shutdown waits for in-flight work
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            domain: "migrate".to_string(),
            identity: None,
            workflow_name: WORKFLOW_NAME.to_string(),
            workflow_version: "1.0".to_string(),
            activity_version: DEFAULT_ACTIVITY_VERSION.to_string(),
            decision_task_list: "migration-decisions".to_string(),
            activity_task_list: "migration-activities".to_string(),
            decider_pool_size: 4,
            max_concurrent_activities: None,
            min_free_memory_mb: 256,
            max_load_per_cpu: 2.0,
            throttle_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(90),
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SWF_ENDPOINT`: Workflow service endpoint (default: in-memory service)
    /// - `SWF_DOMAIN`: Domain for every request (default: migrate)
    /// - `SWF_IDENTITY`: Identity reported when polling (default: generated)
    /// - `WORKFLOW_NAME`: Workflow type name (default: accountMigration)
    /// - `WORKFLOW_VERSION`: Workflow type version (default: 1.0)
    /// - `ACTIVITY_VERSION`: Version of the step activity types (default: 0.1.0)
    /// - `DECISION_TASK_LIST`: Decision task list (default: migration-decisions)
    /// - `ACTIVITY_TASK_LIST`: Activity task list (default: migration-activities)
    /// - `DECIDER_POOL_SIZE`: Concurrent decision tasks (default: 4)
    /// - `MAX_CONCURRENT_ACTIVITIES`: Hard cap on running activities (default: none)
    /// - `ADMISSION_MIN_FREE_MEMORY_MB`: Free memory floor (default: 256)
    /// - `ADMISSION_MAX_LOAD_PER_CPU`: Load ceiling per CPU (default: 2.0)
    /// - `ADMISSION_THROTTLE_INTERVAL_MS`: Pause while throttled (default: 1000)
    /// - `SHUTDOWN_TIMEOUT_SECS`: Drain timeout on shutdown (default: 90)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |name: &str, default: String| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        Self {
            endpoint: lookup("SWF_ENDPOINT").filter(|v| !v.is_empty()),
            domain: string("SWF_DOMAIN", defaults.domain),
            identity: lookup("SWF_IDENTITY").filter(|v| !v.is_empty()),
            workflow_name: string("WORKFLOW_NAME", defaults.workflow_name),
            workflow_version: string("WORKFLOW_VERSION", defaults.workflow_version),
            activity_version: string("ACTIVITY_VERSION", defaults.activity_version),
            decision_task_list: string("DECISION_TASK_LIST", defaults.decision_task_list),
            activity_task_list: string("ACTIVITY_TASK_LIST", defaults.activity_task_list),
            decider_pool_size: lookup("DECIDER_POOL_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.decider_pool_size),
            max_concurrent_activities: lookup("MAX_CONCURRENT_ACTIVITIES")
                .and_then(|s| s.parse().ok()),
            min_free_memory_mb: lookup("ADMISSION_MIN_FREE_MEMORY_MB")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_free_memory_mb),
            max_load_per_cpu: lookup("ADMISSION_MAX_LOAD_PER_CPU")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_load_per_cpu),
            throttle_interval: lookup("ADMISSION_THROTTLE_INTERVAL_MS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.throttle_interval),
            shutdown_timeout: lookup("SHUTDOWN_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_workflow_version(mut self, version: impl Into<String>) -> Self {
        self.workflow_version = version.into();
        self
    }

    pub fn with_task_lists(
        mut self,
        decisions: impl Into<String>,
        activities: impl Into<String>,
    ) -> Self {
        self.decision_task_list = decisions.into();
        self.activity_task_list = activities.into();
        self
    }

    pub fn with_decider_pool_size(mut self, size: usize) -> Self {
        self.decider_pool_size = size;
        self
    }

    pub fn with_max_concurrent_activities(mut self, max: usize) -> Self {
        self.max_concurrent_activities = Some(max);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("domain", &self.domain),
            ("workflow_name", &self.workflow_name),
            ("workflow_version", &self.workflow_version),
            ("activity_version", &self.activity_version),
            ("decision_task_list", &self.decision_task_list),
            ("activity_task_list", &self.activity_task_list),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(name));
            }
        }

        if self.decider_pool_size == 0 {
            return Err(ConfigError::OutOfRange {
                name: "decider_pool_size",
                detail: "must be at least 1".into(),
            });
        }
        if self.max_concurrent_activities == Some(0) {
            return Err(ConfigError::OutOfRange {
                name: "max_concurrent_activities",
                detail: "must be at least 1 when set".into(),
            });
        }
        if self.shutdown_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                name: "shutdown_timeout",
                detail: "must be non-zero".into(),
            });
        }

        self.admission_config().validate()?;
        Ok(())
    }

    pub fn workflow_type(&self) -> WorkflowType {
        WorkflowType::new(&self.workflow_name, &self.workflow_version)
    }

    /// Registration options; decisions default to the decision task list
    pub fn workflow_type_options(&self) -> WorkflowTypeOptions {
        WorkflowTypeOptions::new(self.workflow_type())
            .with_default_task_list(TaskList::new(&self.decision_task_list))
    }

    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(&self.domain);
        match &self.identity {
            Some(identity) => config.with_identity(identity),
            None => config,
        }
    }

    pub fn decision_poller_config(&self) -> DecisionPollerConfig {
        DecisionPollerConfig::new(TaskList::new(&self.decision_task_list))
            .with_pool_size(self.decider_pool_size)
            .with_shutdown_timeout(self.shutdown_timeout)
    }

    pub fn admission_config(&self) -> AdmissionConfig {
        let config = AdmissionConfig::new()
            .with_min_free_memory_mb(self.min_free_memory_mb)
            .with_max_load_per_cpu(self.max_load_per_cpu)
            .with_throttle_interval(self.throttle_interval);
        match self.max_concurrent_activities {
            Some(max) => config.with_max_concurrent(max),
            None => config,
        }
    }

    pub fn activity_poller_config(&self) -> ActivityPollerConfig {
        ActivityPollerConfig::new(TaskList::new(&self.activity_task_list))
            .with_admission(self.admission_config())
            .with_shutdown_timeout(self.shutdown_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> EngineConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = from_vars(&[]);
        assert!(config.endpoint.is_none());
        assert_eq!(config.domain, "migrate");
        assert_eq!(config.workflow_name, "accountMigration");
        assert_eq!(config.activity_version, "0.1.0");
        assert_eq!(config.decider_pool_size, 4);
        assert_eq!(config.throttle_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reads_variables() {
        let config = from_vars(&[
            ("SWF_ENDPOINT", "http://localhost:8080"),
            ("SWF_DOMAIN", "staging"),
            ("SWF_IDENTITY", "worker-7"),
            ("WORKFLOW_VERSION", "2.0"),
            ("DECISION_TASK_LIST", "d"),
            ("ACTIVITY_TASK_LIST", "a"),
            ("DECIDER_POOL_SIZE", "8"),
            ("MAX_CONCURRENT_ACTIVITIES", "16"),
            ("ADMISSION_MIN_FREE_MEMORY_MB", "512"),
            ("ADMISSION_MAX_LOAD_PER_CPU", "1.5"),
            ("ADMISSION_THROTTLE_INTERVAL_MS", "250"),
            ("SHUTDOWN_TIMEOUT_SECS", "30"),
        ]);

        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.workflow_type().key(), "accountMigration/2.0");

        let client = config.client_config();
        assert_eq!(client.domain, "staging");
        assert_eq!(client.identity, "worker-7");

        let decisions = config.decision_poller_config();
        assert_eq!(decisions.task_list.name, "d");
        assert_eq!(decisions.pool_size, 8);
        assert_eq!(decisions.shutdown_timeout, Duration::from_secs(30));

        let activities = config.activity_poller_config();
        assert_eq!(activities.task_list.name, "a");
        assert_eq!(activities.admission.min_free_memory_mb, 512);
        assert_eq!(activities.admission.max_load_per_cpu, 1.5);
        assert_eq!(activities.admission.max_concurrent, Some(16));
        assert_eq!(
            activities.admission.throttle_interval,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = from_vars(&[("DECIDER_POOL_SIZE", "many"), ("SWF_DOMAIN", "")]);
        assert_eq!(config.decider_pool_size, 4);
        assert_eq!(config.domain, "migrate");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = EngineConfig::default().with_decider_pool_size(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "decider_pool_size", .. })
        ));

        let config = EngineConfig::default().with_domain("  ");
        assert!(matches!(config.validate(), Err(ConfigError::Empty("domain"))));

        let mut config = EngineConfig::default();
        config.max_load_per_cpu = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Admission(_))));
    }

    #[test]
    fn test_workflow_type_options_use_decision_task_list() {
        let config = EngineConfig::default().with_task_lists("decide", "work");
        let options = config.workflow_type_options();
        assert_eq!(
            options.default_task_list.map(|t| t.name),
            Some("decide".to_string())
        );
    }
}
