//! Admission control for activity polling
//!
//! Decides before every activity poll whether this process should take on
//! more work. Two independent gates:
//! - resource pressure: free memory and load average per CPU against
//!   configured thresholds, sampled through a [`ResourceProbe`]
//! - an optional hard cap on running activities, with high/low watermark
//!   hysteresis so the poller does not oscillate around the limit

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

const MIB: u64 = 1024 * 1024;

/// Admission configuration
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use migrate_workflow::worker::AdmissionConfig;
///
/// let config = AdmissionConfig::default()
///     .with_min_free_memory_mb(512)
///     .with_max_load_per_cpu(1.5)
///     .with_max_concurrent(8)
///     .with_throttle_interval(Duration::from_secs(2));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdmissionConfig {
    /// Refuse work when less memory than this is available
    pub min_free_memory_mb: u64,

    /// Refuse work when the one-minute load average per CPU exceeds this
    pub max_load_per_cpu: f64,

    /// How long to wait before checking again after refusing
    #[serde(with = "super::duration_millis")]
    pub throttle_interval: Duration,

    /// Hard cap on concurrently running activities (unbounded when absent)
    pub max_concurrent: Option<usize>,

    /// Stop admitting when running / max_concurrent reaches this ratio
    pub high_watermark: f64,

    /// Resume admitting when running / max_concurrent drops to this ratio
    pub low_watermark: f64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_free_memory_mb: 256,
            max_load_per_cpu: 2.0,
            throttle_interval: Duration::from_secs(1),
            max_concurrent: None,
            high_watermark: 1.0,
            low_watermark: 0.7,
        }
    }
}

impl AdmissionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_free_memory_mb(mut self, mb: u64) -> Self {
        self.min_free_memory_mb = mb;
        self
    }

    pub fn with_max_load_per_cpu(mut self, load: f64) -> Self {
        self.max_load_per_cpu = load;
        self
    }

    pub fn with_throttle_interval(mut self, interval: Duration) -> Self {
        self.throttle_interval = interval;
        self
    }

    /// Cap concurrently running activities
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = Some(max.max(1));
        self
    }

    pub fn with_high_watermark(mut self, watermark: f64) -> Self {
        self.high_watermark = watermark.clamp(0.0, 1.0);
        self
    }

    pub fn with_low_watermark(mut self, watermark: f64) -> Self {
        self.low_watermark = watermark.clamp(0.0, 1.0);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AdmissionError> {
        if self.low_watermark >= self.high_watermark {
            return Err(AdmissionError::InvalidConfig(
                "low_watermark must be less than high_watermark".into(),
            ));
        }
        if self.max_load_per_cpu.is_nan() || self.max_load_per_cpu <= 0.0 {
            return Err(AdmissionError::InvalidConfig(
                "max_load_per_cpu must be positive".into(),
            ));
        }
        if self.throttle_interval.is_zero() {
            return Err(AdmissionError::InvalidConfig(
                "throttle_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Admission-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdmissionError {
    /// Invalid configuration
    #[error("invalid admission configuration: {0}")]
    InvalidConfig(String),
}

// =============================================================================
// Resource probes
// =============================================================================

/// Point-in-time resource reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub available_memory_bytes: u64,
    /// One-minute load average divided by the number of CPUs
    pub load_per_cpu: f64,
}

/// Source of resource readings
pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> ResourceSample;
}

/// Reads the host's memory and load average
pub struct SystemProbe {
    system: Mutex<System>,
    cpus: usize,
}

impl SystemProbe {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()),
        );
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            system: Mutex::new(system),
            cpus,
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn sample(&self) -> ResourceSample {
        let available_memory_bytes = {
            let mut system = self.system.lock();
            system.refresh_memory();
            system.available_memory()
        };

        // zero on platforms without a load average
        let load = System::load_average().one;

        ResourceSample {
            available_memory_bytes,
            load_per_cpu: load / self.cpus.max(1) as f64,
        }
    }
}

// =============================================================================
// Admission state
// =============================================================================

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admit,
    /// Skip this poll and wait for the throttle interval
    Throttle(String),
}

impl Admission {
    pub fn is_admit(&self) -> bool {
        matches!(self, Admission::Admit)
    }
}

/// Admission state for one activity poller
///
/// Running-activity accounting uses atomics; only the refusal reason is
/// behind a lock.
pub struct AdmissionState {
    config: AdmissionConfig,
    probe: Arc<dyn ResourceProbe>,
    running: AtomicUsize,
    accepting: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl AdmissionState {
    pub fn new(config: AdmissionConfig, probe: Arc<dyn ResourceProbe>) -> Self {
        Self {
            config,
            probe,
            running: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
            reason: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn throttle_interval(&self) -> Duration {
        self.config.throttle_interval
    }

    /// Check both gates before polling
    pub fn check(&self) -> Admission {
        if !self.below_cap() {
            return self.refuse(format!(
                "{} running activities at capacity",
                self.running()
            ));
        }

        let sample = self.probe.sample();
        let min_free = self.config.min_free_memory_mb.saturating_mul(MIB);
        if sample.available_memory_bytes < min_free {
            return self.refuse(format!(
                "available memory {}MB below {}MB",
                sample.available_memory_bytes / MIB,
                self.config.min_free_memory_mb
            ));
        }
        if sample.load_per_cpu > self.config.max_load_per_cpu {
            return self.refuse(format!(
                "load per cpu {:.2} above {:.2}",
                sample.load_per_cpu, self.config.max_load_per_cpu
            ));
        }

        *self.reason.write() = None;
        Admission::Admit
    }

    /// Cap check with hysteresis; always true without a cap
    fn below_cap(&self) -> bool {
        let Some(max) = self.config.max_concurrent else {
            return true;
        };
        let ratio = self.running() as f64 / max.max(1) as f64;

        if self.accepting.load(Ordering::Relaxed) {
            if ratio >= self.config.high_watermark {
                self.accepting.store(false, Ordering::Relaxed);
                return false;
            }
            true
        } else {
            if ratio <= self.config.low_watermark {
                self.accepting.store(true, Ordering::Relaxed);
                return true;
            }
            false
        }
    }

    fn refuse(&self, reason: String) -> Admission {
        *self.reason.write() = Some(reason.clone());
        Admission::Throttle(reason)
    }

    /// Reason for the most recent refusal, cleared on the next admit
    pub fn throttle_reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::Relaxed)
    }

    /// Record a started activity; the returned guard records its end
    pub fn activity_started(self: &Arc<Self>) -> RunningGuard {
        self.running.fetch_add(1, Ordering::Relaxed);
        RunningGuard {
            state: Arc::clone(self),
        }
    }
}

/// Decrements the running count when dropped
pub struct RunningGuard {
    state: Arc<AdmissionState>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.state.running.fetch_sub(1, Ordering::Relaxed);
    }
}
