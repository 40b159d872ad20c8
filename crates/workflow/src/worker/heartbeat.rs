//! Heartbeat monitor for a running activity
//!
//! Beats at 45% of the heartbeat timeout so a single missed beat does not
//! time the task out. Each beat sends the activity's recorded progress and
//! learns whether cancellation was requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::activity::ActivityContext;
use crate::client::WorkflowClient;

/// Used when an activity type declares no heartbeat timeout
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

const BEAT_RATIO: f64 = 0.45;

/// Interval between beats for a heartbeat timeout
pub fn heartbeat_interval(heartbeat_timeout: Duration) -> Duration {
    let timeout = if heartbeat_timeout.is_zero() {
        DEFAULT_HEARTBEAT_TIMEOUT
    } else {
        heartbeat_timeout
    };
    timeout.mul_f64(BEAT_RATIO)
}

/// Periodic liveness reporter for one activity task
///
/// The beat loop runs on its own task. `destroy()` must be reached on every
/// exit path of the activity; dropping the monitor destroys it as well.
pub struct HeartbeatMonitor {
    client: WorkflowClient,
    ctx: ActivityContext,
    interval: Duration,
    beating: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    pub fn new(client: WorkflowClient, ctx: ActivityContext, heartbeat_timeout: Duration) -> Self {
        Self {
            client,
            ctx,
            interval: heartbeat_interval(heartbeat_timeout),
            beating: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start beating; the first beat is sent immediately
    pub fn start(&mut self) {
        self.beating.store(true, Ordering::Release);
        if self.handle.is_some() {
            return;
        }

        let client = self.client.clone();
        let ctx = self.ctx.clone();
        let beating = Arc::clone(&self.beating);
        let period = self.interval;

        debug!(
            activity_id = ctx.activity_id(),
            interval_ms = period.as_millis() as u64,
            "Starting heartbeat"
        );

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if beating.load(Ordering::Acquire) {
                    beat(&client, &ctx).await;
                }
            }
        }));
    }

    /// Suspend beats without ending the loop
    pub fn stop(&self) {
        self.beating.store(false, Ordering::Release);
        debug!(activity_id = self.ctx.activity_id(), "Heartbeat stopped");
    }

    /// End the beat loop
    pub fn destroy(&mut self) {
        self.beating.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(activity_id = self.ctx.activity_id(), "Heartbeat destroyed");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn beat(client: &WorkflowClient, ctx: &ActivityContext) {
    let details = ctx.progress().unwrap_or_else(|| "0".to_string());
    trace!(activity_id = ctx.activity_id(), details = %details, "Heartbeat");

    match client
        .record_activity_task_heartbeat(ctx.task_token(), Some(&details))
        .await
    {
        Ok(true) => {
            if !ctx.is_cancel_requested() {
                info!(activity_id = ctx.activity_id(), "Cancellation requested");
            }
            ctx.request_cancel();
        }
        Ok(false) => {}
        Err(e) => {
            warn!(activity_id = ctx.activity_id(), error = %e, "Heartbeat failed");
        }
    }
}
