//! Poller lifecycle shared by decision and activity pollers
//!
//! A poller loop runs on its own tokio task. `stop()` pauses polling without
//! tearing the loop down, `start()` resumes it, and `shutdown()` ends the loop
//! and waits for in-flight work to drain.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::decider::{DeciderError, RegistryError};
use crate::workflow::TaskList;

/// Poller status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerStatus {
    /// Constructed, loop not spawned yet
    Idle,
    /// Polling
    Running,
    /// Loop alive but not polling
    Paused,
    /// Shut down; cannot be restarted
    Stopped,
}

/// Poller errors
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    /// Protocol client error
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Decider failed while replaying or deciding
    #[error("decider error: {0}")]
    Decider(#[from] DeciderError),

    /// No decider for the task's workflow type
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A spawned task panicked
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Poller was already shut down
    #[error("poller has been shut down")]
    ShutDown,

    /// In-flight work did not drain in time
    #[error("graceful shutdown timed out")]
    ShutdownTimeout,
}

/// Capability shared by every poller
///
/// # Example
///
/// ```ignore
/// let poller: Arc<dyn Poller> = Arc::new(DecisionTaskPoller::new(client, registry, config));
/// poller.start()?;
/// poller.stop();
/// poller.shutdown().await?;
/// ```
#[async_trait]
pub trait Poller: Send + Sync {
    /// Task list this poller long-polls
    fn task_list(&self) -> &TaskList;

    /// Spawn the poll loop, or resume it after `stop()`
    fn start(&self) -> Result<(), PollerError>;

    /// Pause polling; in-flight work keeps running
    fn stop(&self);

    /// End the loop and wait for in-flight work to finish
    async fn shutdown(&self) -> Result<(), PollerError>;

    fn status(&self) -> PollerStatus;
}

// =============================================================================
// Loop control
// =============================================================================

/// Signals observed by a running poll loop
#[derive(Debug, Clone)]
pub(crate) struct LoopSignals {
    shutdown: watch::Receiver<bool>,
    paused: watch::Receiver<bool>,
}

impl LoopSignals {
    pub(crate) fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Wait until polling is allowed; `false` means shut down
    pub(crate) async fn ready(&mut self) -> bool {
        loop {
            if self.is_shutdown() {
                return false;
            }
            if !*self.paused.borrow_and_update() {
                return true;
            }
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                changed = self.paused.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    /// Resolves once shutdown has been requested
    pub(crate) async fn shutdown_requested(&mut self) {
        // a dropped sender also means shut down
        let _ = self.shutdown.wait_for(|shutdown| *shutdown).await;
    }

    /// Sleep unless shut down first; returns whether shutdown was requested
    pub(crate) async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_shutdown(),
            changed = self.shutdown.changed() => changed.is_err() || self.is_shutdown(),
        }
    }
}

/// Status, signals and loop handle owned by a poller
pub(crate) struct PollerControl {
    name: &'static str,
    task_list: TaskList,
    status: RwLock<PollerStatus>,
    shutdown_tx: watch::Sender<bool>,
    paused_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollerControl {
    pub(crate) fn new(name: &'static str, task_list: TaskList) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (paused_tx, _) = watch::channel(false);
        Self {
            name,
            task_list,
            status: RwLock::new(PollerStatus::Idle),
            shutdown_tx,
            paused_tx,
            handle: Mutex::new(None),
        }
    }

    pub(crate) fn task_list(&self) -> &TaskList {
        &self.task_list
    }

    pub(crate) fn status(&self) -> PollerStatus {
        *self.status.read()
    }

    pub(crate) fn signals(&self) -> LoopSignals {
        LoopSignals {
            shutdown: self.shutdown_tx.subscribe(),
            paused: self.paused_tx.subscribe(),
        }
    }

    /// Spawn the loop on first start, otherwise resume
    pub(crate) fn start<F>(&self, spawn: F) -> Result<(), PollerError>
    where
        F: FnOnce(LoopSignals) -> JoinHandle<()>,
    {
        let mut status = self.status.write();
        match *status {
            PollerStatus::Stopped => return Err(PollerError::ShutDown),
            PollerStatus::Running => return Ok(()),
            PollerStatus::Idle => {
                *self.handle.lock() = Some(spawn(self.signals()));
            }
            PollerStatus::Paused => {}
        }
        self.paused_tx.send_replace(false);
        *status = PollerStatus::Running;
        debug!(poller = self.name, task_list = %self.task_list, "Polling");
        Ok(())
    }

    pub(crate) fn stop(&self) {
        let mut status = self.status.write();
        if matches!(*status, PollerStatus::Running | PollerStatus::Idle) {
            self.paused_tx.send_replace(true);
            if *status == PollerStatus::Running {
                *status = PollerStatus::Paused;
            }
            debug!(poller = self.name, task_list = %self.task_list, "Polling paused");
        }
    }

    /// Signal shutdown and wait for the loop to exit
    ///
    /// The loop drains its own in-flight work before exiting; past the
    /// timeout the loop and its work are aborted.
    pub(crate) async fn shutdown(&self, timeout: Duration) -> Result<(), PollerError> {
        {
            let mut status = self.status.write();
            if *status == PollerStatus::Stopped {
                return Ok(());
            }
            *status = PollerStatus::Stopped;
        }
        self.shutdown_tx.send_replace(true);

        let handle = self.handle.lock().take();
        let Some(mut handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                debug!(poller = self.name, task_list = %self.task_list, "Poller stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(PollerError::Panicked(e.to_string())),
            Err(_) => {
                warn!(
                    poller = self.name,
                    task_list = %self.task_list,
                    timeout_ms = timeout.as_millis() as u64,
                    "Shutdown timeout reached, aborting in-flight work"
                );
                handle.abort();
                Err(PollerError::ShutdownTimeout)
            }
        }
    }
}

impl Drop for PollerControl {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_loop(counter: Arc<AtomicUsize>) -> impl FnOnce(LoopSignals) -> JoinHandle<()> {
        move |mut signals| {
            tokio::spawn(async move {
                while signals.ready().await {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if signals.sleep(Duration::from_millis(5)).await {
                        break;
                    }
                }
            })
        }
    }

    #[tokio::test]
    async fn test_start_stop_resume_shutdown() {
        let control = PollerControl::new("test", TaskList::new("work"));
        let counter = Arc::new(AtomicUsize::new(0));
        assert_eq!(control.status(), PollerStatus::Idle);

        control.start(counting_loop(counter.clone())).unwrap();
        assert_eq!(control.status(), PollerStatus::Running);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(counter.load(Ordering::SeqCst) > 0);

        control.stop();
        assert_eq!(control.status(), PollerStatus::Paused);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let paused_at = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), paused_at);

        // resuming does not spawn a second loop
        control
            .start(|_| panic!("loop already spawned"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(counter.load(Ordering::SeqCst) > paused_at);

        control.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(control.status(), PollerStatus::Stopped);
        assert!(matches!(
            control.start(counting_loop(counter)),
            Err(PollerError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let control = PollerControl::new("test", TaskList::new("work"));
        control.shutdown(Duration::from_millis(10)).await.unwrap();
        assert_eq!(control.status(), PollerStatus::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_timeout() {
        let control = PollerControl::new("test", TaskList::new("work"));
        control
            .start(|_| {
                tokio::spawn(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                })
            })
            .unwrap();

        let err = control
            .shutdown(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, PollerError::ShutdownTimeout));
    }
}
