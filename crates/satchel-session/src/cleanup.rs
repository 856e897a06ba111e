//! Periodic removal of expired sessions.
//!
//! Storage only drops expired records when [`SessionManager::clean`] runs.
//! The task here calls it on a fixed interval from a Tokio runtime.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::manager::SessionManager;

/// Handle to a running cleanup task. Dropping it stops the task.
#[derive(Debug)]
pub struct CleanupHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Ask the task to stop after its current pass.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        let _ = (&mut self.task).await;
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Run [`SessionManager::clean`] every `interval` until the handle is stopped.
///
/// Each pass runs on the blocking pool, since adapters may do file I/O.
/// Failures are logged and the loop keeps going. Must be called from within
/// a Tokio runtime.
///
/// # Errors
///
/// Returns [`Error::Config`] if `interval` is zero.
pub fn spawn_cleanup_task(manager: SessionManager, interval: Duration) -> Result<CleanupHandle> {
    if interval.is_zero() {
        return Err(Error::Config(
            "cleanup interval must be greater than 0".into(),
        ));
    }

    let token = CancellationToken::new();
    let cancelled = token.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(interval_ms = interval.as_millis() as u64, "Session cleanup task started");

        loop {
            tokio::select! {
                _ = cancelled.cancelled() => break,
                _ = ticker.tick() => {
                    let pass = manager.clone();
                    match tokio::task::spawn_blocking(move || pass.clean()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(error = %e, "Session cleanup failed"),
                        Err(e) => warn!(error = %e, "Session cleanup pass panicked"),
                    }
                }
            }
        }

        debug!("Session cleanup task stopped");
    });

    Ok(CleanupHandle { token, task })
}

/// Spawn the cleanup task if `config` enables it.
///
/// # Errors
///
/// Returns [`Error::Config`] if `config` fails validation.
pub fn spawn_configured_cleanup(
    manager: &SessionManager,
    config: &SessionConfig,
) -> Result<Option<CleanupHandle>> {
    if !config.enable_cleanup_task {
        return Ok(None);
    }
    config.validate()?;
    spawn_cleanup_task(manager.clone(), config.cleanup_interval()).map(Some)
}
