//! Periodic pollers
//!
//! Every poller is a tokio task ticking at a fixed interval. A tick runs to
//! completion before the next one starts, so a poller never overlaps itself;
//! different pollers of the same host tick independently.
//!
//! Failures are reported through [`UpdateError`]. Transient ones only mark
//! the tick as failed. Fatal ones stop the poller for good and are published
//! once as an [`EntrySignal`].

pub mod command;
pub mod state;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use command::CommandPoller;
pub use state::StatePoller;

/// Outcome of a failed tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum UpdateError {
    /// The tick failed; polling continues
    Failed(String),
    /// The host configuration needs user correction; polling stops
    ConfigEntryError(String),
    /// The credentials were rejected; polling stops
    AuthFailed(String),
}

impl UpdateError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, UpdateError::Failed(_))
    }

    fn message(&self) -> &str {
        match self {
            UpdateError::Failed(msg)
            | UpdateError::ConfigEntryError(msg)
            | UpdateError::AuthFailed(msg) => msg,
        }
    }
}

/// Fatal failure reported to the owner of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySignal {
    ConfigEntryError {
        entry_id: String,
        poller: String,
        message: String,
    },
    AuthFailed {
        entry_id: String,
        poller: String,
        message: String,
    },
}

impl EntrySignal {
    pub fn entry_id(&self) -> &str {
        match self {
            EntrySignal::ConfigEntryError { entry_id, .. }
            | EntrySignal::AuthFailed { entry_id, .. } => entry_id,
        }
    }
}

/// Last known state of a poller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollerStatus {
    /// Completed ticks, failed ones included
    pub ticks: u64,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    /// The poller will not tick again
    pub stopped: bool,
    /// Failure that stopped the poller for good
    pub fatal: Option<UpdateError>,
}

/// Work done on every tick of a poller
#[async_trait]
pub trait Refresh: Send + Sync + 'static {
    /// Diagnostic name, also used in logs
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    async fn refresh(&self) -> Result<(), UpdateError>;
}

/// Handle to a running poller task
pub struct PollerHandle {
    name: String,
    status: watch::Receiver<PollerStatus>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current status
    pub fn status(&self) -> PollerStatus {
        self.status.borrow().clone()
    }

    /// Receiver following status changes
    pub fn subscribe(&self) -> watch::Receiver<PollerStatus> {
        self.status.clone()
    }

    /// Stop ticking; calling it again has no effect
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until at least `ticks` ticks completed or the poller stopped
    pub async fn wait_for_ticks(&self, ticks: u64) {
        let mut status = self.status.clone();
        let _ = status
            .wait_for(|status| status.ticks >= ticks || status.stopped)
            .await;
    }

    /// Stop the poller and wait for its task to end
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Poller {} ended abnormally: {}", self.name, e);
        }
    }
}

impl std::fmt::Debug for PollerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerHandle")
            .field("name", &self.name)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

/// Spawn a poller task
///
/// The first tick runs immediately. `cancel` stops the task; a fatal
/// failure stops it as well and publishes one signal for `entry_id`.
pub fn spawn_poller<R: Refresh>(
    refresher: R,
    entry_id: impl Into<String>,
    signals: mpsc::UnboundedSender<EntrySignal>,
    cancel: CancellationToken,
) -> PollerHandle {
    let entry_id = entry_id.into();
    let name = refresher.name().to_string();
    let (status_tx, status_rx) = watch::channel(PollerStatus::default());
    let task_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        let interval = refresher.interval();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Poller {} started, interval: {}s",
            refresher.name(),
            interval.as_secs()
        );

        loop {
            tokio::select! {
                biased;
                _ = task_cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = task_cancel.cancelled() => break,
                result = refresher.refresh() => result,
            };

            let was_success = {
                let status = status_tx.borrow();
                status.last_update_success || status.ticks == 0
            };
            match result {
                Ok(()) => {
                    if !was_success {
                        info!("Poller {} recovered", refresher.name());
                    }
                    debug!("Poller {} tick done", refresher.name());
                    status_tx.send_modify(|status| {
                        status.ticks += 1;
                        status.last_update_success = true;
                        status.last_error = None;
                    });
                }
                Err(UpdateError::Failed(message)) => {
                    if was_success {
                        error!("Error fetching {} data: {}", refresher.name(), message);
                    } else {
                        debug!("Error fetching {} data: {}", refresher.name(), message);
                    }
                    status_tx.send_modify(|status| {
                        status.ticks += 1;
                        status.last_update_success = false;
                        status.last_error = Some(message);
                    });
                }
                Err(fatal) => {
                    error!(
                        "Poller {} stopped: {}",
                        refresher.name(),
                        fatal.message()
                    );
                    let signal = match &fatal {
                        UpdateError::AuthFailed(message) => EntrySignal::AuthFailed {
                            entry_id: entry_id.clone(),
                            poller: refresher.name().to_string(),
                            message: message.clone(),
                        },
                        _ => EntrySignal::ConfigEntryError {
                            entry_id: entry_id.clone(),
                            poller: refresher.name().to_string(),
                            message: fatal.message().to_string(),
                        },
                    };
                    status_tx.send_modify(|status| {
                        status.ticks += 1;
                        status.last_update_success = false;
                        status.last_error = Some(fatal.message().to_string());
                        status.stopped = true;
                        status.fatal = Some(fatal.clone());
                    });
                    let _ = signals.send(signal);
                    task_cancel.cancel();
                    break;
                }
            }
        }

        status_tx.send_if_modified(|status| !std::mem::replace(&mut status.stopped, true));
        debug!("Poller {} exited", refresher.name());
    });

    PollerHandle {
        name,
        status: status_rx,
        cancel,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        calls: Arc<AtomicUsize>,
        results: Mutex<VecDeque<Result<(), UpdateError>>>,
    }

    #[async_trait]
    impl Refresh for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(10)
        }

        async fn refresh(&self) -> Result<(), UpdateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.lock().pop_front().unwrap_or(Ok(()))
        }
    }

    fn scripted(results: Vec<Result<(), UpdateError>>) -> (Scripted, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let refresher = Scripted {
            calls: Arc::clone(&calls),
            results: Mutex::new(results.into()),
        };
        (refresher, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_is_immediate() {
        let (refresher, calls) = scripted(vec![]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = spawn_poller(refresher, "entry", tx, CancellationToken::new());

        handle.wait_for_ticks(1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.status().last_update_success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_keeps_polling() {
        let (refresher, calls) = scripted(vec![Err(UpdateError::Failed("boom".into()))]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_poller(refresher, "entry", tx, CancellationToken::new());

        handle.wait_for_ticks(1).await;
        let status = handle.status();
        assert!(!status.last_update_success);
        assert_eq!(status.last_error.as_deref(), Some("boom"));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(handle.status().last_update_success);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failure_stops_and_signals_once() {
        let (refresher, calls) = scripted(vec![Err(UpdateError::AuthFailed("denied".into()))]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_poller(refresher, "entry", tx, CancellationToken::new());

        let signal = rx.recv().await.unwrap();
        assert_eq!(
            signal,
            EntrySignal::AuthFailed {
                entry_id: "entry".into(),
                poller: "scripted".into(),
                message: "denied".into(),
            }
        );

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(rx.recv().await.is_none());
        let status = handle.status();
        assert!(status.stopped);
        assert_eq!(status.fatal, Some(UpdateError::AuthFailed("denied".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let (refresher, calls) = scripted(vec![]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = spawn_poller(refresher, "entry", tx, CancellationToken::new());
        handle.wait_for_ticks(1).await;

        handle.stop();
        handle.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.status().stopped);
        handle.shutdown().await;
    }

    #[test]
    fn test_update_error_is_fatal() {
        assert!(!UpdateError::Failed("x".into()).is_fatal());
        assert!(UpdateError::ConfigEntryError("x".into()).is_fatal());
        assert!(UpdateError::AuthFailed("x".into()).is_fatal());
    }
}
