//! State Poller
//!
//! Keeps a host's connection and static sensors current by calling
//! [`Manager::update_state`] on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Refresh, UpdateError};
use crate::error::FailureClass;
use crate::manager::Manager;

/// Default State Poller interval in seconds
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 30;

pub struct StatePoller {
    manager: Arc<dyn Manager>,
    name: String,
    interval: Duration,
}

impl StatePoller {
    pub fn new(manager: Arc<dyn Manager>, interval: Duration) -> Self {
        Self {
            name: format!("{} state", manager.name()),
            manager,
            interval,
        }
    }
}

#[async_trait]
impl Refresh for StatePoller {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn refresh(&self) -> Result<(), UpdateError> {
        let Err(e) = self.manager.update_state().await else {
            return Ok(());
        };
        Err(match e.class() {
            FailureClass::ConfigFatal => UpdateError::ConfigEntryError(e.to_string()),
            FailureClass::AuthFatal => UpdateError::AuthFailed(e.to_string()),
            FailureClass::CommandTransient | FailureClass::Unexpected => {
                UpdateError::Failed(format!("Exception during update: {}", e))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{spawn_poller, EntrySignal};
    use crate::error::PollerError;
    use crate::test_utils::MockManager;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn poller(manager: &Arc<MockManager>) -> StatePoller {
        StatePoller::new(manager.clone(), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_name() {
        let manager = Arc::new(MockManager::new("NAS"));
        assert_eq!(poller(&manager).name(), "NAS state");
    }

    #[tokio::test]
    async fn test_refresh_classifies_failures() {
        let manager = Arc::new(MockManager::new("nas"));
        manager.push_update_result(Err(PollerError::HostKeyUnknown {
            host: "nas:22".into(),
            fingerprint: "SHA256:abc".into(),
        }));
        manager.push_update_result(Err(PollerError::auth("denied")));
        manager.push_update_result(Err(PollerError::connection("refused")));
        let poller = poller(&manager);

        assert!(matches!(
            poller.refresh().await,
            Err(UpdateError::ConfigEntryError(_))
        ));
        assert!(matches!(
            poller.refresh().await,
            Err(UpdateError::AuthFailed(_))
        ));
        assert_eq!(
            poller.refresh().await,
            Err(UpdateError::Failed(
                "Exception during update: SSH connection error: refused".into()
            ))
        );
        assert_eq!(poller.refresh().await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_host_key_stops_polling() {
        let manager = Arc::new(MockManager::new("nas"));
        manager.push_update_result(Err(PollerError::HostKeyUnknown {
            host: "nas:22".into(),
            fingerprint: "SHA256:abc".into(),
        }));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_poller(poller(&manager), "nas", tx, CancellationToken::new());

        let signal = rx.recv().await.unwrap();
        assert!(matches!(signal, EntrySignal::ConfigEntryError { .. }));
        assert_eq!(signal.entry_id(), "nas");

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(manager.update_calls(), 1);
        assert!(rx.recv().await.is_none());
        assert!(handle.status().stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_stops_polling() {
        let manager = Arc::new(MockManager::new("nas"));
        manager.push_update_result(Ok(()));
        manager.push_update_result(Err(PollerError::auth("denied")));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = spawn_poller(poller(&manager), "nas", tx, CancellationToken::new());

        let signal = rx.recv().await.unwrap();
        assert!(matches!(signal, EntrySignal::AuthFailed { .. }));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(manager.update_calls(), 2);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_keeps_schedule() {
        let manager = Arc::new(MockManager::new("nas"));
        manager.push_update_result(Err(PollerError::connection("refused")));
        manager.push_update_result(Err(PollerError::connection("refused")));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_poller(poller(&manager), "nas", tx, CancellationToken::new());

        tokio::time::sleep(Duration::from_secs(95)).await;

        assert_eq!(manager.update_calls(), 4);
        assert!(handle.status().last_update_success);
        assert!(rx.try_recv().is_err());
    }
}
