//! Poller service
//!
//! Builds one [`SshManager`] per configured host, sets up their entries and
//! routes fatal poller signals back to the entry registry.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{Config, HostConfig};
use crate::coordinator::EntrySignal;
use crate::entry::{EntryRegistry, EntrySnapshot};
use crate::error::{PollerError, Result};
use crate::manager::SshManager;

/// SSH poller service
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct Service {
    /// Every configured host
    registry: Arc<Mutex<EntryRegistry>>,

    /// Stops the signal router
    cancel: CancellationToken,

    router: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

impl Service {
    /// Create the service and set up every host
    ///
    /// Each host is connected once before this returns; hosts that cannot be
    /// reached keep retrying in the background.
    pub async fn new(config: Config) -> Result<Self> {
        let service = Self::start();
        service.setup_hosts(&config.hosts).await?;
        Ok(service)
    }

    /// Create the registry and start routing signals
    fn start() -> Self {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Mutex::new(EntryRegistry::new(signals_tx)));
        let cancel = CancellationToken::new();

        let router = tokio::spawn(route_signals(
            Arc::clone(&registry),
            signals_rx,
            cancel.clone(),
        ));

        Self {
            registry,
            cancel,
            router: Arc::new(parking_lot::Mutex::new(Some(router))),
        }
    }

    /// Set up every host in order, shutting down on the first failure
    async fn setup_hosts(&self, hosts: &[HostConfig]) -> Result<()> {
        for host in hosts {
            if let Err(e) = self.setup_host(host).await {
                error!("Failed to set up {}: {}", host.name, e);
                self.shutdown().await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn setup_host(&self, host: &HostConfig) -> Result<()> {
        let manager = build_manager(host).await?;
        let options = host.entry_options()?;
        info!(
            "Setting up {} ({}@{}:{})",
            options.id, host.username, host.host, host.port
        );
        self.registry
            .lock()
            .await
            .setup(options, Arc::new(manager))
            .await
    }

    /// Wait until every poller of every host completed its first tick
    pub async fn wait_first_refresh(&self) {
        self.registry.lock().await.wait_first_refresh().await;
    }

    pub async fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.registry.lock().await.snapshot()
    }

    /// Unload every entry and stop routing signals
    pub async fn shutdown(&self) {
        info!("Shutting down SSH poller...");
        self.cancel.cancel();
        let router = self.router.lock().take();
        if let Some(router) = router {
            let _ = router.await;
        }
        self.registry.lock().await.unload_all().await;
    }
}

/// Build the manager of one host, reading its key file
async fn build_manager(host: &HostConfig) -> Result<SshManager> {
    let private_key = match host.key_file {
        Some(ref key_path) => Some(
            tokio::fs::read_to_string(key_path)
                .await
                .map_err(PollerError::Io)?,
        ),
        None => None,
    };

    Ok(SshManager::new(
        &host.name,
        host.ssh_config(private_key),
        host.sensors(),
        host.sensor_commands(),
    )
    .with_allow_turn_off(host.allow_turn_off)
    .with_turn_off_command(&host.turn_off_command))
}

async fn route_signals(
    registry: Arc<Mutex<EntryRegistry>>,
    mut signals: mpsc::UnboundedReceiver<EntrySignal>,
    cancel: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            signal = signals.recv() => signal,
        };
        let Some(signal) = signal else {
            break;
        };
        debug!("Routing {:?}", signal);
        registry.lock().await.apply_signal(signal);
    }
}
