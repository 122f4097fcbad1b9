//! Configured hosts
//!
//! An [`Entry`] is everything running for one configured host: the manager,
//! its State Poller, one Command-Group Poller per distinct command and the
//! entity platforms. [`EntryRegistry`] keys entries by id and is passed
//! around explicitly instead of living in global state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::coordinator::{
    spawn_poller, CommandPoller, EntrySignal, PollerHandle, PollerStatus, StatePoller,
    UpdateError,
};
use crate::entity::{
    BinarySensorPlatform, Entity, EntityContext, EntitySnapshot, NumberPlatform, PowerEntity,
    Reconciler, SensorPlatform, SwitchPlatform,
};
use crate::error::{PollerError, Result};
use crate::manager::Manager;
use crate::wol::MacAddress;

/// Lifecycle state of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Loaded,
    /// Stopped until the host configuration is corrected
    SetupError,
    /// Stopped until new credentials are provided
    AuthFailed,
    NotLoaded,
}

/// Per-host settings an entry is set up with
#[derive(Debug, Clone)]
pub struct EntryOptions {
    pub id: String,
    pub update_interval: Duration,
    pub mac: Option<MacAddress>,
}

/// Entity platforms of one entry
pub struct Platforms {
    pub sensor: Arc<Reconciler<SensorPlatform>>,
    pub binary_sensor: Arc<Reconciler<BinarySensorPlatform>>,
    pub switch: Arc<Reconciler<SwitchPlatform>>,
    pub number: Arc<Reconciler<NumberPlatform>>,
    pub power: Option<PowerEntity>,
}

impl Platforms {
    fn setup(ctx: EntityContext, cancel: &CancellationToken) -> (Self, Vec<JoinHandle<()>>) {
        let (sensor, sensor_task) = Reconciler::start(ctx.clone(), cancel.child_token());
        let (binary_sensor, binary_sensor_task) =
            Reconciler::start(ctx.clone(), cancel.child_token());
        let (switch, switch_task) = Reconciler::start(ctx.clone(), cancel.child_token());
        let (number, number_task) = Reconciler::start(ctx.clone(), cancel.child_token());

        let platforms = Self {
            sensor,
            binary_sensor,
            switch,
            number,
            power: PowerEntity::new(ctx),
        };
        let listeners = vec![sensor_task, binary_sensor_task, switch_task, number_task];
        (platforms, listeners)
    }

    /// Every entity of the entry, ordered by entity id
    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        let mut entities = self.sensor.snapshot();
        entities.extend(self.binary_sensor.snapshot());
        entities.extend(self.switch.snapshot());
        entities.extend(self.number.snapshot());
        entities.extend(self.power.iter().map(|power| power.snapshot()));
        entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        entities
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PollerSnapshot {
    pub name: String,
    #[serde(flatten)]
    pub status: PollerStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    pub id: String,
    pub name: String,
    pub state: EntryState,
    pub error: Option<String>,
    pub connected: bool,
    pub pollers: Vec<PollerSnapshot>,
    pub entities: Vec<EntitySnapshot>,
}

pub struct Entry {
    id: String,
    manager: Arc<dyn Manager>,
    state: EntryState,
    error: Option<String>,
    state_poller: PollerHandle,
    command_pollers: Vec<PollerHandle>,
    platforms: Platforms,
    listeners: Vec<JoinHandle<()>>,
    /// Parent of every poller token
    pollers_cancel: CancellationToken,
    cancel: CancellationToken,
}

impl Entry {
    /// Set up an entry and start polling
    ///
    /// Waits for the first state refresh before scheduling commands, so
    /// command pollers start against a connected host.
    pub async fn setup(
        options: EntryOptions,
        manager: Arc<dyn Manager>,
        signals: mpsc::UnboundedSender<EntrySignal>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let pollers_cancel = cancel.child_token();

        manager.set_mac_address(options.mac);

        let state_poller = spawn_poller(
            StatePoller::new(Arc::clone(&manager), options.update_interval),
            options.id.clone(),
            signals.clone(),
            pollers_cancel.child_token(),
        );
        state_poller.wait_for_ticks(1).await;

        let mut entry_state = EntryState::Loaded;
        let mut entry_error = None;
        let first = state_poller.status();
        if let Some(ref fatal) = first.fatal {
            entry_state = match fatal {
                UpdateError::AuthFailed(_) => EntryState::AuthFailed,
                _ => EntryState::SetupError,
            };
            entry_error = first.last_error.clone();
        } else if !first.last_update_success {
            warn!(
                "{}: first update failed, retrying every {}s",
                manager.name(),
                options.update_interval.as_secs()
            );
        }

        let mut command_pollers = Vec::new();
        if !first.stopped {
            let mut scheduled = BTreeSet::new();
            for command in manager.commands() {
                let Some(poller) = CommandPoller::new(Arc::clone(&manager), command.clone())
                else {
                    continue;
                };
                if !scheduled.insert(poller.id()) {
                    warn!("{}: command {} already scheduled", manager.name(), poller.id());
                    continue;
                }
                command_pollers.push(spawn_poller(
                    poller,
                    options.id.clone(),
                    signals.clone(),
                    pollers_cancel.child_token(),
                ));
            }
        }

        let ctx = EntityContext::new(
            options.id.clone(),
            Arc::clone(&manager),
            state_poller.subscribe(),
        );
        let (platforms, listeners) = Platforms::setup(ctx, &cancel);

        info!(
            "Entry {} set up: {} command pollers, {} entities",
            options.id,
            command_pollers.len(),
            platforms.snapshot().len()
        );

        Self {
            id: options.id,
            manager,
            state: entry_state,
            error: entry_error,
            state_poller,
            command_pollers,
            platforms,
            listeners,
            pollers_cancel,
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn manager(&self) -> &Arc<dyn Manager> {
        &self.manager
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn platforms(&self) -> &Platforms {
        &self.platforms
    }

    pub fn state_poller(&self) -> &PollerHandle {
        &self.state_poller
    }

    pub fn command_pollers(&self) -> &[PollerHandle] {
        &self.command_pollers
    }

    /// Wait until every poller has completed its first tick
    pub async fn wait_first_refresh(&self) {
        self.state_poller.wait_for_ticks(1).await;
        for poller in &self.command_pollers {
            poller.wait_for_ticks(1).await;
        }
    }

    /// Put the entry in a failed state and stop all its pollers
    pub fn fail(&mut self, state: EntryState, message: impl Into<String>) {
        self.state = state;
        self.error = Some(message.into());
        self.pollers_cancel.cancel();
    }

    pub fn snapshot(&self) -> EntrySnapshot {
        let pollers = std::iter::once(&self.state_poller)
            .chain(&self.command_pollers)
            .map(|poller| PollerSnapshot {
                name: poller.name().to_string(),
                status: poller.status(),
            })
            .collect();

        EntrySnapshot {
            id: self.id.clone(),
            name: self.manager.name().to_string(),
            state: self.state,
            error: self.error.clone(),
            connected: self.manager.is_connected(),
            pollers,
            entities: self.platforms.snapshot(),
        }
    }

    /// Stop every poller and listener and release the host connection
    pub async fn unload(self) {
        self.cancel.cancel();
        self.state_poller.shutdown().await;
        for poller in self.command_pollers {
            poller.shutdown().await;
        }
        for listener in self.listeners {
            if let Err(e) = listener.await {
                warn!("Entity listener of {} ended abnormally: {}", self.id, e);
            }
        }
        self.manager.disconnect().await;
        info!("Entry {} unloaded", self.id);
    }
}

/// Every loaded entry, keyed by id
pub struct EntryRegistry {
    entries: BTreeMap<String, Entry>,
    signals: mpsc::UnboundedSender<EntrySignal>,
}

impl EntryRegistry {
    /// `signals` receives the fatal failures of every poller
    pub fn new(signals: mpsc::UnboundedSender<EntrySignal>) -> Self {
        Self {
            entries: BTreeMap::new(),
            signals,
        }
    }

    pub async fn setup(&mut self, options: EntryOptions, manager: Arc<dyn Manager>) -> Result<()> {
        if self.entries.contains_key(&options.id) {
            return Err(PollerError::config(format!(
                "Entry {} is already set up",
                options.id
            )));
        }
        let entry = Entry::setup(options, manager, self.signals.clone()).await;
        self.entries.insert(entry.id().to_string(), entry);
        Ok(())
    }

    /// Unload an entry; returns false if no entry has that id
    pub async fn unload(&mut self, id: &str) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                entry.unload().await;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move the entry a fatal signal belongs to into its failed state
    pub fn apply_signal(&mut self, signal: EntrySignal) {
        let Some(entry) = self.entries.get_mut(signal.entry_id()) else {
            warn!("Signal for unknown entry {}", signal.entry_id());
            return;
        };
        match signal {
            EntrySignal::ConfigEntryError {
                poller, message, ..
            } => {
                error!("Entry {} needs reconfiguration ({}): {}", entry.id, poller, message);
                entry.fail(EntryState::SetupError, message);
            }
            EntrySignal::AuthFailed {
                poller, message, ..
            } => {
                error!("Entry {} needs new credentials ({}): {}", entry.id, poller, message);
                entry.fail(EntryState::AuthFailed, message);
            }
        }
    }

    pub async fn wait_first_refresh(&self) {
        for entry in self.entries.values() {
            entry.wait_first_refresh().await;
        }
    }

    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.entries.values().map(Entry::snapshot).collect()
    }

    pub async fn unload_all(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        for (_, entry) in entries {
            entry.unload().await;
        }
    }
}
