//! Command-Group Poller
//!
//! Runs one sensor command at its declared interval while the host is
//! connected. It never connects by itself; that is left to the State Poller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{Refresh, UpdateError};
use crate::error::FailureClass;
use crate::manager::Manager;
use crate::sensor::SensorCommand;

pub struct CommandPoller {
    manager: Arc<dyn Manager>,
    command: SensorCommand,
    name: String,
    interval: Duration,
}

impl CommandPoller {
    /// Create a poller for a command with an interval
    ///
    /// Static commands have no schedule and yield `None`.
    pub fn new(manager: Arc<dyn Manager>, command: SensorCommand) -> Option<Self> {
        let interval = command.interval?;
        Some(Self {
            name: format!("{} {}", manager.name(), command.sensors.join(", ")),
            manager,
            command,
            interval,
        })
    }

    /// Identity used to avoid scheduling the same command twice
    pub fn id(&self) -> String {
        self.command.id()
    }
}

#[async_trait]
impl Refresh for CommandPoller {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn refresh(&self) -> Result<(), UpdateError> {
        if !self.manager.is_connected() {
            debug!("{}: host not connected, skipping", self.name);
            return Ok(());
        }

        match self.manager.execute_command(&self.command).await {
            Ok(()) => Ok(()),
            Err(e) if e.class() == FailureClass::CommandTransient => {
                debug!("{}: {}", self.name, e);
                Ok(())
            }
            Err(e) => Err(UpdateError::Failed(format!(
                "Exception updating {}: {}",
                self.name, e
            ))),
        }
    }
}
