//! SSH-backed host manager

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{apply_command_output, Manager};
use crate::error::{PollerError, Result};
use crate::sensor::{Sensor, SensorCommand, SensorRegistry, SensorValue};
use crate::ssh::{
    quote_for_shell, render_template, CommandOutput, SshConfig, SshConnectionManager,
};
use crate::wol::{MacAddress, DEFAULT_BROADCAST_ADDRESS, DEFAULT_WOL_PORT};

/// Default command used to power a host off
pub const DEFAULT_TURN_OFF_COMMAND: &str = "sudo poweroff";

/// Host manager running sensor commands over one SSH session
pub struct SshManager {
    name: String,
    connection: SshConnectionManager,
    sensors: SensorRegistry,
    commands: Vec<SensorCommand>,
    connected: AtomicBool,
    mac: RwLock<Option<MacAddress>>,
    allow_turn_off: bool,
    turn_off_command: String,
}

impl SshManager {
    pub fn new(
        name: impl Into<String>,
        config: SshConfig,
        sensors: Vec<Sensor>,
        commands: Vec<SensorCommand>,
    ) -> Self {
        Self {
            name: name.into(),
            connection: SshConnectionManager::new(config),
            sensors: SensorRegistry::from_sensors(sensors),
            commands,
            connected: AtomicBool::new(false),
            mac: RwLock::new(None),
            allow_turn_off: false,
            turn_off_command: DEFAULT_TURN_OFF_COMMAND.to_string(),
        }
    }

    pub fn with_allow_turn_off(mut self, allow: bool) -> Self {
        self.allow_turn_off = allow;
        self
    }

    pub fn with_turn_off_command(mut self, command: impl Into<String>) -> Self {
        self.turn_off_command = command.into();
        self
    }

    fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            warn!("{} disconnected", self.name);
        }
    }

    /// Run a remote command, dropping the connected flag on transport errors
    async fn run(&self, command: &str) -> Result<Vec<String>> {
        let timeout = self.connection.config().command_timeout;
        let result = self.connection.exec_command(command, timeout).await;
        self.checked_lines(command, result)
    }

    fn checked_lines(&self, command: &str, result: Result<CommandOutput>) -> Result<Vec<String>> {
        match result.and_then(|output| output.into_checked(command)) {
            Ok(output) => Ok(output.lines().into_iter().map(str::to_string).collect()),
            Err(e) => {
                if e.is_transport() {
                    self.mark_disconnected();
                }
                Err(e)
            }
        }
    }

    async fn run_sensor_command(&self, command: &SensorCommand) -> Result<()> {
        let timeout = self.connection.config().command_timeout;
        let result = self.connection.exec_command(&command.command, timeout).await;
        self.store_output(command, result)
    }

    /// Store the output of a finished sensor command
    ///
    /// Nothing is stored unless the command ran to completion.
    fn store_output(&self, command: &SensorCommand, result: Result<CommandOutput>) -> Result<()> {
        let lines = self.checked_lines(&command.command, result)?;
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
        apply_command_output(&self.sensors, command, &lines)
    }
}

#[async_trait]
impl Manager for SshManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn sensors(&self) -> &SensorRegistry {
        &self.sensors
    }

    fn commands(&self) -> &[SensorCommand] {
        &self.commands
    }

    fn set_mac_address(&self, mac: Option<MacAddress>) {
        *self.mac.write() = mac;
    }

    fn can_turn_on(&self) -> bool {
        self.mac.read().is_some()
    }

    fn can_turn_off(&self) -> bool {
        self.allow_turn_off
    }

    async fn update_state(&self) -> Result<()> {
        if self.connection.is_connected().await {
            self.connected.store(true, Ordering::SeqCst);
            return Ok(());
        }
        self.mark_disconnected();

        self.connection.connect().await?;
        self.connected.store(true, Ordering::SeqCst);
        info!("{} connected", self.name);

        for command in self.commands.iter().filter(|command| command.is_static()) {
            match self.run_sensor_command(command).await {
                Ok(()) => debug!("Static command for {} done", command.sensors.join(", ")),
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => warn!("Static command on {} failed: {}", self.name, e),
            }
        }
        Ok(())
    }

    async fn execute_command(&self, command: &SensorCommand) -> Result<()> {
        self.run_sensor_command(command).await
    }

    async fn set_sensor_value(&self, key: &str, value: SensorValue) -> Result<()> {
        let sensor = self
            .sensors
            .get(key)
            .ok_or_else(|| PollerError::UnknownSensor(key.to_string()))?;
        let template = sensor
            .command_set
            .as_deref()
            .ok_or_else(|| PollerError::not_allowed(format!("{} is not controllable", key)))?;
        if !self.is_connected() {
            return Err(PollerError::connection(format!("{} is not connected", self.name)));
        }

        let value = sensor.validate_value(value)?;
        let rendered = match &value {
            SensorValue::Text(text) => quote_for_shell(text),
            other => other.to_string(),
        };
        let command = render_template(template, &rendered, sensor.child_id());

        debug!("Setting {} on {} to {}", key, self.name, value);
        self.run(&command).await?;
        self.sensors.set_value(key, Some(value))
    }

    async fn turn_on(&self) -> Result<()> {
        let mac = (*self.mac.read())
            .ok_or_else(|| PollerError::not_allowed(format!("{} has no MAC address", self.name)))?;
        info!("Waking {} ({})", self.name, mac);
        mac.wake(DEFAULT_BROADCAST_ADDRESS, DEFAULT_WOL_PORT).await
    }

    async fn turn_off(&self) -> Result<()> {
        if !self.allow_turn_off {
            return Err(PollerError::not_allowed(format!(
                "turning off {} is disabled",
                self.name
            )));
        }
        info!("Turning off {}", self.name);
        match self.run(&self.turn_off_command).await {
            Ok(_) => {}
            // The session usually dies with the host
            Err(e) if e.is_transport() || matches!(e, PollerError::Timeout(_)) => {
                debug!("Session ended during turn off: {}", e);
            }
            Err(e) => return Err(e),
        }
        self.disconnect().await;
        Ok(())
    }

    async fn disconnect(&self) {
        self.connection.close().await;
        self.mark_disconnected();
    }
}

impl std::fmt::Debug for SshManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshManager")
            .field("name", &self.name)
            .field("connection", &self.connection)
            .field("connected", &self.is_connected())
            .field("commands", &self.commands.len())
            .finish()
    }
}
