//! Test utilities for the SSH poller.
//!
//! Only compiled when running tests.
//!
//! - `MockManager` - scripted [`Manager`] recording every call
//! - `wait_until` - poll a condition while spawned tasks make progress

#![cfg(test)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::manager::{apply_command_output, Manager};
use crate::sensor::{Sensor, SensorCommand, SensorRegistry, SensorValue};
use crate::wol::MacAddress;

/// Default timeout for async test operations
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A manager whose results are queued by the test
///
/// Queues are consumed one result per call; an empty queue means success.
/// Successful commands store `command_output` lines into the registry.
pub struct MockManager {
    name: String,
    sensors: SensorRegistry,
    commands: Vec<SensorCommand>,
    connected: AtomicBool,
    mac: Mutex<Option<MacAddress>>,
    allow_turn_off: bool,
    update_results: Mutex<VecDeque<Result<()>>>,
    command_results: Mutex<VecDeque<Result<()>>>,
    command_output: Mutex<Vec<String>>,
    update_calls: AtomicUsize,
    executed: Mutex<Vec<String>>,
    writes: Mutex<Vec<(String, SensorValue)>>,
    power: Mutex<Vec<&'static str>>,
}

impl MockManager {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sensors: SensorRegistry::new(),
            commands: Vec::new(),
            connected: AtomicBool::new(false),
            mac: Mutex::new(None),
            allow_turn_off: false,
            update_results: Mutex::new(VecDeque::new()),
            command_results: Mutex::new(VecDeque::new()),
            command_output: Mutex::new(Vec::new()),
            update_calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            power: Mutex::new(Vec::new()),
        }
    }

    pub fn with_sensors(self, sensors: impl IntoIterator<Item = Sensor>) -> Self {
        for sensor in sensors {
            self.sensors.insert(sensor);
        }
        self
    }

    pub fn with_commands(mut self, commands: Vec<SensorCommand>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_allow_turn_off(mut self, allow: bool) -> Self {
        self.allow_turn_off = allow;
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn push_update_result(&self, result: Result<()>) {
        self.update_results.lock().push_back(result);
    }

    pub fn push_command_result(&self, result: Result<()>) {
        self.command_results.lock().push_back(result);
    }

    pub fn set_command_output(&self, lines: &[&str]) {
        *self.command_output.lock() = lines.iter().map(|line| line.to_string()).collect();
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Commands executed so far
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    pub fn writes(&self) -> Vec<(String, SensorValue)> {
        self.writes.lock().clone()
    }

    pub fn power_calls(&self) -> Vec<&'static str> {
        self.power.lock().clone()
    }
}

#[async_trait]
impl Manager for MockManager {
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
        *self.mac.lock() = mac;
    }

    fn can_turn_on(&self) -> bool {
        self.mac.lock().is_some()
    }

    fn can_turn_off(&self) -> bool {
        self.allow_turn_off
    }

    async fn update_state(&self) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.update_results.lock().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.set_connected(true);
        }
        result
    }

    async fn execute_command(&self, command: &SensorCommand) -> Result<()> {
        self.executed.lock().push(command.command.clone());
        if let Some(result) = self.command_results.lock().pop_front() {
            return result;
        }
        let lines = self.command_output.lock().clone();
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
        if lines.is_empty() {
            return Ok(());
        }
        apply_command_output(&self.sensors, command, &lines)
    }

    async fn set_sensor_value(&self, key: &str, value: SensorValue) -> Result<()> {
        self.writes.lock().push((key.to_string(), value.clone()));
        self.sensors.set_value(key, Some(value))
    }

    async fn turn_on(&self) -> Result<()> {
        self.power.lock().push("on");
        Ok(())
    }

    async fn turn_off(&self) -> Result<()> {
        self.power.lock().push("off");
        self.set_connected(false);
        Ok(())
    }

    async fn disconnect(&self) {
        self.set_connected(false);
    }
}

/// Wait until `condition` holds, letting spawned tasks run in between
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(DEFAULT_TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
