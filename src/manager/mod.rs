//! Host connection managers
//!
//! A [`Manager`] owns the remote session of one host together with its
//! sensor registry. Pollers and entities only talk to hosts through this
//! trait; [`SshManager`] is the SSH implementation.

pub mod ssh;

use async_trait::async_trait;

use crate::error::{PollerError, Result};
use crate::sensor::{SensorCommand, SensorRegistry, SensorValue};
use crate::wol::MacAddress;

pub use ssh::SshManager;

/// Connection and sensor access for one configured host
#[async_trait]
pub trait Manager: Send + Sync {
    /// Display name of the host
    fn name(&self) -> &str;

    /// Whether the session is currently up
    fn is_connected(&self) -> bool;

    fn sensors(&self) -> &SensorRegistry;

    /// Commands declared for this host, static ones included
    fn commands(&self) -> &[SensorCommand];

    /// Store the MAC address used to wake the host
    fn set_mac_address(&self, mac: Option<MacAddress>);

    fn can_turn_on(&self) -> bool;

    fn can_turn_off(&self) -> bool;

    /// Refresh connectivity, connecting when needed, and static sensors
    async fn update_state(&self) -> Result<()>;

    /// Run a command and store the parsed values of its sensors
    async fn execute_command(&self, command: &SensorCommand) -> Result<()>;

    /// Write a value to a controllable sensor on the remote host
    async fn set_sensor_value(&self, key: &str, value: SensorValue) -> Result<()>;

    async fn turn_on(&self) -> Result<()>;

    async fn turn_off(&self) -> Result<()>;

    async fn disconnect(&self);
}

/// Store the output lines of `command` into the registry
///
/// A command feeding a single dynamic sensor reads `<id> <value>` lines and
/// syncs the children; any other command maps line *i* to sensor *i*. Values
/// are only stored once every line parsed.
pub fn apply_command_output(
    registry: &SensorRegistry,
    command: &SensorCommand,
    lines: &[&str],
) -> Result<()> {
    if let [key] = command.sensors.as_slice() {
        if let Some(template) = registry.get(key).filter(|sensor| sensor.dynamic) {
            let mut children = Vec::with_capacity(lines.len());
            for line in lines {
                let (id, raw) = line.split_once(char::is_whitespace).ok_or_else(|| {
                    PollerError::command(format!("{}: expected '<id> <value>', got '{}'", key, line))
                })?;
                let value = template.spawn_child(id).parse_value(raw)?;
                children.push((id.to_string(), value));
            }
            return registry.sync_children(key, children);
        }
    }

    if lines.len() < command.sensors.len() {
        return Err(PollerError::command(format!(
            "expected {} output lines for {}, got {}",
            command.sensors.len(),
            command.sensors.join(", "),
            lines.len()
        )));
    }

    let mut values = Vec::with_capacity(command.sensors.len());
    for (key, line) in command.sensors.iter().zip(lines) {
        let sensor = registry
            .get(key)
            .ok_or_else(|| PollerError::UnknownSensor(key.clone()))?;
        values.push((key.clone(), sensor.parse_value(line)?));
    }
    registry.set_values(values);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{Sensor, SensorKind};
    use std::time::Duration;

    fn registry() -> SensorRegistry {
        SensorRegistry::from_sensors([
            Sensor::new("cpu_temp", SensorKind::Number).with_float(true),
            Sensor::new("cpu_load", SensorKind::Number).with_float(true),
            Sensor::new("disk", SensorKind::Number).with_dynamic(true),
        ])
    }

    fn cpu_command() -> SensorCommand {
        SensorCommand::new(
            "sensors",
            Some(Duration::from_secs(30)),
            vec!["cpu_temp".into(), "cpu_load".into()],
        )
    }

    #[test]
    fn test_apply_lines_in_order() {
        let registry = registry();
        apply_command_output(&registry, &cpu_command(), &["48.5", "0.42"]).unwrap();
        assert_eq!(
            registry.get("cpu_temp").unwrap().value,
            Some(SensorValue::Float(48.5))
        );
        assert_eq!(
            registry.get("cpu_load").unwrap().value,
            Some(SensorValue::Float(0.42))
        );
    }

    #[test]
    fn test_apply_missing_lines_updates_nothing() {
        let registry = registry();
        let err = apply_command_output(&registry, &cpu_command(), &["48.5"]).unwrap_err();
        assert!(matches!(err, PollerError::Command(_)));
        assert!(registry.get("cpu_temp").unwrap().value.is_none());
    }

    #[test]
    fn test_apply_parse_failure_updates_nothing() {
        let registry = registry();
        let err = apply_command_output(&registry, &cpu_command(), &["48.5", "busy"]).unwrap_err();
        assert!(matches!(err, PollerError::Command(_)));
        assert!(registry.get("cpu_temp").unwrap().value.is_none());
    }

    #[test]
    fn test_apply_dynamic_children() {
        let registry = registry();
        let command = SensorCommand::new("df", Some(Duration::from_secs(60)), vec!["disk".into()]);

        apply_command_output(&registry, &command, &["sda 41", "sdb 87"]).unwrap();
        assert_eq!(
            registry.children("disk"),
            vec!["disk.sda".to_string(), "disk.sdb".to_string()]
        );
        assert_eq!(
            registry.get("disk.sdb").unwrap().value,
            Some(SensorValue::Int(87))
        );

        apply_command_output(&registry, &command, &["sdb 88"]).unwrap();
        assert_eq!(registry.children("disk"), vec!["disk.sdb".to_string()]);
    }

    #[test]
    fn test_apply_dynamic_malformed_line() {
        let registry = registry();
        let command = SensorCommand::new("df", Some(Duration::from_secs(60)), vec!["disk".into()]);
        assert!(apply_command_output(&registry, &command, &["sda"]).is_err());
    }
}
