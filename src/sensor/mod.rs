//! Sensor model
//!
//! A sensor is a named value source of a host. Sensors are refreshed by
//! [`SensorCommand`]s; a dynamic sensor is a template whose children are
//! discovered from command output at runtime.

pub mod registry;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PollerError, Result};

pub use registry::{SensorEvent, SensorRegistry};

/// Value type of a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    #[default]
    Text,
    Number,
    Binary,
}

/// Display mode hint for numeric entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberMode {
    #[default]
    Auto,
    Box,
    Slider,
}

/// Current value of a sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SensorValue {
    /// Numeric view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SensorValue::Int(v) => Some(*v as f64),
            SensorValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SensorValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Bool(v) => write!(f, "{}", v),
            SensorValue::Int(v) => write!(f, "{}", v),
            SensorValue::Float(v) => write!(f, "{}", v),
            SensorValue::Text(v) => f.write_str(v),
        }
    }
}

/// A named value source of one host
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    /// Unique key within the host; children use `<parent>.<id>`
    pub key: String,
    pub name: String,
    pub kind: SensorKind,
    pub value: Option<SensorValue>,
    pub unit: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Numbers are floats instead of integers
    pub float: bool,
    /// Spawns children instead of holding a value
    pub dynamic: bool,
    /// Write command template, see [`crate::ssh::sanitize::render_template`]
    pub command_set: Option<String>,
    pub mode: NumberMode,
    /// Template key for children of a dynamic sensor
    pub parent: Option<String>,
}

impl Sensor {
    pub fn new(key: impl Into<String>, kind: SensorKind) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            kind,
            value: None,
            unit: None,
            minimum: None,
            maximum: None,
            float: false,
            dynamic: false,
            command_set: None,
            mode: NumberMode::Auto,
            parent: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_bounds(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn with_float(mut self, float: bool) -> Self {
        self.float = float;
        self
    }

    pub fn with_dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    pub fn with_command_set(mut self, command: impl Into<String>) -> Self {
        self.command_set = Some(command.into());
        self
    }

    pub fn with_mode(mut self, mode: NumberMode) -> Self {
        self.mode = mode;
        self
    }

    /// A sensor can be written when it has a write command
    pub fn controllable(&self) -> bool {
        self.command_set.is_some()
    }

    /// Id of a child within its template (`sda` for `disk.sda`)
    pub fn child_id(&self) -> Option<&str> {
        let parent = self.parent.as_deref()?;
        self.key
            .strip_prefix(parent)
            .and_then(|rest| rest.strip_prefix('.'))
    }

    /// Build a child of this dynamic template
    pub fn spawn_child(&self, id: &str) -> Sensor {
        Sensor {
            key: format!("{}.{}", self.key, id),
            name: format!("{} {}", self.name, id),
            value: None,
            dynamic: false,
            parent: Some(self.key.clone()),
            unit: self.unit.clone(),
            command_set: self.command_set.clone(),
            ..*self
        }
    }

    /// Parse one line of command output into a value of this sensor's kind
    pub fn parse_value(&self, raw: &str) -> Result<SensorValue> {
        let raw = raw.trim();
        match self.kind {
            SensorKind::Text => Ok(SensorValue::Text(raw.to_string())),
            SensorKind::Number => {
                let number: f64 = raw.parse().map_err(|_| {
                    PollerError::command(format!("{}: '{}' is not a number", self.key, raw))
                })?;
                if self.float {
                    Ok(SensorValue::Float(number))
                } else {
                    Ok(SensorValue::Int(number.trunc() as i64))
                }
            }
            SensorKind::Binary => match raw.to_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Ok(SensorValue::Bool(true)),
                "0" | "false" | "off" | "no" => Ok(SensorValue::Bool(false)),
                _ => Err(PollerError::command(format!(
                    "{}: '{}' is not a boolean",
                    self.key, raw
                ))),
            },
        }
    }

    /// Check a value about to be written and coerce it to this sensor's kind
    pub fn validate_value(&self, value: SensorValue) -> Result<SensorValue> {
        match (self.kind, value) {
            (SensorKind::Text, SensorValue::Text(text)) => Ok(SensorValue::Text(text)),
            (SensorKind::Binary, SensorValue::Bool(on)) => Ok(SensorValue::Bool(on)),
            (SensorKind::Number, value @ (SensorValue::Int(_) | SensorValue::Float(_))) => {
                let number = value.as_f64().unwrap_or_default();
                if self.minimum.is_some_and(|min| number < min)
                    || self.maximum.is_some_and(|max| number > max)
                {
                    return Err(PollerError::invalid_value(format!(
                        "{} is out of range for {}",
                        number, self.key
                    )));
                }
                if self.float {
                    Ok(SensorValue::Float(number))
                } else {
                    Ok(SensorValue::Int(number.trunc() as i64))
                }
            }
            (kind, value) => Err(PollerError::invalid_value(format!(
                "'{}' does not fit {:?} sensor {}",
                value, kind, self.key
            ))),
        }
    }
}

/// A command refreshing one or more sensors
#[derive(Debug, Clone, PartialEq)]
pub struct SensorCommand {
    pub command: String,
    /// `None` for static commands, run once per connection
    pub interval: Option<Duration>,
    /// Keys of the sensors fed by the output, in output order
    pub sensors: Vec<String>,
}

impl SensorCommand {
    pub fn new(command: impl Into<String>, interval: Option<Duration>, sensors: Vec<String>) -> Self {
        Self {
            command: command.into(),
            interval,
            sensors,
        }
    }

    /// Identity of the command for poller deduplication
    pub fn id(&self) -> String {
        let mut keys: Vec<&str> = self.sensors.iter().map(String::as_str).collect();
        keys.sort_unstable();
        match self.interval {
            Some(interval) => format!("{}@{}s", keys.join(","), interval.as_secs()),
            None => format!("{}@static", keys.join(",")),
        }
    }

    pub fn is_static(&self) -> bool {
        self.interval.is_none()
    }
}
