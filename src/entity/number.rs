//! Controllable numeric sensors

use super::{Entity, Platform, SensorBinding};
use crate::error::Result;
use crate::sensor::{NumberMode, Sensor, SensorKind, SensorValue};

/// Lower bound reported when the sensor declares none
pub const DEFAULT_MIN_VALUE: f64 = 0.0;

/// Upper bound reported when the sensor declares none
pub const DEFAULT_MAX_VALUE: f64 = 100.0;

pub struct NumberPlatform;

impl Platform for NumberPlatform {
    const DOMAIN: &'static str = "number";

    type Entity = NumberEntity;

    fn supports(sensor: &Sensor) -> bool {
        sensor.kind == SensorKind::Number && sensor.controllable()
    }

    fn create(binding: SensorBinding) -> NumberEntity {
        NumberEntity { binding }
    }
}

pub struct NumberEntity {
    binding: SensorBinding,
}

impl NumberEntity {
    pub fn native_value(&self) -> Option<f64> {
        self.binding.value().and_then(|value| value.as_f64())
    }

    pub fn native_min_value(&self) -> f64 {
        self.binding
            .sensor()
            .and_then(|sensor| sensor.minimum)
            .unwrap_or(DEFAULT_MIN_VALUE)
    }

    pub fn native_max_value(&self) -> f64 {
        self.binding
            .sensor()
            .and_then(|sensor| sensor.maximum)
            .unwrap_or(DEFAULT_MAX_VALUE)
    }

    pub fn mode(&self) -> NumberMode {
        self.binding
            .sensor()
            .map(|sensor| sensor.mode)
            .unwrap_or_default()
    }

    /// Write a new value, truncated to an integer for non-float sensors
    pub async fn set_native_value(&self, value: f64) -> Result<()> {
        let float = self.binding.sensor().is_some_and(|sensor| sensor.float);
        let value = if float {
            SensorValue::Float(value)
        } else {
            SensorValue::Int(value.trunc() as i64)
        };
        self.binding
            .manager()
            .set_sensor_value(self.binding.key(), value)
            .await
    }
}

impl Entity for NumberEntity {
    fn key(&self) -> &str {
        self.binding.key()
    }

    fn unique_id(&self) -> String {
        self.binding.unique_id()
    }

    fn entity_id(&self) -> String {
        self.binding.entity_id()
    }

    fn name(&self) -> String {
        self.binding.name()
    }

    fn available(&self) -> bool {
        self.binding.available()
    }

    fn state(&self) -> Option<SensorValue> {
        self.binding.value()
    }

    fn unit(&self) -> Option<String> {
        self.binding.sensor().and_then(|sensor| sensor.unit)
    }
}
