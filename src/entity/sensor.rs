//! Read-only text and numeric sensors

use super::{Entity, Platform, SensorBinding};
use crate::sensor::{Sensor, SensorKind, SensorValue};

pub struct SensorPlatform;

impl Platform for SensorPlatform {
    const DOMAIN: &'static str = "sensor";

    type Entity = SensorEntity;

    fn supports(sensor: &Sensor) -> bool {
        matches!(sensor.kind, SensorKind::Text | SensorKind::Number) && !sensor.controllable()
    }

    fn create(binding: SensorBinding) -> SensorEntity {
        SensorEntity { binding }
    }
}

pub struct SensorEntity {
    binding: SensorBinding,
}

impl SensorEntity {
    pub fn native_value(&self) -> Option<SensorValue> {
        self.binding.value()
    }
}

impl Entity for SensorEntity {
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
        self.native_value()
    }

    fn unit(&self) -> Option<String> {
        self.binding.sensor().and_then(|sensor| sensor.unit)
    }
}
