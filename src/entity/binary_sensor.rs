//! Read-only on/off sensors

use super::{Entity, Platform, SensorBinding};
use crate::sensor::{Sensor, SensorKind, SensorValue};

pub struct BinarySensorPlatform;

impl Platform for BinarySensorPlatform {
    const DOMAIN: &'static str = "binary_sensor";

    type Entity = BinarySensorEntity;

    fn supports(sensor: &Sensor) -> bool {
        sensor.kind == SensorKind::Binary && !sensor.controllable()
    }

    fn create(binding: SensorBinding) -> BinarySensorEntity {
        BinarySensorEntity { binding }
    }
}

pub struct BinarySensorEntity {
    binding: SensorBinding,
}

impl BinarySensorEntity {
    pub fn is_on(&self) -> Option<bool> {
        self.binding.value().and_then(|value| value.as_bool())
    }
}

impl Entity for BinarySensorEntity {
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
        self.is_on().map(SensorValue::Bool)
    }
}
