//! Controllable on/off sensors

use super::{Entity, Platform, SensorBinding};
use crate::error::Result;
use crate::sensor::{Sensor, SensorKind, SensorValue};

pub struct SwitchPlatform;

impl Platform for SwitchPlatform {
    const DOMAIN: &'static str = "switch";

    type Entity = SwitchEntity;

    fn supports(sensor: &Sensor) -> bool {
        sensor.kind == SensorKind::Binary && sensor.controllable()
    }

    fn create(binding: SensorBinding) -> SwitchEntity {
        SwitchEntity { binding }
    }
}

pub struct SwitchEntity {
    binding: SensorBinding,
}

impl SwitchEntity {
    pub fn is_on(&self) -> Option<bool> {
        self.binding.value().and_then(|value| value.as_bool())
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.write(true).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.write(false).await
    }

    async fn write(&self, on: bool) -> Result<()> {
        self.binding
            .manager()
            .set_sensor_value(self.binding.key(), SensorValue::Bool(on))
            .await
    }
}

impl Entity for SwitchEntity {
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
