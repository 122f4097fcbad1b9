//! Host power switch
//!
//! Not bound to a sensor: on means the host is reachable, turning it on sends
//! a wake packet and turning it off runs the shutdown command.

use super::{slugify, Entity, EntityContext};
use crate::error::Result;
use crate::sensor::SensorValue;

/// Key of the power switch entity
pub const POWER_KEY: &str = "power";

pub struct PowerEntity {
    ctx: EntityContext,
}

impl PowerEntity {
    /// Power switch for the host, if it can be switched at all
    pub fn new(ctx: EntityContext) -> Option<Self> {
        let manager = &ctx.manager;
        if !manager.can_turn_on() && !manager.can_turn_off() {
            return None;
        }
        Some(Self { ctx })
    }

    pub fn is_on(&self) -> bool {
        self.ctx.manager.is_connected()
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.ctx.manager.turn_on().await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.ctx.manager.turn_off().await
    }
}

impl Entity for PowerEntity {
    fn key(&self) -> &str {
        POWER_KEY
    }

    fn unique_id(&self) -> String {
        format!("{}_{}", self.ctx.entry_id, POWER_KEY)
    }

    fn entity_id(&self) -> String {
        format!("switch.{}", self.ctx.object_id(POWER_KEY))
    }

    fn name(&self) -> String {
        format!("{} power", self.ctx.manager.name())
    }

    // Reports off while the host is down instead of going unavailable
    fn available(&self) -> bool {
        true
    }

    fn state(&self) -> Option<SensorValue> {
        Some(SensorValue::Bool(self.is_on()))
    }
}
