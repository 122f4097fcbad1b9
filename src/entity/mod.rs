//! Presentation-layer entities
//!
//! Each platform (sensor, binary sensor, switch, number) turns the sensors
//! matching its predicate into entities. An entity never copies sensor
//! state: every read looks the sensor up in the host's registry by key.

pub mod binary_sensor;
pub mod number;
pub mod power;
pub mod reconciler;
pub mod sensor;
pub mod switch;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;

use crate::coordinator::PollerStatus;
use crate::manager::Manager;
use crate::sensor::{Sensor, SensorValue};

pub use binary_sensor::{BinarySensorEntity, BinarySensorPlatform};
pub use number::{NumberEntity, NumberPlatform};
pub use power::PowerEntity;
pub use reconciler::Reconciler;
pub use sensor::{SensorEntity, SensorPlatform};
pub use switch::{SwitchEntity, SwitchPlatform};

/// What every entity of an entry shares
#[derive(Clone)]
pub struct EntityContext {
    pub entry_id: String,
    pub manager: Arc<dyn Manager>,
    /// Status of the host's State Poller
    pub state: watch::Receiver<PollerStatus>,
}

impl EntityContext {
    pub fn new(
        entry_id: impl Into<String>,
        manager: Arc<dyn Manager>,
        state: watch::Receiver<PollerStatus>,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            manager,
            state,
        }
    }

    /// Host reachable and last state refresh successful
    pub fn host_available(&self) -> bool {
        self.manager.is_connected() && self.state.borrow().last_update_success
    }

    fn object_id(&self, key: &str) -> String {
        format!("{}_{}", slugify(self.manager.name()), slugify(key))
    }
}

/// Point-in-time view of an entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySnapshot {
    pub entity_id: String,
    pub unique_id: String,
    pub name: String,
    pub available: bool,
    pub state: Option<SensorValue>,
    pub unit: Option<String>,
}

pub trait Entity: Send + Sync {
    /// Sensor key the entity is bound to
    fn key(&self) -> &str;

    fn unique_id(&self) -> String;

    fn entity_id(&self) -> String;

    fn name(&self) -> String;

    fn available(&self) -> bool;

    fn state(&self) -> Option<SensorValue>;

    fn unit(&self) -> Option<String> {
        None
    }

    fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: self.entity_id(),
            unique_id: self.unique_id(),
            name: self.name(),
            available: self.available(),
            state: self.state(),
            unit: self.unit(),
        }
    }
}

/// Binding of an entity to a sensor key
///
/// Shared by all sensor-backed entities; the sensor itself stays in the
/// registry and may disappear at any time.
#[derive(Clone)]
pub struct SensorBinding {
    ctx: EntityContext,
    key: String,
    domain: &'static str,
}

impl SensorBinding {
    pub fn new(ctx: EntityContext, key: impl Into<String>, domain: &'static str) -> Self {
        Self {
            ctx,
            key: key.into(),
            domain,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn manager(&self) -> &Arc<dyn Manager> {
        &self.ctx.manager
    }

    /// Current state of the bound sensor
    pub fn sensor(&self) -> Option<Sensor> {
        self.ctx.manager.sensors().get(&self.key)
    }

    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.ctx.entry_id, self.key)
    }

    pub fn entity_id(&self) -> String {
        format!("{}.{}", self.domain, self.ctx.object_id(&self.key))
    }

    pub fn name(&self) -> String {
        self.sensor()
            .map(|sensor| sensor.name)
            .unwrap_or_else(|| self.key.clone())
    }

    pub fn available(&self) -> bool {
        self.ctx.host_available() && self.ctx.manager.sensors().contains(&self.key)
    }

    pub fn value(&self) -> Option<SensorValue> {
        self.sensor().and_then(|sensor| sensor.value)
    }
}

/// An entity type built from sensors
pub trait Platform: Send + Sync + 'static {
    /// Entity id prefix, e.g. `number`
    const DOMAIN: &'static str;

    type Entity: Entity + 'static;

    /// Whether the platform presents `sensor`
    fn supports(sensor: &Sensor) -> bool;

    fn create(binding: SensorBinding) -> Self::Entity;
}

/// Registered entities of one platform, at most one per sensor key
pub struct EntitySet<E> {
    entities: RwLock<BTreeMap<String, Arc<E>>>,
}

impl<E: Entity> EntitySet<E> {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register an entity; returns false if the key is already bound
    pub fn add(&self, key: &str, entity: E) -> bool {
        let mut entities = self.entities.write();
        if entities.contains_key(key) {
            return false;
        }
        entities.insert(key.to_string(), Arc::new(entity));
        true
    }

    pub fn remove(&self, key: &str) -> Option<Arc<E>> {
        self.entities.write().remove(key)
    }

    pub fn get(&self, key: &str) -> Option<Arc<E>> {
        self.entities.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entities.read().contains_key(key)
    }

    /// Bound sensor keys, ordered
    pub fn keys(&self) -> Vec<String> {
        self.entities.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        self.entities
            .read()
            .values()
            .map(|entity| entity.snapshot())
            .collect()
    }
}

impl<E: Entity> Default for EntitySet<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase, `_`-separated form of a name for entity ids
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}
