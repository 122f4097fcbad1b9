//! Sensor registry of one host
//!
//! Holds every sensor by key and publishes child lifecycle events of dynamic
//! sensors on a broadcast channel, so entity reconcilers can follow the set
//! of children without polling.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use super::{Sensor, SensorValue};
use crate::error::{PollerError, Result};

/// Buffered child events per subscriber
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Child lifecycle event of a dynamic sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorEvent {
    ChildAdded { parent: String, key: String },
    ChildRemoved { parent: String, key: String },
}

impl SensorEvent {
    /// Key of the dynamic template the event belongs to
    pub fn parent(&self) -> &str {
        match self {
            SensorEvent::ChildAdded { parent, .. } | SensorEvent::ChildRemoved { parent, .. } => {
                parent
            }
        }
    }
}

/// Sensors of one host, keyed by sensor key
pub struct SensorRegistry {
    sensors: RwLock<BTreeMap<String, Sensor>>,
    events: broadcast::Sender<SensorEvent>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sensors: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    pub fn from_sensors(sensors: impl IntoIterator<Item = Sensor>) -> Self {
        let registry = Self::new();
        for sensor in sensors {
            registry.insert(sensor);
        }
        registry
    }

    pub fn insert(&self, sensor: Sensor) {
        self.sensors.write().insert(sensor.key.clone(), sensor);
    }

    /// Snapshot of the sensor under `key`
    pub fn get(&self, key: &str) -> Option<Sensor> {
        self.sensors.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sensors.read().contains_key(key)
    }

    /// Snapshot of all sensors, ordered by key
    pub fn sensors(&self) -> Vec<Sensor> {
        self.sensors.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sensors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.read().is_empty()
    }

    /// Keys of the live children of a dynamic sensor
    pub fn children(&self, parent: &str) -> Vec<String> {
        self.sensors
            .read()
            .values()
            .filter(|sensor| sensor.parent.as_deref() == Some(parent))
            .map(|sensor| sensor.key.clone())
            .collect()
    }

    /// Subscribe to child lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SensorEvent> {
        self.events.subscribe()
    }

    pub fn set_value(&self, key: &str, value: Option<SensorValue>) -> Result<()> {
        let mut sensors = self.sensors.write();
        let sensor = sensors
            .get_mut(key)
            .ok_or_else(|| PollerError::UnknownSensor(key.to_string()))?;
        sensor.value = value;
        Ok(())
    }

    /// Store several values at once; unknown keys are skipped
    pub fn set_values(&self, values: Vec<(String, SensorValue)>) {
        let mut sensors = self.sensors.write();
        for (key, value) in values {
            if let Some(sensor) = sensors.get_mut(&key) {
                sensor.value = Some(value);
            }
        }
    }

    /// Add a child to a dynamic sensor and announce it
    ///
    /// Returns the child key. Adding an existing child is a no-op.
    pub fn add_child(&self, parent: &str, id: &str) -> Result<String> {
        let key = {
            let mut sensors = self.sensors.write();
            let template = sensors
                .get(parent)
                .filter(|sensor| sensor.dynamic)
                .ok_or_else(|| PollerError::UnknownSensor(parent.to_string()))?;
            let child = template.spawn_child(id);
            let key = child.key.clone();
            if sensors.contains_key(&key) {
                return Ok(key);
            }
            sensors.insert(key.clone(), child);
            key
        };

        debug!("Sensor {} added", key);
        let _ = self.events.send(SensorEvent::ChildAdded {
            parent: parent.to_string(),
            key: key.clone(),
        });
        Ok(key)
    }

    /// Remove a child of a dynamic sensor and announce it
    pub fn remove_child(&self, key: &str) -> Result<()> {
        let parent = {
            let mut sensors = self.sensors.write();
            let parent = sensors
                .get(key)
                .and_then(|sensor| sensor.parent.clone())
                .ok_or_else(|| PollerError::UnknownSensor(key.to_string()))?;
            sensors.remove(key);
            parent
        };

        debug!("Sensor {} removed", key);
        let _ = self.events.send(SensorEvent::ChildRemoved {
            parent,
            key: key.to_string(),
        });
        Ok(())
    }

    /// Make the children of `parent` match `values` (child id, value)
    ///
    /// Unseen children are added, known ones updated and children missing
    /// from `values` are removed.
    pub fn sync_children(&self, parent: &str, values: Vec<(String, SensorValue)>) -> Result<()> {
        let mut stale = self.children(parent);

        for (id, value) in values {
            let key = self.add_child(parent, &id)?;
            stale.retain(|existing| existing != &key);
            self.set_value(&key, Some(value))?;
        }

        for key in stale {
            self.remove_child(&key)?;
        }
        Ok(())
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SensorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorRegistry")
            .field("sensors", &self.sensors.read().len())
            .finish()
    }
}
