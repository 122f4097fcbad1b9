//! Entity Reconciler
//!
//! Keeps the entity set of one platform in line with a host's sensor
//! registry. Static sensors get their entity at setup; children of dynamic
//! sensors come and go with the registry's child events.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{EntityContext, EntitySet, EntitySnapshot, Platform, SensorBinding};
use crate::sensor::SensorEvent;

pub struct Reconciler<P: Platform> {
    ctx: EntityContext,
    entities: EntitySet<P::Entity>,
    /// Dynamic sensors whose children this platform presents
    templates: BTreeSet<String>,
    _platform: PhantomData<P>,
}

impl<P: Platform> Reconciler<P> {
    /// Build the initial entity set from the current registry
    pub fn new(ctx: EntityContext) -> Self {
        let mut templates = BTreeSet::new();
        let entities = EntitySet::new();

        for sensor in ctx.manager.sensors().sensors() {
            if !P::supports(&sensor) {
                continue;
            }
            if sensor.dynamic {
                templates.insert(sensor.key);
                continue;
            }
            let binding = SensorBinding::new(ctx.clone(), sensor.key.as_str(), P::DOMAIN);
            entities.add(&sensor.key, P::create(binding));
        }

        debug!(
            "{} {}: {} entities, {} dynamic sensors",
            ctx.manager.name(),
            P::DOMAIN,
            entities.len(),
            templates.len()
        );

        Self {
            ctx,
            entities,
            templates,
            _platform: PhantomData,
        }
    }

    /// Set up the platform and follow child events until `cancel` fires
    ///
    /// Subscribes before the initial scan so no child event is missed.
    pub fn start(ctx: EntityContext, cancel: CancellationToken) -> (Arc<Self>, JoinHandle<()>) {
        let events = ctx.manager.sensors().subscribe();
        let reconciler = Arc::new(Self::new(ctx));
        let task = Arc::clone(&reconciler).listen(events, cancel);
        (reconciler, task)
    }

    pub fn entities(&self) -> &EntitySet<P::Entity> {
        &self.entities
    }

    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        self.entities.snapshot()
    }

    pub fn handle_event(&self, event: &SensorEvent) {
        if !self.templates.contains(event.parent()) {
            return;
        }
        match event {
            SensorEvent::ChildAdded { key, .. } => self.handle_child_add(key),
            SensorEvent::ChildRemoved { key, .. } => self.handle_child_remove(key),
        }
    }

    fn handle_child_add(&self, key: &str) {
        // The child may already be gone again by the time the event arrives
        if !self.ctx.manager.sensors().contains(key) {
            return;
        }
        let binding = SensorBinding::new(self.ctx.clone(), key, P::DOMAIN);
        if self.entities.add(key, P::create(binding)) {
            debug!("Added {} entity for {}", P::DOMAIN, key);
        }
    }

    fn handle_child_remove(&self, key: &str) {
        if self.entities.remove(key).is_some() {
            debug!("Removed {} entity for {}", P::DOMAIN, key);
        }
    }

    /// Rebuild the children's entities from the registry
    pub fn resync(&self) {
        let registry = self.ctx.manager.sensors();
        for template in &self.templates {
            for key in registry.children(template) {
                self.handle_child_add(&key);
            }
        }
        for key in self.entities.keys() {
            if !registry.contains(&key) {
                self.handle_child_remove(&key);
            }
        }
    }

    /// Follow child events on a task
    pub fn listen(
        self: Arc<Self>,
        mut events: broadcast::Receiver<SensorEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.templates.is_empty() {
                return;
            }
            // Children added between subscribe and the initial scan
            self.resync();

            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) => self.handle_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            "{} {}: missed {} sensor events, resyncing",
                            self.ctx.manager.name(),
                            P::DOMAIN,
                            skipped
                        );
                        self.resync();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
