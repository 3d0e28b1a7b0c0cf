//! Per-object property storage and lifecycle.
//!
//! A `DataContainer` is owned by exactly one transaction. Its lifecycle:
//!
//! ```text
//! new object ─► New ──commit──► Unchanged ◄──commit/rollback── Changed
//! load ───────► Unchanged ──set value──► Changed
//! delete: New ─► Discarded, Unchanged/Changed ─► Deleted ──commit──► Discarded
//! rollback: New ─► Discarded, Deleted/Changed ─► Unchanged
//! ```

use std::collections::BTreeMap;

use weft_foundation::{ClassId, Error, ObjectId, PropertyName, Result, Timestamp, Value};
use weft_mapping::ClassDefinition;

use crate::property::PropertyState;

/// Observable state of a persistable object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectState {
    /// Created in this transaction, not yet in storage.
    New,
    /// Same as in storage.
    Unchanged,
    /// Modified since it was loaded or committed.
    Changed,
    /// Deleted in this transaction, still in storage.
    Deleted,
    /// Unusable: its deletion was committed or it was never persisted.
    Discarded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    New,
    Existing,
    Deleted,
    Discarded,
}

/// Property states and lifecycle of one object.
#[derive(Clone, Debug)]
pub struct DataContainer {
    id: ObjectId,
    properties: BTreeMap<PropertyName, PropertyState>,
    lifecycle: Lifecycle,
    marked_changed: bool,
    timestamp: Option<Timestamp>,
}

impl DataContainer {
    /// Creates the container of a new object with default property values.
    #[must_use]
    pub fn new_object(id: ObjectId, class: &ClassDefinition) -> Self {
        let properties = class
            .properties
            .iter()
            .map(|p| (p.name.clone(), PropertyState::new(p.default.clone())))
            .collect();
        Self {
            id,
            properties,
            lifecycle: Lifecycle::New,
            marked_changed: false,
            timestamp: None,
        }
    }

    /// Creates the container of an object loaded from storage.
    ///
    /// Properties missing from `values` take their default.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProperty` if `values` names a property the class does not have.
    pub fn loaded(
        id: ObjectId,
        class: &ClassDefinition,
        mut values: BTreeMap<PropertyName, Value>,
        timestamp: Timestamp,
    ) -> Result<Self> {
        let mut properties = BTreeMap::new();
        for definition in &class.properties {
            let value = values
                .remove(&definition.name)
                .unwrap_or_else(|| definition.default.clone());
            properties.insert(definition.name.clone(), PropertyState::new(value));
        }
        if let Some(unknown) = values.into_keys().next() {
            return Err(Error::unknown_property(class.id.clone(), unknown));
        }
        Ok(Self {
            id,
            properties,
            lifecycle: Lifecycle::Existing,
            marked_changed: false,
            timestamp: Some(timestamp),
        })
    }

    /// Returns the object identity.
    #[must_use]
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Returns the class of the object.
    #[must_use]
    pub fn class_id(&self) -> &ClassId {
        &self.id.class_id
    }

    /// Returns the optimistic-concurrency token, `None` for new objects.
    #[must_use]
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// Computes the object state from the lifecycle and the property states.
    #[must_use]
    pub fn state(&self) -> ObjectState {
        match self.lifecycle {
            Lifecycle::New => ObjectState::New,
            Lifecycle::Deleted => ObjectState::Deleted,
            Lifecycle::Discarded => ObjectState::Discarded,
            Lifecycle::Existing if self.has_changed() => ObjectState::Changed,
            Lifecycle::Existing => ObjectState::Unchanged,
        }
    }

    /// Returns true if any property changed or the container was marked changed.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.marked_changed || self.properties.values().any(PropertyState::has_changed)
    }

    /// Returns true if the container is new.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.lifecycle == Lifecycle::New
    }

    /// Returns true if the container is deleted but not yet discarded.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.lifecycle == Lifecycle::Deleted
    }

    /// Returns true if the container is discarded.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        self.lifecycle == Lifecycle::Discarded
    }

    /// Fails if the container is discarded.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded`.
    pub fn ensure_not_discarded(&self) -> Result<()> {
        if self.is_discarded() {
            return Err(Error::object_discarded(self.id.clone()));
        }
        Ok(())
    }

    /// Fails if the container is deleted or discarded.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded` or `ObjectDeleted`.
    pub fn ensure_modifiable(&self) -> Result<()> {
        self.ensure_not_discarded()?;
        if self.is_deleted() {
            return Err(Error::object_deleted(self.id.clone()));
        }
        Ok(())
    }

    fn state_of(&self, name: &PropertyName) -> Result<&PropertyState> {
        self.ensure_not_discarded()?;
        self.properties
            .get(name)
            .ok_or_else(|| Error::unknown_property(self.id.class_id.clone(), name.clone()))
    }

    /// Returns the current value of a property.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded` or `UnknownProperty`.
    pub fn value(&self, name: &PropertyName) -> Result<&Value> {
        self.state_of(name).map(PropertyState::value)
    }

    /// Returns the last committed value of a property.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded` or `UnknownProperty`.
    pub fn original_value(&self, name: &PropertyName) -> Result<&Value> {
        self.state_of(name).map(PropertyState::original_value)
    }

    /// Returns true if the property was assigned since the last commit.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded` or `UnknownProperty`.
    pub fn has_been_touched(&self, name: &PropertyName) -> Result<bool> {
        self.state_of(name).map(PropertyState::has_been_touched)
    }

    /// Assigns a property value. Validation against the mapping is the caller's job.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded`, `ObjectDeleted`, or `UnknownProperty`.
    pub fn set_value(&mut self, name: &PropertyName, value: Value) -> Result<()> {
        self.ensure_modifiable()?;
        let class_id = self.id.class_id.clone();
        let state = self
            .properties
            .get_mut(name)
            .ok_or_else(|| Error::unknown_property(class_id, name.clone()))?;
        state.set_value(value);
        Ok(())
    }

    /// Forces the state to `Changed` even without property changes.
    ///
    /// New objects are written anyway, so this is a no-op for them.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded` or `ObjectDeleted`.
    pub fn mark_as_changed(&mut self) -> Result<()> {
        self.ensure_modifiable()?;
        if self.lifecycle == Lifecycle::Existing {
            self.marked_changed = true;
        }
        Ok(())
    }

    /// Snapshot of all current values.
    #[must_use]
    pub fn values(&self) -> BTreeMap<PropertyName, Value> {
        self.properties
            .iter()
            .map(|(name, state)| (name.clone(), state.value().clone()))
            .collect()
    }

    /// Iterates over property names and states.
    pub fn properties(&self) -> impl Iterator<Item = (&PropertyName, &PropertyState)> {
        self.properties.iter()
    }

    /// Marks the container deleted; a new container is discarded right away.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded` or `ObjectDeleted`.
    pub fn delete(&mut self) -> Result<()> {
        self.ensure_modifiable()?;
        self.lifecycle = match self.lifecycle {
            Lifecycle::New => Lifecycle::Discarded,
            _ => Lifecycle::Deleted,
        };
        Ok(())
    }

    /// Adopts the current values as committed.
    ///
    /// Deleted containers become discarded. `timestamp` replaces the
    /// concurrency token when the store handed out a new one.
    pub fn commit(&mut self, timestamp: Option<Timestamp>) {
        match self.lifecycle {
            Lifecycle::Discarded => {}
            Lifecycle::Deleted => self.lifecycle = Lifecycle::Discarded,
            Lifecycle::New | Lifecycle::Existing => {
                for state in self.properties.values_mut() {
                    state.commit();
                }
                self.lifecycle = Lifecycle::Existing;
                self.marked_changed = false;
                if timestamp.is_some() {
                    self.timestamp = timestamp;
                }
            }
        }
    }

    /// Reverts uncommitted changes. New containers become discarded.
    pub fn rollback(&mut self) {
        match self.lifecycle {
            Lifecycle::Discarded => {}
            Lifecycle::New => self.lifecycle = Lifecycle::Discarded,
            Lifecycle::Existing | Lifecycle::Deleted => {
                for state in self.properties.values_mut() {
                    state.rollback();
                }
                self.lifecycle = Lifecycle::Existing;
                self.marked_changed = false;
            }
        }
    }

    /// Makes the container permanently unusable.
    pub fn discard(&mut self) {
        self.lifecycle = Lifecycle::Discarded;
    }
}

/// All data containers of one transaction, keyed by object identity.
///
/// Clone is O(1) thanks to structural sharing, which makes whole-map
/// snapshots cheap.
#[derive(Clone, Debug, Default)]
pub struct DataContainerMap {
    containers: im::HashMap<ObjectId, DataContainer>,
}

impl DataContainerMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a container.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a container with the same ID is registered.
    pub fn register(&mut self, container: DataContainer) -> Result<()> {
        if self.containers.contains_key(container.id()) {
            return Err(Error::internal(format!(
                "data container {} already registered",
                container.id()
            )));
        }
        self.containers.insert(container.id().clone(), container);
        Ok(())
    }

    /// Gets a container.
    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&DataContainer> {
        self.containers.get(id)
    }

    /// Gets a container mutably.
    pub fn get_mut(&mut self, id: &ObjectId) -> Option<&mut DataContainer> {
        self.containers.get_mut(id)
    }

    /// Returns true if a container (in any state) is registered.
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.containers.contains_key(id)
    }

    /// Returns the number of containers, discarded ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Returns true if no container is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Iterates over all containers.
    pub fn iter(&self) -> impl Iterator<Item = &DataContainer> {
        self.containers.values()
    }

    /// IDs of new, changed, and deleted containers in a stable order.
    #[must_use]
    pub fn changed_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self
            .containers
            .values()
            .filter(|c| {
                matches!(
                    c.state(),
                    ObjectState::New | ObjectState::Changed | ObjectState::Deleted
                )
            })
            .map(|c| c.id().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Commits every container; `timestamps` carries new tokens from the store.
    pub fn commit_all(&mut self, timestamps: &std::collections::HashMap<ObjectId, Timestamp>) {
        for (id, container) in self.containers.iter_mut() {
            container.commit(timestamps.get(id).copied());
        }
    }

    /// Rolls back every container.
    pub fn rollback_all(&mut self) {
        for (_, container) in self.containers.iter_mut() {
            container.rollback();
        }
    }

    /// Reverts to a snapshot taken with `clone()`.
    ///
    /// Containers loaded after the snapshot are kept in their loaded state.
    pub fn restore(&mut self, snapshot: Self) {
        let mut restored = snapshot.containers;
        for (id, container) in &self.containers {
            if !restored.contains_key(id) {
                let mut container = container.clone();
                container.rollback();
                restored.insert(id.clone(), container);
            }
        }
        self.containers = restored;
    }
}
