//! The relation end point registry and the relation change protocol.
//!
//! Every relation mutation runs in three phases:
//!
//! 1. **Changing**: cancelable notifications for every affected end point.
//!    Nothing has been mutated yet, so a veto leaves the graph untouched.
//! 2. **Apply**: all affected end points (and the foreign keys of real end
//!    points) are updated and marked touched.
//! 3. **Changed**: completion notifications in the same order.
//!
//! Planning happens before phase 1 and never mutates. When a planner needs
//! an end point that is not loaded yet it returns [`Plan::Load`]; the caller
//! loads it and plans again.

use std::collections::HashMap;
use std::sync::Arc;

use weft_foundation::{Error, ErrorKind, ObjectId, PropertyName, Result, TransactionId, Value, ValueType};
use weft_mapping::{MappingConfiguration, RelationEndPointDefinition};

use crate::change::{EndPointModification, Plan, RelationChange};
use crate::collection::{DomainObjectCollection, ItemType};
use crate::container::{DataContainer, DataContainerMap};
use crate::domain_object::DomainObject;
use crate::end_point::{CollectionEndPoint, ObjectEndPoint, RelationEndPoint, RelationEndPointId};
use crate::event::EventSink;

// =============================================================================
// Planning Support
// =============================================================================

/// Why planning stopped early.
enum Pending {
    Load(RelationEndPointId),
    Failed(Error),
}

impl From<Error> for Pending {
    fn from(err: Error) -> Self {
        Self::Failed(err)
    }
}

type Planned = std::result::Result<RelationChange, Pending>;

fn finish(planned: Planned) -> Result<Plan> {
    match planned {
        Ok(change) => Ok(Plan::Ready(change)),
        Err(Pending::Load(id)) => Ok(Plan::Load(id)),
        Err(Pending::Failed(err)) => Err(err),
    }
}

fn wrong_cardinality(id: &RelationEndPointId) -> Error {
    Error::new(ErrorKind::WrongCardinality(id.property.clone()))
}

fn missing_end_point(id: &RelationEndPointId) -> Error {
    Error::internal(format!("end point {id} is not registered"))
}

// =============================================================================
// Relation End Point Map
// =============================================================================

/// All loaded relation end points of one transaction.
///
/// Clone is O(1) (the map is an `im` structure), which makes snapshots for
/// multi-step operations cheap.
#[derive(Clone, Debug)]
pub struct RelationEndPointMap {
    mapping: Arc<MappingConfiguration>,
    transaction: TransactionId,
    binding: Option<TransactionId>,
    end_points: im::HashMap<RelationEndPointId, RelationEndPoint>,
}

impl RelationEndPointMap {
    /// Creates an empty map for one transaction.
    ///
    /// When `bound` is set, collection items handed out are bound to `transaction`.
    #[must_use]
    pub fn new(mapping: Arc<MappingConfiguration>, transaction: TransactionId, bound: bool) -> Self {
        Self {
            mapping,
            transaction,
            binding: bound.then_some(transaction),
            end_points: im::HashMap::new(),
        }
    }

    /// Returns the mapping.
    #[must_use]
    pub fn mapping(&self) -> &Arc<MappingConfiguration> {
        &self.mapping
    }

    /// Creates a handle for an object of this transaction.
    #[must_use]
    pub fn handle(&self, id: ObjectId) -> DomainObject {
        DomainObject::with_binding(id, self.binding)
    }

    /// Looks up the mapping of an end point.
    ///
    /// # Errors
    ///
    /// Returns `UnknownClass`, `UnknownProperty`, or `NotARelation`.
    pub fn definition(&self, id: &RelationEndPointId) -> Result<&RelationEndPointDefinition> {
        self.mapping.end_point(&id.object.class_id, &id.property)
    }

    /// Gets a loaded end point.
    #[must_use]
    pub fn get(&self, id: &RelationEndPointId) -> Option<&RelationEndPoint> {
        self.end_points.get(id)
    }

    /// Gets the loaded end point of `object.property`.
    #[must_use]
    pub fn get_property(&self, object: &ObjectId, property: &PropertyName) -> Option<&RelationEndPoint> {
        self.end_points
            .get(&RelationEndPointId::new(object.clone(), property.clone()))
    }

    /// Returns true if the end point is loaded.
    #[must_use]
    pub fn contains(&self, id: &RelationEndPointId) -> bool {
        self.end_points.contains_key(id)
    }

    /// Returns the number of loaded end points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end_points.len()
    }

    /// Returns true if no end point is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end_points.is_empty()
    }

    /// Iterates over all loaded end points.
    pub fn iter(&self) -> impl Iterator<Item = &RelationEndPoint> {
        self.end_points.values()
    }

    /// IDs of every end point the object's class declares, loaded or not.
    #[must_use]
    pub fn end_point_ids(&self, object: &ObjectId) -> Vec<RelationEndPointId> {
        self.mapping
            .class(&object.class_id)
            .map(|class| {
                class
                    .relation_properties()
                    .map(|property| RelationEndPointId::new(object.clone(), property.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true if a loaded virtual end point of the object changed.
    ///
    /// Real end points are reflected in the object's data container.
    #[must_use]
    pub fn has_changed_virtual_end_points(&self, object: &ObjectId) -> bool {
        self.end_point_ids(object)
            .iter()
            .filter_map(|id| self.end_points.get(id))
            .any(|ep| !ep.is_real() && ep.has_changed())
    }

    /// Owners of all changed virtual end points.
    #[must_use]
    pub fn changed_virtual_owners(&self) -> Vec<ObjectId> {
        let mut owners: Vec<_> = self
            .end_points
            .values()
            .filter(|ep| !ep.is_real() && ep.has_changed())
            .map(|ep| ep.id().object.clone())
            .collect();
        owners.sort();
        owners.dedup();
        owners
    }

    fn empty_collection(&self, definition: &RelationEndPointDefinition) -> DomainObjectCollection {
        let item_class = definition.opposite_class.clone();
        let accepted = self.mapping.assignable_classes(&item_class);
        DomainObjectCollection::new()
            .with_item_type(ItemType::new(item_class, accepted))
            .for_transaction(self.transaction)
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    fn insert_new(&mut self, end_point: RelationEndPoint) -> Result<()> {
        let id = end_point.id().clone();
        if self.end_points.contains_key(&id) {
            return Err(Error::internal(format!("end point {id} already registered")));
        }
        self.end_points.insert(id, end_point);
        Ok(())
    }

    /// Registers empty end points for a newly created object.
    ///
    /// # Errors
    ///
    /// Returns `UnknownClass` or an internal error if any end point is registered.
    pub fn register_new_object(&mut self, object: &ObjectId) -> Result<()> {
        let definitions = self.mapping.class(&object.class_id)?.end_points.clone();
        for definition in &definitions {
            let id = RelationEndPointId::new(object.clone(), definition.property.clone());
            let end_point = if definition.is_real() {
                RelationEndPoint::Real(ObjectEndPoint::new(id, None))
            } else if definition.is_collection() {
                RelationEndPoint::VirtualCollection(CollectionEndPoint::new(
                    id,
                    self.empty_collection(definition),
                ))
            } else {
                RelationEndPoint::VirtualSingle(ObjectEndPoint::new(id, None))
            };
            self.insert_new(end_point)?;
        }
        Ok(())
    }

    /// Registers the real end points of a loaded object from its foreign keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the class or a foreign-key property is unknown.
    pub fn register_real_end_points(&mut self, container: &DataContainer) -> Result<()> {
        let definitions = self.mapping.class(container.class_id())?.end_points.clone();
        for definition in definitions.iter().filter(|d| d.is_real()) {
            let related = container.value(&definition.property)?.as_object().cloned();
            let id = RelationEndPointId::new(container.id().clone(), definition.property.clone());
            self.insert_new(RelationEndPoint::Real(ObjectEndPoint::new(id, related)))?;
        }
        Ok(())
    }

    /// Registers a lazily loaded virtual end point.
    ///
    /// # Errors
    ///
    /// Returns an error if the end point is real, already registered, or
    /// `related` does not fit it (several objects for a single end point,
    /// duplicates, or wrong types).
    pub fn register_virtual(&mut self, id: RelationEndPointId, related: Vec<ObjectId>) -> Result<()> {
        let definition = self.definition(&id)?.clone();
        if definition.is_real() {
            return Err(Error::internal(format!("{id} is a real end point")));
        }
        let end_point = if definition.is_collection() {
            let items = self
                .empty_collection(&definition)
                .with_items(related.into_iter().map(|item| self.handle(item)))?;
            RelationEndPoint::VirtualCollection(CollectionEndPoint::new(id, items))
        } else {
            if related.len() > 1 {
                return Err(wrong_cardinality(&id));
            }
            RelationEndPoint::VirtualSingle(ObjectEndPoint::new(id, related.into_iter().next()))
        };
        self.insert_new(end_point)
    }

    /// Forgets every end point of an object.
    pub fn unregister_object(&mut self, object: &ObjectId) {
        for id in self.end_point_ids(object) {
            self.end_points.remove(&id);
        }
    }

    // -------------------------------------------------------------------------
    // Planning
    // -------------------------------------------------------------------------

    fn require(&self, id: &RelationEndPointId) -> std::result::Result<&RelationEndPoint, Pending> {
        self.end_points
            .get(id)
            .ok_or_else(|| Pending::Load(id.clone()))
    }

    fn require_single(&self, id: &RelationEndPointId) -> std::result::Result<&ObjectEndPoint, Pending> {
        self.require(id)?
            .as_object()
            .ok_or_else(|| Pending::Failed(wrong_cardinality(id)))
    }

    fn require_collection(
        &self,
        id: &RelationEndPointId,
    ) -> std::result::Result<&CollectionEndPoint, Pending> {
        self.require(id)?
            .as_collection()
            .ok_or_else(|| Pending::Failed(wrong_cardinality(id)))
    }

    fn check_related(&self, definition: &RelationEndPointDefinition, related: &ObjectId) -> Result<()> {
        if self
            .mapping
            .is_assignable(&related.class_id, &definition.opposite_class)
        {
            return Ok(());
        }
        Err(Error::type_mismatch(
            ValueType::Object(definition.opposite_class.clone()),
            Some(ValueType::Object(related.class_id.clone())),
        ))
    }

    fn opposite(
        &self,
        definition: &RelationEndPointDefinition,
    ) -> Result<RelationEndPointDefinition> {
        self.mapping.opposite_end_point(definition).cloned()
    }

    /// Plans `source = new` on a single-valued end point.
    ///
    /// Notification order: `source`, the end point of `new` gaining the
    /// source object, the end point of the old related object losing it,
    /// then (one-to-one only) the end point of `new`'s previous partner.
    /// Assigning the current value only touches `source` and the opposite
    /// end point of `new`.
    ///
    /// # Errors
    ///
    /// Returns `WrongCardinality` for a collection end point, `TypeMismatch`
    /// if `new` has the wrong class, or a mapping lookup error.
    pub fn plan_set_related_object(
        &self,
        source: &RelationEndPointId,
        new: Option<&ObjectId>,
    ) -> Result<Plan> {
        finish(self.set_related_object_change(source, new))
    }

    fn set_related_object_change(
        &self,
        source: &RelationEndPointId,
        new: Option<&ObjectId>,
    ) -> Planned {
        let definition = self.definition(source)?;
        if definition.is_collection() {
            return Err(wrong_cardinality(source).into());
        }
        if let Some(new) = new {
            self.check_related(definition, new)?;
        }
        let opposite = self.opposite(definition)?;
        let opposite_of = |object: &ObjectId| {
            RelationEndPointId::new(object.clone(), opposite.property.clone())
        };

        let old = self.require_single(source)?.current().cloned();
        if old.as_ref() == new {
            let mut touched = vec![source.clone()];
            if let Some(new) = new {
                let gained = opposite_of(new);
                self.require(&gained)?;
                touched.push(gained);
            }
            return Ok(RelationChange::touch_only(touched));
        }

        let mut change = RelationChange::default();
        change.notified.push(EndPointModification::SetObject {
            end_point: source.clone(),
            old: old.clone(),
            new: new.cloned(),
        });

        let mut previous_partner = None;
        if let Some(new) = new {
            let gained = opposite_of(new);
            if opposite.is_collection() {
                let index = self.require_collection(&gained)?.current().len();
                change.notified.push(EndPointModification::AddItem {
                    end_point: gained,
                    index,
                    item: source.object.clone(),
                });
            } else {
                previous_partner = self.require_single(&gained)?.current().cloned();
                change.notified.push(EndPointModification::SetObject {
                    end_point: gained,
                    old: previous_partner.clone(),
                    new: Some(source.object.clone()),
                });
            }
        }

        if let Some(old) = &old {
            let lost = opposite_of(old);
            if opposite.is_collection() {
                self.require_collection(&lost)?;
                change.notified.push(EndPointModification::RemoveItem {
                    end_point: lost,
                    item: source.object.clone(),
                });
            } else {
                self.require_single(&lost)?;
                change.notified.push(EndPointModification::SetObject {
                    end_point: lost,
                    old: Some(source.object.clone()),
                    new: None,
                });
            }
        }

        if let Some(partner) = previous_partner.filter(|p| *p != source.object) {
            let partner_end_point = RelationEndPointId::new(partner, source.property.clone());
            self.require_single(&partner_end_point)?;
            change.notified.push(EndPointModification::SetObject {
                end_point: partner_end_point,
                old: new.cloned(),
                new: None,
            });
        }

        Ok(change)
    }

    fn collection_context(
        &self,
        collection: &RelationEndPointId,
        item: Option<&ObjectId>,
    ) -> std::result::Result<(RelationEndPointDefinition, &CollectionEndPoint), Pending> {
        let definition = self.definition(collection)?;
        if !definition.is_collection() {
            return Err(wrong_cardinality(collection).into());
        }
        if let Some(item) = item {
            self.check_related(definition, item)?;
        }
        let opposite = self.opposite(definition)?;
        Ok((opposite, self.require_collection(collection)?))
    }

    /// Plans inserting `item` into a collection end point at `index`.
    ///
    /// Notification order: the item's foreign-key end point, the collection,
    /// then the collection that loses the item.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateItem`, `IndexOutOfBounds`, `TypeMismatch`, or `WrongCardinality`.
    pub fn plan_insert(
        &self,
        collection: &RelationEndPointId,
        index: usize,
        item: &ObjectId,
    ) -> Result<Plan> {
        finish(self.insert_change(collection, index, item))
    }

    fn insert_change(
        &self,
        collection: &RelationEndPointId,
        index: usize,
        item: &ObjectId,
    ) -> Planned {
        let (opposite, end_point) = self.collection_context(collection, Some(item))?;
        let items = end_point.current();
        if items.contains(item) {
            return Err(Error::new(ErrorKind::DuplicateItem(item.clone())).into());
        }
        if index > items.len() {
            return Err(Error::new(ErrorKind::IndexOutOfBounds {
                index,
                length: items.len(),
            })
            .into());
        }

        let owner = RelationEndPointId::new(item.clone(), opposite.property.clone());
        let previous = self.require_single(&owner)?.current().cloned();

        let mut change = RelationChange::default();
        change.notified.push(EndPointModification::SetObject {
            end_point: owner,
            old: previous.clone(),
            new: Some(collection.object.clone()),
        });
        change.notified.push(EndPointModification::AddItem {
            end_point: collection.clone(),
            index,
            item: item.clone(),
        });
        if let Some(previous) = previous {
            let lost = RelationEndPointId::new(previous, collection.property.clone());
            self.require_collection(&lost)?;
            change.notified.push(EndPointModification::RemoveItem {
                end_point: lost,
                item: item.clone(),
            });
        }
        Ok(change)
    }

    /// Plans removing `item` from a collection end point.
    ///
    /// Notification order: the item's foreign-key end point, then the collection.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound` or `WrongCardinality`.
    pub fn plan_remove(&self, collection: &RelationEndPointId, item: &ObjectId) -> Result<Plan> {
        finish(self.remove_change(collection, item))
    }

    fn remove_change(&self, collection: &RelationEndPointId, item: &ObjectId) -> Planned {
        let (opposite, end_point) = self.collection_context(collection, None)?;
        if !end_point.current().contains(item) {
            return Err(Error::new(ErrorKind::ItemNotFound(item.clone())).into());
        }
        let owner = RelationEndPointId::new(item.clone(), opposite.property.clone());
        self.require_single(&owner)?;

        let mut change = RelationChange::default();
        change.notified.push(EndPointModification::SetObject {
            end_point: owner,
            old: Some(collection.object.clone()),
            new: None,
        });
        change.notified.push(EndPointModification::RemoveItem {
            end_point: collection.clone(),
            item: item.clone(),
        });
        Ok(change)
    }

    /// Plans replacing the item at `index` of a collection end point.
    ///
    /// Notification order: the new item's foreign-key end point, the
    /// collection, the replaced item's foreign-key end point, then the
    /// collection that loses the new item. Replacing an item with itself
    /// only touches.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds`, `DuplicateItem`, `TypeMismatch`, or `WrongCardinality`.
    pub fn plan_replace(
        &self,
        collection: &RelationEndPointId,
        index: usize,
        item: &ObjectId,
    ) -> Result<Plan> {
        finish(self.replace_change(collection, index, item))
    }

    fn replace_change(
        &self,
        collection: &RelationEndPointId,
        index: usize,
        item: &ObjectId,
    ) -> Planned {
        let (opposite, end_point) = self.collection_context(collection, Some(item))?;
        let items = end_point.current();
        let replaced = items
            .get(index)
            .map(|handle| handle.id().clone())
            .ok_or_else(|| {
                Error::new(ErrorKind::IndexOutOfBounds {
                    index,
                    length: items.len(),
                })
            })?;

        let owner = RelationEndPointId::new(item.clone(), opposite.property.clone());
        if replaced == *item {
            self.require(&owner)?;
            return Ok(RelationChange::touch_only(vec![collection.clone(), owner]));
        }
        if items.contains(item) {
            return Err(Error::new(ErrorKind::DuplicateItem(item.clone())).into());
        }

        let previous = self.require_single(&owner)?.current().cloned();
        let replaced_owner = RelationEndPointId::new(replaced.clone(), opposite.property.clone());
        self.require_single(&replaced_owner)?;

        let mut change = RelationChange::default();
        change.notified.push(EndPointModification::SetObject {
            end_point: owner,
            old: previous.clone(),
            new: Some(collection.object.clone()),
        });
        change.notified.push(EndPointModification::ReplaceItem {
            end_point: collection.clone(),
            index,
            old_item: replaced.clone(),
            new_item: item.clone(),
        });
        change.notified.push(EndPointModification::SetObject {
            end_point: replaced_owner,
            old: Some(collection.object.clone()),
            new: None,
        });
        if let Some(previous) = previous {
            let lost = RelationEndPointId::new(previous, collection.property.clone());
            self.require_collection(&lost)?;
            change.notified.push(EndPointModification::RemoveItem {
                end_point: lost,
                item: item.clone(),
            });
        }
        Ok(change)
    }

    /// Plans clearing every relation of an object that is being deleted.
    ///
    /// The opposite end points are modified with notifications, in the
    /// declaration order of the object's relation properties and, within a
    /// collection, in item order. The object's own end points are cleared
    /// silently and marked touched.
    ///
    /// # Errors
    ///
    /// Returns a mapping lookup error.
    pub fn plan_delete(&self, object: &ObjectId) -> Result<Plan> {
        finish(self.delete_change(object))
    }

    fn delete_change(&self, object: &ObjectId) -> Planned {
        let mut change = RelationChange::default();
        for own in self.end_point_ids(object) {
            let opposite = self.opposite(self.definition(&own)?)?;
            let related = self.require(&own)?.related_ids();

            for other in &related {
                if other == object {
                    continue;
                }
                let other_end_point = RelationEndPointId::new(other.clone(), opposite.property.clone());
                if opposite.is_collection() {
                    self.require_collection(&other_end_point)?;
                    change.notified.push(EndPointModification::RemoveItem {
                        end_point: other_end_point,
                        item: object.clone(),
                    });
                } else {
                    self.require_single(&other_end_point)?;
                    change.notified.push(EndPointModification::SetObject {
                        end_point: other_end_point,
                        old: Some(object.clone()),
                        new: None,
                    });
                }
            }

            match self.require(&own)? {
                RelationEndPoint::VirtualCollection(_) => {
                    for item in related {
                        change.silent.push(EndPointModification::RemoveItem {
                            end_point: own.clone(),
                            item,
                        });
                    }
                }
                RelationEndPoint::Real(_) | RelationEndPoint::VirtualSingle(_) => {
                    if let Some(old) = related.into_iter().next() {
                        change.silent.push(EndPointModification::SetObject {
                            end_point: own.clone(),
                            old: Some(old),
                            new: None,
                        });
                    }
                }
            }
            change.touched.push(own);
        }
        Ok(change)
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    /// Runs a planned change through the three phases.
    ///
    /// The change is validated first (owners alive, collection operations
    /// legal); a validation error or a veto leaves everything unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDeleted`, `ObjectDiscarded`, collection errors, or
    /// `OperationCancelled`.
    pub fn execute(
        &mut self,
        change: &RelationChange,
        containers: &mut DataContainerMap,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        self.validate(change, containers)?;
        for event in change.before_events() {
            sink.before(&event)?;
        }
        self.apply(change, containers)?;
        for event in change.after_events() {
            sink.after(&event);
        }
        Ok(())
    }

    fn modifications<'a>(
        change: &'a RelationChange,
    ) -> impl Iterator<Item = &'a EndPointModification> {
        change.notified.iter().chain(change.silent.iter())
    }

    fn validate(&self, change: &RelationChange, containers: &DataContainerMap) -> Result<()> {
        let ids = Self::modifications(change)
            .map(EndPointModification::end_point)
            .chain(change.touched.iter());
        for id in ids {
            let container = containers
                .get(&id.object)
                .ok_or_else(|| Error::internal(format!("no data container for {}", id.object)))?;
            container.ensure_modifiable()?;
            if !self.end_points.contains_key(id) {
                return Err(missing_end_point(id));
            }
        }

        // Dry-run the collection operations in order on cheap copies.
        let mut scratch: HashMap<RelationEndPointId, DomainObjectCollection> = HashMap::new();
        for modification in Self::modifications(change) {
            let id = modification.end_point();
            let collection = match modification {
                EndPointModification::SetObject { .. } => continue,
                _ => scratch.entry(id.clone()).or_insert(
                    self.end_points
                        .get(id)
                        .and_then(RelationEndPoint::as_collection)
                        .map(|ep| ep.current().clone())
                        .ok_or_else(|| wrong_cardinality(id))?,
                ),
            };
            match modification {
                EndPointModification::SetObject { .. } => {}
                EndPointModification::AddItem { index, item, .. } => {
                    collection.insert(*index, self.handle(item.clone()))?;
                }
                EndPointModification::RemoveItem { item, .. } => {
                    if !collection.remove(item)? {
                        return Err(Error::new(ErrorKind::ItemNotFound(item.clone())));
                    }
                }
                EndPointModification::ReplaceItem {
                    index,
                    old_item,
                    new_item,
                    ..
                } => {
                    let previous = collection.set(*index, self.handle(new_item.clone()))?;
                    if previous.id() != old_item {
                        return Err(Error::internal(format!(
                            "{id}[{index}] holds {previous}, expected {old_item}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, change: &RelationChange, containers: &mut DataContainerMap) -> Result<()> {
        for modification in Self::modifications(change) {
            self.apply_one(modification, containers)?;
        }
        for id in &change.touched {
            let end_point = self.end_points.get_mut(id).ok_or_else(|| missing_end_point(id))?;
            end_point.touch();
            if let RelationEndPoint::Real(real) = end_point {
                let value = Value::from_object(real.current().cloned());
                mirror_foreign_key(containers, id, value)?;
            }
        }
        Ok(())
    }

    fn apply_one(
        &mut self,
        modification: &EndPointModification,
        containers: &mut DataContainerMap,
    ) -> Result<()> {
        let binding = self.binding;
        let id = modification.end_point();
        let end_point = self.end_points.get_mut(id).ok_or_else(|| missing_end_point(id))?;
        match modification {
            EndPointModification::SetObject { new, .. } => {
                let is_real = end_point.is_real();
                end_point
                    .as_object_mut()
                    .ok_or_else(|| wrong_cardinality(id))?
                    .set(new.clone());
                if is_real {
                    mirror_foreign_key(containers, id, Value::from_object(new.clone()))?;
                }
            }
            EndPointModification::AddItem { index, item, .. } => {
                end_point
                    .as_collection_mut()
                    .ok_or_else(|| wrong_cardinality(id))?
                    .current_mut()
                    .insert(*index, DomainObject::with_binding(item.clone(), binding))?;
            }
            EndPointModification::RemoveItem { item, .. } => {
                end_point
                    .as_collection_mut()
                    .ok_or_else(|| wrong_cardinality(id))?
                    .current_mut()
                    .remove(item)?;
            }
            EndPointModification::ReplaceItem {
                index, new_item, ..
            } => {
                end_point
                    .as_collection_mut()
                    .ok_or_else(|| wrong_cardinality(id))?
                    .current_mut()
                    .set(*index, DomainObject::with_binding(new_item.clone(), binding))?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Commit / Rollback
    // -------------------------------------------------------------------------

    /// Makes every current relation the original.
    pub fn commit_all(&mut self) {
        for (_, end_point) in self.end_points.iter_mut() {
            end_point.commit();
        }
    }

    /// Restores every original relation.
    pub fn rollback_all(&mut self) {
        for (_, end_point) in self.end_points.iter_mut() {
            end_point.rollback();
        }
    }

    /// Reverts to a snapshot taken with `clone()`.
    ///
    /// End points loaded after the snapshot are kept in their loaded state.
    pub fn restore(&mut self, snapshot: Self) {
        let mut restored = snapshot.end_points;
        for (id, end_point) in &self.end_points {
            if !restored.contains_key(id) {
                let mut end_point = end_point.clone();
                end_point.rollback();
                restored.insert(id.clone(), end_point);
            }
        }
        self.end_points = restored;
    }
}

fn mirror_foreign_key(
    containers: &mut DataContainerMap,
    id: &RelationEndPointId,
    value: Value,
) -> Result<()> {
    containers
        .get_mut(&id.object)
        .ok_or_else(|| Error::internal(format!("no data container for {}", id.object)))?
        .set_value(&id.property, value)
}
