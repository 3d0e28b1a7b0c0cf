//! The per-transaction owner of data containers and relation end points.
//!
//! The `DataManager` drives everything that needs storage: lazy loading of
//! objects and relation end points, delete (with cascades), commit, and
//! rollback. Relation changes are planned against the end point map, the
//! missing end points are loaded, and the finished plan is executed through
//! the three-phase protocol with the transaction's listeners as the sink.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use weft_data::{
    DataContainer, DataContainerMap, DomainObject, DomainObjectCollection, EventSink, ListenerRegistry,
    NullSink, ObjectState, Plan, RelationChange, RelationEndPoint, RelationEndPointId,
    RelationEndPointMap, TransactionEvent,
};
use weft_foundation::{
    ClassId, Error, ErrorKind, ObjectId, PropertyName, Result, Timestamp, TransactionId, Value,
};
use weft_mapping::MappingConfiguration;

use crate::config::TransactionConfig;
use crate::storage::{LoadedObject, ObjectRecord, PersistenceBatch, StorageProvider};
use crate::traversal::{CascadeDeleteStrategy, GraphTraverser, RelationGraph, TraversalStrategy};

fn wrong_cardinality(id: &RelationEndPointId) -> Error {
    Error::new(ErrorKind::WrongCardinality(id.property.clone()))
}

/// Owns the data of one transaction.
pub struct DataManager {
    transaction: TransactionId,
    mapping: Arc<MappingConfiguration>,
    config: TransactionConfig,
    storage: Rc<dyn StorageProvider>,
    containers: DataContainerMap,
    end_points: RelationEndPointMap,
    listeners: ListenerRegistry,
    enlisted: HashSet<ObjectId>,
}

impl DataManager {
    /// Creates an empty data manager.
    #[must_use]
    pub fn new(
        transaction: TransactionId,
        mapping: Arc<MappingConfiguration>,
        storage: Rc<dyn StorageProvider>,
        config: TransactionConfig,
    ) -> Self {
        let mut listeners = ListenerRegistry::new();
        listeners.set_trace_events(config.trace_events);
        let end_points =
            RelationEndPointMap::new(Arc::clone(&mapping), transaction, config.bind_objects);
        Self {
            transaction,
            mapping,
            config,
            storage,
            containers: DataContainerMap::new(),
            end_points,
            listeners,
            enlisted: HashSet::new(),
        }
    }

    /// Returns the owning transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction
    }

    /// Returns the mapping.
    #[must_use]
    pub fn mapping(&self) -> &Arc<MappingConfiguration> {
        &self.mapping
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    pub(crate) fn storage(&self) -> &Rc<dyn StorageProvider> {
        &self.storage
    }

    /// Returns the data containers.
    #[must_use]
    pub fn containers(&self) -> &DataContainerMap {
        &self.containers
    }

    /// Returns the relation end points.
    #[must_use]
    pub fn end_points(&self) -> &RelationEndPointMap {
        &self.end_points
    }

    /// Returns the listeners.
    pub fn listeners_mut(&mut self) -> &mut ListenerRegistry {
        &mut self.listeners
    }

    /// Creates a handle for an object of this transaction.
    #[must_use]
    pub fn handle(&self, id: ObjectId) -> DomainObject {
        self.end_points.handle(id)
    }

    /// Returns true if the object was loaded, created, or handed out here.
    #[must_use]
    pub fn is_enlisted(&self, id: &ObjectId) -> bool {
        self.enlisted.contains(id) || self.containers.contains(id)
    }

    /// Makes an object usable here without loading it, and returns its handle.
    pub fn enlist(&mut self, id: ObjectId) -> DomainObject {
        self.enlisted.insert(id.clone());
        self.handle(id)
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Returns the container of an object, loading it on first access.
    ///
    /// # Errors
    ///
    /// Returns `UnknownClass`, `ObjectNotFound`, or a storage failure.
    pub fn ensure_loaded(&mut self, id: &ObjectId) -> Result<&DataContainer> {
        if !self.containers.contains(id) {
            self.load_object(id)?;
        }
        self.containers
            .get(id)
            .ok_or_else(|| Error::internal(format!("{id} missing after load")))
    }

    fn load_object(&mut self, id: &ObjectId) -> Result<()> {
        let class = self.mapping.class(&id.class_id)?;
        let loaded = self.storage.load(id)?;
        let container = DataContainer::loaded(id.clone(), class, loaded.values, loaded.timestamp)?;
        self.end_points.register_real_end_points(&container)?;
        self.containers.register(container)?;
        self.enlisted.insert(id.clone());
        tracing::debug!(transaction = %self.transaction, object = %id, "object loaded");
        self.listeners.after(&TransactionEvent::ObjectsLoaded {
            objects: vec![id.clone()],
        });
        Ok(())
    }

    /// Loads a relation end point unless it is loaded already.
    ///
    /// Loading the owner registers its real end points; a virtual end point
    /// is fetched from storage once.
    ///
    /// # Errors
    ///
    /// Returns a mapping lookup error, `ObjectDiscarded`, or a storage failure.
    pub fn load_end_point(&mut self, id: &RelationEndPointId) -> Result<()> {
        if self.end_points.contains(id) {
            return Ok(());
        }
        let definition = self.end_points.definition(id)?.clone();
        self.ensure_loaded(&id.object)?.ensure_not_discarded()?;
        if self.end_points.contains(id) {
            return Ok(());
        }
        if definition.is_real() {
            return Err(Error::internal(format!("real end point {id} missing after load")));
        }

        let related = if definition.is_collection() {
            self.storage.load_related_ids(id, &definition)?
        } else {
            self.storage
                .load_related_id(id, &definition)?
                .into_iter()
                .collect()
        };
        tracing::debug!(
            transaction = %self.transaction,
            end_point = %id,
            related = related.len(),
            "end point loaded"
        );
        self.end_points.register_virtual(id.clone(), related)
    }

    fn container(&mut self, id: &ObjectId) -> Result<&DataContainer> {
        let container = self.ensure_loaded(id)?;
        container.ensure_not_discarded()?;
        Ok(container)
    }

    fn container_mut(&mut self, id: &ObjectId) -> Result<&mut DataContainer> {
        self.containers
            .get_mut(id)
            .ok_or_else(|| Error::internal(format!("no data container for {id}")))
    }

    fn end_point(&self, id: &RelationEndPointId) -> Result<&RelationEndPoint> {
        self.end_points
            .get(id)
            .ok_or_else(|| Error::internal(format!("end point {id} is not registered")))
    }

    // =========================================================================
    // Protocol Plumbing
    // =========================================================================

    /// Plans a relation change, loading end points until the plan is ready.
    fn plan(
        &mut self,
        planner: impl Fn(&RelationEndPointMap) -> Result<Plan>,
    ) -> Result<RelationChange> {
        let mut requested = HashSet::new();
        loop {
            match planner(&self.end_points)? {
                Plan::Ready(change) => return Ok(change),
                Plan::Load(id) => {
                    if !requested.insert(id.clone()) {
                        return Err(Error::internal(format!(
                            "end point {id} still missing after loading it"
                        )));
                    }
                    self.load_end_point(&id)?;
                }
            }
        }
    }

    fn execute(&mut self, change: &RelationChange) -> Result<()> {
        self.end_points
            .execute(change, &mut self.containers, &mut self.listeners)
    }

    fn execute_silently(&mut self, change: &RelationChange) -> Result<()> {
        self.end_points
            .execute(change, &mut self.containers, &mut NullSink)
    }

    /// Runs a multi-step operation; on error every container and end point
    /// is restored to its state before the operation.
    fn atomically<T>(&mut self, operation: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let containers = self.containers.clone();
        let end_points = self.end_points.clone();
        let result = operation(self);
        if result.is_err() {
            self.containers.restore(containers);
            self.end_points.restore(end_points);
        }
        result
    }

    // =========================================================================
    // Objects and Properties
    // =========================================================================

    /// Creates a new object.
    ///
    /// # Errors
    ///
    /// Returns `UnknownClass` or a storage failure from ID allocation.
    pub fn new_object(&mut self, class_id: &ClassId) -> Result<ObjectId> {
        let mapping = Arc::clone(&self.mapping);
        let class = mapping.class(class_id)?;
        let id = self.storage.create_new_object_id(class_id)?;
        if self.containers.contains(&id) {
            return Err(Error::internal(format!("storage handed out existing id {id}")));
        }
        self.end_points.register_new_object(&id)?;
        self.containers
            .register(DataContainer::new_object(id.clone(), class))?;
        self.enlisted.insert(id.clone());
        tracing::debug!(transaction = %self.transaction, object = %id, "object created");
        Ok(id)
    }

    /// Computes the state of an object, changed virtual end points included.
    ///
    /// # Errors
    ///
    /// Returns a load error.
    pub fn state(&mut self, id: &ObjectId) -> Result<ObjectState> {
        let state = self.ensure_loaded(id)?.state();
        if state == ObjectState::Unchanged && self.end_points.has_changed_virtual_end_points(id) {
            return Ok(ObjectState::Changed);
        }
        Ok(state)
    }

    /// Returns the current value of a stored property.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded`, `UnknownProperty`, `RelationProperty`, or a load error.
    pub fn value(&mut self, id: &ObjectId, property: &PropertyName) -> Result<Value> {
        self.mapping.property(&id.class_id, property)?;
        Ok(self.container(id)?.value(property)?.clone())
    }

    /// Returns the last committed value of a stored property.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded`, `UnknownProperty`, `RelationProperty`, or a load error.
    pub fn original_value(&mut self, id: &ObjectId, property: &PropertyName) -> Result<Value> {
        self.mapping.property(&id.class_id, property)?;
        Ok(self.container(id)?.original_value(property)?.clone())
    }

    /// Returns true if a property or relation was assigned since the last commit.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded`, `UnknownProperty`, or a load error.
    pub fn has_been_touched(&mut self, id: &ObjectId, property: &PropertyName) -> Result<bool> {
        let is_relation = self
            .mapping
            .class(&id.class_id)?
            .end_point(property)
            .is_some();
        if !is_relation {
            return self.container(id)?.has_been_touched(property);
        }
        let end_point = RelationEndPointId::new(id.clone(), property.clone());
        self.container(id)?;
        self.load_end_point(&end_point)?;
        Ok(self.end_point(&end_point)?.has_been_touched())
    }

    /// Assigns a stored scalar property.
    ///
    /// Raises `PropertyChanging`/`PropertyChanged` when the value differs;
    /// assigning the current value only touches the property.
    ///
    /// # Errors
    ///
    /// Returns `RelationProperty` for foreign keys, a validation error,
    /// `ObjectDeleted`, `ObjectDiscarded`, or `OperationCancelled`.
    pub fn set_value(&mut self, id: &ObjectId, property: &PropertyName, value: Value) -> Result<()> {
        let mapping = Arc::clone(&self.mapping);
        let definition = mapping.property(&id.class_id, property)?;
        if definition.is_foreign_key() {
            return Err(Error::new(ErrorKind::RelationProperty(property.clone())));
        }
        mapping.check_value(definition, &value)?;

        let container = self.ensure_loaded(id)?;
        container.ensure_modifiable()?;
        let old_value = container.value(property)?.clone();
        if old_value == value {
            return self.container_mut(id)?.set_value(property, value);
        }

        self.listeners.before(&TransactionEvent::PropertyChanging {
            object: id.clone(),
            property: property.clone(),
            old_value: old_value.clone(),
            new_value: value.clone(),
        })?;
        self.container_mut(id)?.set_value(property, value.clone())?;
        self.listeners.after(&TransactionEvent::PropertyChanged {
            object: id.clone(),
            property: property.clone(),
            old_value,
            new_value: value,
        });
        Ok(())
    }

    /// Forces an object into the `Changed` state.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDeleted`, `ObjectDiscarded`, or a load error.
    pub fn mark_as_changed(&mut self, id: &ObjectId) -> Result<()> {
        self.ensure_loaded(id)?;
        self.container_mut(id)?.mark_as_changed()
    }

    /// Returns the concurrency token of an object.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded` or a load error.
    pub fn timestamp(&mut self, id: &ObjectId) -> Result<Option<Timestamp>> {
        Ok(self.container(id)?.timestamp())
    }

    // =========================================================================
    // Relations
    // =========================================================================

    fn relation_source(&mut self, id: &RelationEndPointId, include_deleted: bool) -> Result<()> {
        let container = self.container(&id.object)?;
        if !include_deleted && container.is_deleted() {
            return Err(Error::object_deleted(id.object.clone()));
        }
        self.load_end_point(id)
    }

    fn collection(&self, id: &RelationEndPointId) -> Result<&DomainObjectCollection> {
        self.end_point(id)?
            .as_collection()
            .map(|end_point| end_point.current())
            .ok_or_else(|| wrong_cardinality(id))
    }

    /// Returns the object related through a single-valued end point.
    ///
    /// With `include_deleted` the end point of a deleted object can be read.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDeleted`, `ObjectDiscarded`, `WrongCardinality`, or a load error.
    pub fn related_object(
        &mut self,
        id: &RelationEndPointId,
        include_deleted: bool,
    ) -> Result<Option<ObjectId>> {
        self.relation_source(id, include_deleted)?;
        self.end_point(id)?
            .as_object()
            .map(|end_point| end_point.current().cloned())
            .ok_or_else(|| wrong_cardinality(id))
    }

    /// Returns the last committed related object of a single-valued end point.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded`, `WrongCardinality`, or a load error.
    pub fn original_related_object(&mut self, id: &RelationEndPointId) -> Result<Option<ObjectId>> {
        self.relation_source(id, true)?;
        self.end_point(id)?
            .as_object()
            .map(|end_point| end_point.original().cloned())
            .ok_or_else(|| wrong_cardinality(id))
    }

    /// Returns a read-only snapshot of a collection end point.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDeleted`, `ObjectDiscarded`, `WrongCardinality`, or a load error.
    pub fn related_objects(&mut self, id: &RelationEndPointId) -> Result<DomainObjectCollection> {
        self.relation_source(id, false)?;
        Ok(self.collection(id)?.as_read_only())
    }

    /// Returns the original collection of a collection end point.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded`, `WrongCardinality`, or a load error.
    pub fn original_related_objects(&mut self, id: &RelationEndPointId) -> Result<DomainObjectCollection> {
        self.relation_source(id, true)?;
        self.end_point(id)?
            .as_collection()
            .map(|end_point| end_point.original().clone())
            .ok_or_else(|| wrong_cardinality(id))
    }

    /// Sets a single-valued end point through the relation change protocol.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch`, `WrongCardinality`, `ObjectDeleted`,
    /// `ObjectDiscarded`, `OperationCancelled`, or a load error.
    pub fn set_related_object(&mut self, source: &RelationEndPointId, new: Option<&ObjectId>) -> Result<()> {
        self.container(&source.object)?.ensure_modifiable()?;
        let change = self.plan(|map| map.plan_set_related_object(source, new))?;
        self.execute(&change)
    }

    /// Inserts into a collection end point; `None` appends.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateItem`, `IndexOutOfBounds`, `TypeMismatch`,
    /// `ObjectDeleted`, `ObjectDiscarded`, `OperationCancelled`, or a load error.
    pub fn insert_related(
        &mut self,
        collection: &RelationEndPointId,
        index: Option<usize>,
        item: &ObjectId,
    ) -> Result<()> {
        self.relation_source(collection, false)?;
        let index = match index {
            Some(index) => index,
            None => self.collection(collection)?.len(),
        };
        let change = self.plan(|map| map.plan_insert(collection, index, item))?;
        self.execute(&change)
    }

    /// Removes from a collection end point. Returns false if the item was not contained.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDeleted`, `ObjectDiscarded`, `OperationCancelled`, or a load error.
    pub fn remove_related(&mut self, collection: &RelationEndPointId, item: &ObjectId) -> Result<bool> {
        self.relation_source(collection, false)?;
        if !self.collection(collection)?.contains(item) {
            return Ok(false);
        }
        let change = self.plan(|map| map.plan_remove(collection, item))?;
        self.execute(&change)?;
        Ok(true)
    }

    /// Replaces the item at `index` of a collection end point and returns the replaced item.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds`, `DuplicateItem`, `TypeMismatch`,
    /// `ObjectDeleted`, `ObjectDiscarded`, `OperationCancelled`, or a load error.
    pub fn replace_related(
        &mut self,
        collection: &RelationEndPointId,
        index: usize,
        item: &ObjectId,
    ) -> Result<ObjectId> {
        self.relation_source(collection, false)?;
        let items = self.collection(collection)?;
        let replaced = items
            .get(index)
            .map(|handle| handle.id().clone())
            .ok_or_else(|| {
                Error::new(ErrorKind::IndexOutOfBounds {
                    index,
                    length: items.len(),
                })
            })?;
        let change = self.plan(|map| map.plan_replace(collection, index, item))?;
        self.execute(&change)?;
        Ok(replaced)
    }

    /// Removes every item of a collection end point, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDeleted`, `ObjectDiscarded`, `OperationCancelled`, or a load error.
    pub fn clear_related(&mut self, collection: &RelationEndPointId) -> Result<()> {
        self.relation_source(collection, false)?;
        let items = self.collection(collection)?.ids();
        self.atomically(|manager| {
            for item in &items {
                let change = manager.plan(|map| map.plan_remove(collection, item))?;
                manager.execute(&change)?;
            }
            Ok(())
        })
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Deletes an object, cascading through end points declared `Cascade`.
    ///
    /// Each object raises `Deleting`, has its relations cleared through the
    /// protocol, changes to `Deleted` (or `Discarded` if new), and raises
    /// `Deleted`. A cascade is all or nothing.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDeleted`, `ObjectDiscarded`, `OperationCancelled`, or a load error.
    pub fn delete(&mut self, id: &ObjectId) -> Result<()> {
        self.container(id)?.ensure_modifiable()?;
        let targets = if self.config.cascade_deletes {
            let strategy = CascadeDeleteStrategy::new(Arc::clone(&self.mapping));
            GraphTraverser::new(&strategy).traverse_ordered(id, self)?
        } else {
            vec![id.clone()]
        };
        tracing::debug!(
            transaction = %self.transaction,
            object = %id,
            cascaded = targets.len().saturating_sub(1),
            "deleting"
        );
        if let [single] = targets.as_slice() {
            return self.delete_one(single);
        }
        self.atomically(|manager| targets.iter().try_for_each(|target| manager.delete_one(target)))
    }

    fn delete_one(&mut self, id: &ObjectId) -> Result<()> {
        self.container(id)?.ensure_modifiable()?;
        let change = self.plan(|map| map.plan_delete(id))?;
        self.listeners.before(&TransactionEvent::Deleting { object: id.clone() })?;
        self.execute(&change)?;
        self.container_mut(id)?.delete()?;
        self.listeners.after(&TransactionEvent::Deleted { object: id.clone() });
        Ok(())
    }

    // =========================================================================
    // Commit / Rollback
    // =========================================================================

    /// New, changed, and deleted objects, including objects whose only
    /// change is a virtual end point.
    #[must_use]
    pub fn dirty_objects(&self) -> Vec<ObjectId> {
        let mut ids = self.containers.changed_ids();
        ids.extend(
            self.end_points
                .changed_virtual_owners()
                .into_iter()
                .filter(|id| {
                    self.containers
                        .get(id)
                        .is_some_and(|c| c.state() == ObjectState::Unchanged)
                }),
        );
        ids.sort();
        ids.dedup();
        ids
    }

    /// Persists every change atomically.
    ///
    /// `Committing` may veto. Mandatory relations are validated (when
    /// configured) before anything is written. A storage failure leaves the
    /// transaction exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns `OperationCancelled`, `MandatoryRelationNotSet`, or a storage failure.
    pub fn commit(&mut self) -> Result<()> {
        let dirty = self.dirty_objects();
        self.listeners.before(&TransactionEvent::Committing {
            objects: dirty.clone(),
        })?;
        if self.config.validate_mandatory_relations {
            self.validate_mandatory_relations(&dirty)?;
        }

        let batch = self.persistence_batch(&dirty)?;
        let timestamps = if batch.is_empty() {
            HashMap::new()
        } else {
            self.storage.save(&batch)?
        };

        self.containers.commit_all(&timestamps);
        self.end_points.commit_all();
        self.forget_discarded();
        tracing::debug!(
            transaction = %self.transaction,
            new = batch.new.len(),
            changed = batch.changed.len(),
            deleted = batch.deleted.len(),
            "committed"
        );
        self.listeners.after(&TransactionEvent::Committed { objects: dirty });
        Ok(())
    }

    /// Discards every uncommitted change without contacting storage.
    ///
    /// # Errors
    ///
    /// Returns `OperationCancelled` if a `RollingBack` listener vetoes.
    pub fn rollback(&mut self) -> Result<()> {
        let dirty = self.dirty_objects();
        self.listeners.before(&TransactionEvent::RollingBack {
            objects: dirty.clone(),
        })?;
        self.containers.rollback_all();
        self.end_points.rollback_all();
        self.forget_discarded();
        tracing::debug!(transaction = %self.transaction, objects = dirty.len(), "rolled back");
        self.listeners.after(&TransactionEvent::RolledBack { objects: dirty });
        Ok(())
    }

    fn validate_mandatory_relations(&mut self, dirty: &[ObjectId]) -> Result<()> {
        let mapping = Arc::clone(&self.mapping);
        for id in dirty {
            if !matches!(self.state(id)?, ObjectState::New | ObjectState::Changed) {
                continue;
            }
            let class = mapping.class(&id.class_id)?;
            for definition in class.end_points.iter().filter(|d| d.mandatory) {
                let end_point = RelationEndPointId::new(id.clone(), definition.property.clone());
                self.load_end_point(&end_point)?;
                if self.end_point(&end_point)?.related_ids().is_empty() {
                    return Err(Error::new(ErrorKind::MandatoryRelationNotSet {
                        object: id.clone(),
                        property: definition.property.clone(),
                    }));
                }
            }
        }
        Ok(())
    }

    fn persistence_batch(&self, dirty: &[ObjectId]) -> Result<PersistenceBatch> {
        let mut batch = PersistenceBatch::default();
        for id in dirty {
            let container = self
                .containers
                .get(id)
                .ok_or_else(|| Error::internal(format!("no data container for {id}")))?;
            let record = ObjectRecord {
                id: id.clone(),
                values: container.values(),
                timestamp: container.timestamp(),
            };
            match container.state() {
                ObjectState::New => batch.new.push(record),
                ObjectState::Deleted => batch.deleted.push(record),
                ObjectState::Changed | ObjectState::Unchanged => batch.changed.push(record),
                ObjectState::Discarded => {}
            }
        }
        Ok(batch)
    }

    fn forget_discarded(&mut self) {
        let discarded: Vec<ObjectId> = self
            .containers
            .iter()
            .filter(|c| c.is_discarded())
            .map(|c| c.id().clone())
            .collect();
        for id in &discarded {
            self.end_points.unregister_object(id);
        }
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Walks the object graph from `root`, loading relations as needed.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded` or a load error.
    pub fn traverse(
        &mut self,
        root: &ObjectId,
        strategy: &dyn TraversalStrategy,
    ) -> Result<HashSet<ObjectId>> {
        self.container(root)?;
        let max_depth = self.config.max_traversal_depth;
        GraphTraverser::new(strategy)
            .with_max_depth(max_depth)
            .traverse(root, self)
    }

    // =========================================================================
    // Sub-Transaction Support
    // =========================================================================

    /// Current values of an object as a child transaction sees them.
    ///
    /// Objects deleted here are invisible to the child.
    pub(crate) fn load_for_child(&mut self, id: &ObjectId) -> Result<LoadedObject> {
        let container = self.ensure_loaded(id)?;
        container.ensure_modifiable()?;
        Ok(LoadedObject {
            values: container.values(),
            timestamp: container.timestamp().unwrap_or(Timestamp(0)),
        })
    }

    /// Current related objects of an end point as a child transaction sees them.
    pub(crate) fn related_ids_for_child(&mut self, id: &RelationEndPointId) -> Result<Vec<ObjectId>> {
        self.load_end_point(id)?;
        Ok(self.end_point(id)?.related_ids())
    }

    /// Applies the commit of a child transaction, silently and all or nothing.
    pub(crate) fn apply_child_batch(&mut self, batch: &PersistenceBatch) -> Result<()> {
        self.atomically(|manager| manager.apply_child_batch_unchecked(batch))?;
        tracing::debug!(
            transaction = %self.transaction,
            records = batch.len(),
            "sub-transaction committed into parent"
        );
        Ok(())
    }

    fn apply_child_batch_unchecked(&mut self, batch: &PersistenceBatch) -> Result<()> {
        let mapping = Arc::clone(&self.mapping);

        for record in &batch.new {
            let class = mapping.class(&record.id.class_id)?;
            if self.containers.contains(&record.id) {
                return Err(Error::internal(format!("{} already exists in parent", record.id)));
            }
            self.end_points.register_new_object(&record.id)?;
            self.containers
                .register(DataContainer::new_object(record.id.clone(), class))?;
            self.enlisted.insert(record.id.clone());
        }

        // Scalars first, then foreign keys through the protocol so both
        // sides of every relation stay consistent.
        for record in batch.new.iter().chain(&batch.changed) {
            self.ensure_loaded(&record.id)?;
            for (property, value) in &record.values {
                if mapping.property(&record.id.class_id, property)?.is_foreign_key() {
                    continue;
                }
                let container = self.container_mut(&record.id)?;
                if container.value(property)? != value {
                    container.set_value(property, value.clone())?;
                }
            }
        }
        for record in &batch.changed {
            self.container_mut(&record.id)?.mark_as_changed()?;
        }
        for record in batch.new.iter().chain(&batch.changed) {
            for (property, value) in &record.values {
                if !mapping.property(&record.id.class_id, property)?.is_foreign_key() {
                    continue;
                }
                let current = self.container(&record.id)?.value(property)?.clone();
                if current == *value {
                    continue;
                }
                let source = RelationEndPointId::new(record.id.clone(), property.clone());
                let change = self.plan(|map| map.plan_set_related_object(&source, value.as_object()))?;
                self.execute_silently(&change)?;
            }
        }

        for record in &batch.deleted {
            let change = self.plan(|map| map.plan_delete(&record.id))?;
            self.execute_silently(&change)?;
            self.container_mut(&record.id)?.delete()?;
        }
        Ok(())
    }
}

impl RelationGraph for DataManager {
    fn relation_properties(&self, object: &ObjectId) -> Result<Vec<PropertyName>> {
        Ok(self
            .mapping
            .class(&object.class_id)?
            .relation_properties()
            .cloned()
            .collect())
    }

    fn related_objects(&mut self, object: &ObjectId, property: &PropertyName) -> Result<Vec<ObjectId>> {
        let end_point = RelationEndPointId::new(object.clone(), property.clone());
        self.container(object)?;
        self.load_end_point(&end_point)?;
        Ok(self.end_point(&end_point)?.related_ids())
    }
}

impl std::fmt::Debug for DataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataManager")
            .field("transaction", &self.transaction)
            .field("containers", &self.containers.len())
            .field("end_points", &self.end_points.len())
            .field("enlisted", &self.enlisted.len())
            .field("listeners", &self.listeners)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
