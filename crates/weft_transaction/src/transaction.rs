//! Client transactions: the unit-of-work API over object handles.
//!
//! A [`ClientTransaction`] is a cheap, clonable handle to one unit of work.
//! Every call checks that the handles it receives may be used here, borrows
//! the transaction's [`DataManager`], and fails with `ReentrancyViolation`
//! when the manager is already busy (a listener calling back into the
//! transaction that raised the event).
//!
//! Sub-transactions load from their parent's current state and commit into
//! it. While a child is alive the parent only serves reads.

use std::cell::{Cell, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use weft_data::{
    DomainObject, DomainObjectCollection, ListenerId, ObjectState, RelationEndPointId,
    TransactionListener,
};
use weft_foundation::{
    ClassId, Error, ErrorKind, ObjectId, PropertyName, Result, Timestamp, TransactionId, Value,
};
use weft_mapping::{MappingConfiguration, RelationEndPointDefinition};

use crate::config::TransactionConfig;
use crate::data_manager::DataManager;
use crate::relation_collection::RelationCollection;
use crate::storage::{LoadedObject, PersistenceBatch, StorageProvider};
use crate::traversal::TraversalStrategy;

// =============================================================================
// Client Transaction
// =============================================================================

struct TransactionInner {
    id: TransactionId,
    mapping: Arc<MappingConfiguration>,
    config: TransactionConfig,
    manager: RefCell<DataManager>,
    parent: Option<ClientTransaction>,
    child_active: Cell<bool>,
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        if let Some(parent) = &self.parent {
            parent.inner.child_active.set(false);
            tracing::debug!(transaction = %self.id, parent = %parent.id(), "sub-transaction released");
        }
    }
}

/// A unit of work over persistable objects.
///
/// Clones share the same transaction.
#[derive(Clone)]
pub struct ClientTransaction {
    inner: Rc<TransactionInner>,
}

impl ClientTransaction {
    /// Creates a root transaction with the default configuration.
    #[must_use]
    pub fn new(mapping: Arc<MappingConfiguration>, storage: Rc<dyn StorageProvider>) -> Self {
        Self::with_config(mapping, storage, TransactionConfig::default())
    }

    /// Creates a root transaction.
    #[must_use]
    pub fn with_config(
        mapping: Arc<MappingConfiguration>,
        storage: Rc<dyn StorageProvider>,
        config: TransactionConfig,
    ) -> Self {
        Self::create(mapping, storage, config, None)
    }

    /// Creates a binding transaction: its handles cannot be used anywhere else.
    #[must_use]
    pub fn new_binding(mapping: Arc<MappingConfiguration>, storage: Rc<dyn StorageProvider>) -> Self {
        Self::with_config(mapping, storage, TransactionConfig::binding())
    }

    fn create(
        mapping: Arc<MappingConfiguration>,
        storage: Rc<dyn StorageProvider>,
        config: TransactionConfig,
        parent: Option<ClientTransaction>,
    ) -> Self {
        let id = TransactionId::next();
        let manager = DataManager::new(id, Arc::clone(&mapping), storage, config.clone());
        tracing::debug!(
            transaction = %id,
            parent = ?parent.as_ref().map(ClientTransaction::id),
            binding = config.bind_objects,
            "transaction created"
        );
        Self {
            inner: Rc::new(TransactionInner {
                id,
                mapping,
                config,
                manager: RefCell::new(manager),
                parent,
                child_active: Cell::new(false),
            }),
        }
    }

    /// Returns the transaction identity.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.inner.id
    }

    /// Returns the parent of a sub-transaction.
    #[must_use]
    pub fn parent(&self) -> Option<&ClientTransaction> {
        self.inner.parent.as_ref()
    }

    /// Returns the mapping.
    #[must_use]
    pub fn mapping(&self) -> &Arc<MappingConfiguration> {
        &self.inner.mapping
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &TransactionConfig {
        &self.inner.config
    }

    /// Returns true for binding transactions.
    #[must_use]
    pub fn is_binding(&self) -> bool {
        self.inner.config.bind_objects
    }

    /// Returns true while a sub-transaction of this transaction is alive.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.inner.child_active.get()
    }

    // -------------------------------------------------------------------------
    // Access Guards
    // -------------------------------------------------------------------------

    fn manager(&self) -> Result<RefMut<'_, DataManager>> {
        self.inner
            .manager
            .try_borrow_mut()
            .map_err(|_| Error::reentrancy())
    }

    fn writable(&self) -> Result<RefMut<'_, DataManager>> {
        if self.is_read_only() {
            return Err(Error::new(ErrorKind::ReadOnlyTransaction(self.id())));
        }
        self.manager()
    }

    fn check_handle(&self, manager: &DataManager, object: &DomainObject) -> Result<()> {
        if object.usable_in(self.id()) && manager.is_enlisted(object.id()) {
            return Ok(());
        }
        Err(Error::cross_transaction(object.id().clone(), self.id()))
    }

    fn end_point(object: &DomainObject, property: impl Into<PropertyName>) -> RelationEndPointId {
        RelationEndPointId::new(object.id().clone(), property)
    }

    fn enlist_all(manager: &mut DataManager, collection: &DomainObjectCollection) {
        for id in collection.ids() {
            manager.enlist(id);
        }
    }

    // -------------------------------------------------------------------------
    // Objects
    // -------------------------------------------------------------------------

    /// Creates a new object of `class`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownClass`, `ReadOnlyTransaction`, or a storage failure.
    pub fn new_object(&self, class: impl Into<ClassId>) -> Result<DomainObject> {
        let mut manager = self.writable()?;
        let id = manager.new_object(&class.into())?;
        Ok(manager.handle(id))
    }

    /// Loads an object and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound`, `ObjectDeleted`, `ObjectDiscarded`, or a storage failure.
    pub fn get_object(&self, id: &ObjectId) -> Result<DomainObject> {
        let mut manager = self.manager()?;
        let container = manager.ensure_loaded(id)?;
        container.ensure_modifiable()?;
        Ok(manager.handle(id.clone()))
    }

    /// Like [`get_object`](Self::get_object), but deleted objects are returned too.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound`, `ObjectDiscarded`, or a storage failure.
    pub fn get_object_including_deleted(&self, id: &ObjectId) -> Result<DomainObject> {
        let mut manager = self.manager()?;
        manager.ensure_loaded(id)?.ensure_not_discarded()?;
        Ok(manager.handle(id.clone()))
    }

    /// Makes a handle from elsewhere usable in this transaction.
    ///
    /// The object is loaded here; the returned handle belongs to this
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction` for a handle bound to another transaction,
    /// or a load error.
    pub fn enlist(&self, object: &DomainObject) -> Result<DomainObject> {
        if !object.usable_in(self.id()) {
            return Err(Error::cross_transaction(object.id().clone(), self.id()));
        }
        let mut manager = self.manager()?;
        manager.ensure_loaded(object.id())?.ensure_not_discarded()?;
        Ok(manager.enlist(object.id().clone()))
    }

    /// Returns true if the handle can be used in this transaction.
    #[must_use]
    pub fn is_enlisted(&self, object: &DomainObject) -> bool {
        self.inner
            .manager
            .try_borrow()
            .is_ok_and(|manager| self.check_handle(&manager, object).is_ok())
    }

    /// Returns the state of an object. Discarded objects report `Discarded`.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction` or a load error.
    pub fn state(&self, object: &DomainObject) -> Result<ObjectState> {
        let mut manager = self.manager()?;
        self.check_handle(&manager, object)?;
        manager.state(object.id())
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    /// Returns the current value of a stored property.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ObjectDiscarded`, `UnknownProperty`,
    /// `RelationProperty`, or a load error.
    pub fn value(&self, object: &DomainObject, property: impl Into<PropertyName>) -> Result<Value> {
        let mut manager = self.manager()?;
        self.check_handle(&manager, object)?;
        manager.value(object.id(), &property.into())
    }

    /// Returns the last committed value of a stored property.
    ///
    /// # Errors
    ///
    /// Same as [`value`](Self::value).
    pub fn original_value(&self, object: &DomainObject, property: impl Into<PropertyName>) -> Result<Value> {
        let mut manager = self.manager()?;
        self.check_handle(&manager, object)?;
        manager.original_value(object.id(), &property.into())
    }

    /// Assigns a stored property.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ReadOnlyTransaction`, a validation
    /// error, `ObjectDeleted`, `ObjectDiscarded`, or `OperationCancelled`.
    pub fn set_value(
        &self,
        object: &DomainObject,
        property: impl Into<PropertyName>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let mut manager = self.writable()?;
        self.check_handle(&manager, object)?;
        manager.set_value(object.id(), &property.into(), value.into())
    }

    /// Returns true if a property or relation was assigned since the last commit.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ObjectDiscarded`, `UnknownProperty`, or a load error.
    pub fn has_been_touched(&self, object: &DomainObject, property: impl Into<PropertyName>) -> Result<bool> {
        let mut manager = self.manager()?;
        self.check_handle(&manager, object)?;
        manager.has_been_touched(object.id(), &property.into())
    }

    /// Forces an object into the `Changed` state.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ReadOnlyTransaction`, `ObjectDeleted`, or `ObjectDiscarded`.
    pub fn mark_as_changed(&self, object: &DomainObject) -> Result<()> {
        let mut manager = self.writable()?;
        self.check_handle(&manager, object)?;
        manager.mark_as_changed(object.id())
    }

    /// Returns the concurrency token; `None` until a new object is committed.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ObjectDiscarded`, or a load error.
    pub fn timestamp(&self, object: &DomainObject) -> Result<Option<Timestamp>> {
        let mut manager = self.manager()?;
        self.check_handle(&manager, object)?;
        manager.timestamp(object.id())
    }

    // -------------------------------------------------------------------------
    // Relations
    // -------------------------------------------------------------------------

    fn read_related_object(
        &self,
        object: &DomainObject,
        property: PropertyName,
        include_deleted: bool,
    ) -> Result<Option<DomainObject>> {
        let mut manager = self.manager()?;
        self.check_handle(&manager, object)?;
        let related = manager.related_object(&Self::end_point(object, property), include_deleted)?;
        Ok(related.map(|id| manager.enlist(id)))
    }

    /// Returns the object related through a single-valued end point.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ObjectDeleted`, `ObjectDiscarded`,
    /// `WrongCardinality`, or a load error.
    pub fn related_object(
        &self,
        object: &DomainObject,
        property: impl Into<PropertyName>,
    ) -> Result<Option<DomainObject>> {
        self.read_related_object(object, property.into(), false)
    }

    /// Like [`related_object`](Self::related_object), readable on deleted objects.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ObjectDiscarded`, `WrongCardinality`, or a load error.
    pub fn related_object_including_deleted(
        &self,
        object: &DomainObject,
        property: impl Into<PropertyName>,
    ) -> Result<Option<DomainObject>> {
        self.read_related_object(object, property.into(), true)
    }

    /// Returns the related object as of the last commit.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ObjectDiscarded`, `WrongCardinality`, or a load error.
    pub fn original_related_object(
        &self,
        object: &DomainObject,
        property: impl Into<PropertyName>,
    ) -> Result<Option<DomainObject>> {
        let mut manager = self.manager()?;
        self.check_handle(&manager, object)?;
        let related = manager.original_related_object(&Self::end_point(object, property))?;
        Ok(related.map(|id| manager.enlist(id)))
    }

    /// Sets a single-valued end point; `None` clears it.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction` (for either handle), `ReadOnlyTransaction`,
    /// `TypeMismatch`, `WrongCardinality`, `ObjectDeleted`, `ObjectDiscarded`,
    /// or `OperationCancelled`.
    pub fn set_related_object(
        &self,
        object: &DomainObject,
        property: impl Into<PropertyName>,
        related: Option<&DomainObject>,
    ) -> Result<()> {
        let mut manager = self.writable()?;
        self.check_handle(&manager, object)?;
        if let Some(related) = related {
            self.check_handle(&manager, related)?;
        }
        manager.set_related_object(&Self::end_point(object, property), related.map(DomainObject::id))
    }

    /// Returns a read-only snapshot of a collection end point.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ObjectDeleted`, `ObjectDiscarded`,
    /// `WrongCardinality`, or a load error.
    pub fn related_objects(
        &self,
        object: &DomainObject,
        property: impl Into<PropertyName>,
    ) -> Result<DomainObjectCollection> {
        let mut manager = self.manager()?;
        self.check_handle(&manager, object)?;
        let items = manager.related_objects(&Self::end_point(object, property))?;
        Self::enlist_all(&mut manager, &items);
        Ok(items)
    }

    /// Returns a collection end point as of the last commit.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ObjectDiscarded`, `WrongCardinality`, or a load error.
    pub fn original_related_objects(
        &self,
        object: &DomainObject,
        property: impl Into<PropertyName>,
    ) -> Result<DomainObjectCollection> {
        let mut manager = self.manager()?;
        self.check_handle(&manager, object)?;
        let items = manager.original_related_objects(&Self::end_point(object, property))?;
        Self::enlist_all(&mut manager, &items);
        Ok(items)
    }

    /// Returns a mutable view of a collection end point.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `WrongCardinality` for single-valued end
    /// points, or a mapping lookup error.
    pub fn related_collection(
        &self,
        object: &DomainObject,
        property: impl Into<PropertyName>,
    ) -> Result<RelationCollection> {
        let property = property.into();
        {
            let manager = self.manager()?;
            self.check_handle(&manager, object)?;
        }
        if !self.inner.mapping.end_point(object.class_id(), &property)?.is_collection() {
            return Err(Error::new(ErrorKind::WrongCardinality(property)));
        }
        Ok(RelationCollection::new(self.clone(), object.clone(), property))
    }

    // -------------------------------------------------------------------------
    // Collection Operations
    // -------------------------------------------------------------------------

    pub(crate) fn insert_related(
        &self,
        owner: &DomainObject,
        property: &PropertyName,
        index: Option<usize>,
        item: &DomainObject,
    ) -> Result<()> {
        let mut manager = self.writable()?;
        self.check_handle(&manager, owner)?;
        self.check_handle(&manager, item)?;
        manager.insert_related(&Self::end_point(owner, property.clone()), index, item.id())
    }

    pub(crate) fn remove_related(
        &self,
        owner: &DomainObject,
        property: &PropertyName,
        item: &DomainObject,
    ) -> Result<bool> {
        let mut manager = self.writable()?;
        self.check_handle(&manager, owner)?;
        self.check_handle(&manager, item)?;
        manager.remove_related(&Self::end_point(owner, property.clone()), item.id())
    }

    pub(crate) fn replace_related(
        &self,
        owner: &DomainObject,
        property: &PropertyName,
        index: usize,
        item: &DomainObject,
    ) -> Result<DomainObject> {
        let mut manager = self.writable()?;
        self.check_handle(&manager, owner)?;
        self.check_handle(&manager, item)?;
        let replaced = manager.replace_related(&Self::end_point(owner, property.clone()), index, item.id())?;
        Ok(manager.enlist(replaced))
    }

    pub(crate) fn clear_related(&self, owner: &DomainObject, property: &PropertyName) -> Result<()> {
        let mut manager = self.writable()?;
        self.check_handle(&manager, owner)?;
        manager.clear_related(&Self::end_point(owner, property.clone()))
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Deletes an object and everything its cascading end points reach.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ReadOnlyTransaction`, `ObjectDeleted`,
    /// `ObjectDiscarded`, or `OperationCancelled`.
    pub fn delete(&self, object: &DomainObject) -> Result<()> {
        let mut manager = self.writable()?;
        self.check_handle(&manager, object)?;
        manager.delete(object.id())
    }

    /// Persists every change. For a sub-transaction, the parent receives them.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnlyTransaction`, `OperationCancelled`,
    /// `MandatoryRelationNotSet`, or a storage failure.
    pub fn commit(&self) -> Result<()> {
        self.writable()?.commit()
    }

    /// Discards every uncommitted change.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnlyTransaction` or `OperationCancelled`.
    pub fn rollback(&self) -> Result<()> {
        self.writable()?.rollback()
    }

    /// Walks the object graph from `root` under `strategy`.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ObjectDiscarded`, or a load error.
    pub fn traverse(&self, root: &DomainObject, strategy: &dyn TraversalStrategy) -> Result<HashSet<ObjectId>> {
        let mut manager = self.manager()?;
        self.check_handle(&manager, root)?;
        let reached = manager.traverse(root.id(), strategy)?;
        for id in &reached {
            manager.enlist(id.clone());
        }
        Ok(reached)
    }

    /// Registers a listener for this transaction's notifications.
    ///
    /// # Errors
    ///
    /// Returns `ReentrancyViolation` when called from a listener.
    pub fn subscribe(&self, listener: impl TransactionListener + 'static) -> Result<ListenerId> {
        Ok(self.manager()?.listeners_mut().subscribe(listener))
    }

    /// Removes a listener. Returns false if it was not registered.
    ///
    /// # Errors
    ///
    /// Returns `ReentrancyViolation` when called from a listener.
    pub fn unsubscribe(&self, id: ListenerId) -> Result<bool> {
        Ok(self.manager()?.listeners_mut().unsubscribe(id))
    }

    // -------------------------------------------------------------------------
    // Sub-Transactions
    // -------------------------------------------------------------------------

    /// Opens a sub-transaction.
    ///
    /// The child sees this transaction's current state and commits into it
    /// without raising notifications here. Until the child is dropped this
    /// transaction is read-only.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnlyTransaction` if a sub-transaction is already open.
    pub fn create_sub_transaction(&self) -> Result<ClientTransaction> {
        drop(self.writable()?);
        let storage: Rc<dyn StorageProvider> = Rc::new(ParentStorage {
            parent: Rc::clone(&self.inner),
        });
        let child = Self::create(
            Arc::clone(&self.inner.mapping),
            storage,
            self.inner.config.clone(),
            Some(self.clone()),
        );
        self.inner.child_active.set(true);
        Ok(child)
    }
}

impl std::fmt::Debug for ClientTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTransaction")
            .field("id", &self.inner.id)
            .field("parent", &self.parent().map(ClientTransaction::id))
            .field("binding", &self.is_binding())
            .field("read_only", &self.is_read_only())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Parent Storage
// =============================================================================

/// Storage of a sub-transaction: the parent's current state.
struct ParentStorage {
    parent: Rc<TransactionInner>,
}

impl ParentStorage {
    fn manager(&self) -> Result<RefMut<'_, DataManager>> {
        self.parent
            .manager
            .try_borrow_mut()
            .map_err(|_| Error::reentrancy())
    }
}

impl StorageProvider for ParentStorage {
    fn load(&self, id: &ObjectId) -> Result<LoadedObject> {
        self.manager()?.load_for_child(id)
    }

    fn load_related_id(
        &self,
        end_point: &RelationEndPointId,
        _definition: &RelationEndPointDefinition,
    ) -> Result<Option<ObjectId>> {
        let related = self.manager()?.related_ids_for_child(end_point)?;
        match related.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(single.clone())),
            _ => Err(Error::new(ErrorKind::WrongCardinality(end_point.property.clone()))),
        }
    }

    fn load_related_ids(
        &self,
        end_point: &RelationEndPointId,
        _definition: &RelationEndPointDefinition,
    ) -> Result<Vec<ObjectId>> {
        self.manager()?.related_ids_for_child(end_point)
    }

    fn save(&self, batch: &PersistenceBatch) -> Result<HashMap<ObjectId, Timestamp>> {
        self.manager()?.apply_child_batch(batch)?;
        Ok(HashMap::new())
    }

    fn create_new_object_id(&self, class: &ClassId) -> Result<ObjectId> {
        let storage = Rc::clone(self.manager()?.storage());
        storage.create_new_object_id(class)
    }
}
