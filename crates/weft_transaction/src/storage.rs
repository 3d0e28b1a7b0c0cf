//! The storage collaborator.
//!
//! The engine never talks to a database itself. Everything it persists or
//! loads goes through a [`StorageProvider`]; [`InMemoryStorageProvider`] is
//! the reference implementation used by tests and benchmarks.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use weft_data::RelationEndPointId;
use weft_foundation::{
    ClassId, Error, ErrorKind, IdValue, ObjectId, PropertyName, Result, StorageFailure, Timestamp,
    Value,
};
use weft_mapping::{MappingConfiguration, RelationEndPointDefinition, SortDirection, SortExpression};

// =============================================================================
// Records
// =============================================================================

/// Raw values of one object as returned by [`StorageProvider::load`].
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedObject {
    /// Stored property values, foreign keys included.
    pub values: BTreeMap<PropertyName, Value>,
    /// Optimistic-concurrency token of the stored row.
    pub timestamp: Timestamp,
}

/// One object in a [`PersistenceBatch`].
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectRecord {
    /// The object.
    pub id: ObjectId,
    /// Current property values, foreign keys included.
    pub values: BTreeMap<PropertyName, Value>,
    /// Token the object was loaded with; `None` for new objects.
    pub timestamp: Option<Timestamp>,
}

/// Everything one commit writes, applied atomically by the provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PersistenceBatch {
    /// Objects to insert.
    pub new: Vec<ObjectRecord>,
    /// Objects to update.
    pub changed: Vec<ObjectRecord>,
    /// Objects to remove.
    pub deleted: Vec<ObjectRecord>,
}

impl PersistenceBatch {
    /// Returns true if the batch writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.new.len() + self.changed.len() + self.deleted.len()
    }

    /// Iterates over every record.
    pub fn records(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.new
            .iter()
            .chain(self.changed.iter())
            .chain(self.deleted.iter())
    }
}

// =============================================================================
// Storage Provider
// =============================================================================

/// Loads and saves objects on behalf of a transaction.
///
/// Calls are synchronous. A transaction loads each fact at most once and
/// saves once per commit.
pub trait StorageProvider {
    /// Loads the stored values of one object.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` or a storage failure.
    fn load(&self, id: &ObjectId) -> Result<LoadedObject>;

    /// Loads the object related through a virtual single-valued end point.
    ///
    /// # Errors
    ///
    /// Returns a storage failure, or `WrongCardinality` if several objects
    /// point at the owner.
    fn load_related_id(
        &self,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> Result<Option<ObjectId>>;

    /// Loads the objects related through a virtual collection end point,
    /// ordered by the end point's sort expression.
    ///
    /// # Errors
    ///
    /// Returns a storage failure.
    fn load_related_ids(
        &self,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> Result<Vec<ObjectId>>;

    /// Writes a batch atomically and returns the new tokens of inserted and
    /// updated objects.
    ///
    /// # Errors
    ///
    /// Returns a storage failure; nothing is written in that case.
    fn save(&self, batch: &PersistenceBatch) -> Result<HashMap<ObjectId, Timestamp>>;

    /// Allocates the identity of a new object.
    ///
    /// # Errors
    ///
    /// Returns a storage failure.
    fn create_new_object_id(&self, class: &ClassId) -> Result<ObjectId>;
}

// =============================================================================
// In-Memory Storage Provider
// =============================================================================

#[derive(Clone, Debug)]
struct StoredRow {
    values: BTreeMap<PropertyName, Value>,
    timestamp: Timestamp,
}

#[derive(Debug, Default)]
struct StoreState {
    rows: im::OrdMap<ObjectId, StoredRow>,
    next_timestamp: u64,
    next_id: i64,
    loads: HashMap<ObjectId, usize>,
    related_loads: HashMap<RelationEndPointId, usize>,
    saves: usize,
    pending_failure: Option<StorageFailure>,
}

impl StoreState {
    fn fresh_timestamp(&mut self) -> Timestamp {
        self.next_timestamp += 1;
        Timestamp(self.next_timestamp)
    }
}

/// A storage provider backed by an in-memory table.
///
/// Counts every load so tests can verify that each fact is fetched once,
/// checks timestamps on save, and can be told to fail the next save.
#[derive(Debug)]
pub struct InMemoryStorageProvider {
    mapping: Arc<MappingConfiguration>,
    state: RefCell<StoreState>,
}

impl InMemoryStorageProvider {
    /// Creates an empty store.
    #[must_use]
    pub fn new(mapping: Arc<MappingConfiguration>) -> Self {
        Self {
            mapping,
            state: RefCell::new(StoreState {
                next_id: 1000,
                ..StoreState::default()
            }),
        }
    }

    /// Stores a row directly, replacing any existing one. Returns its token.
    ///
    /// # Errors
    ///
    /// Returns `UnknownClass` or `UnknownProperty` if the row does not fit the mapping.
    pub fn insert(&self, id: ObjectId, values: BTreeMap<PropertyName, Value>) -> Result<Timestamp> {
        let class = self.mapping.class(&id.class_id)?;
        if let Some(unknown) = values.keys().find(|name| class.property(name).is_none()) {
            return Err(Error::unknown_property(class.id.clone(), unknown.clone()));
        }
        let mut state = self.state.borrow_mut();
        let timestamp = state.fresh_timestamp();
        state.rows.insert(id, StoredRow { values, timestamp });
        Ok(timestamp)
    }

    /// Returns the stored values of an object.
    #[must_use]
    pub fn row(&self, id: &ObjectId) -> Option<BTreeMap<PropertyName, Value>> {
        self.state.borrow().rows.get(id).map(|row| row.values.clone())
    }

    /// Returns one stored value.
    #[must_use]
    pub fn stored_value(&self, id: &ObjectId, property: &str) -> Option<Value> {
        self.state
            .borrow()
            .rows
            .get(id)
            .and_then(|row| row.values.get(&PropertyName::new(property)).cloned())
    }

    /// Returns the stored token of an object.
    #[must_use]
    pub fn timestamp(&self, id: &ObjectId) -> Option<Timestamp> {
        self.state.borrow().rows.get(id).map(|row| row.timestamp)
    }

    /// Returns true if a row for the object exists.
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.state.borrow().rows.contains_key(id)
    }

    /// Returns the number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().rows.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().rows.is_empty()
    }

    /// Gives a row a new token, as if another writer had updated it.
    pub fn bump_timestamp(&self, id: &ObjectId) {
        let mut state = self.state.borrow_mut();
        let timestamp = state.fresh_timestamp();
        if let Some(row) = state.rows.get_mut(id) {
            row.timestamp = timestamp;
        }
    }

    /// Makes the next save fail with `failure` without writing anything.
    pub fn fail_next_save(&self, failure: StorageFailure) {
        self.state.borrow_mut().pending_failure = Some(failure);
    }

    /// How often an object was loaded.
    #[must_use]
    pub fn load_count(&self, id: &ObjectId) -> usize {
        self.state.borrow().loads.get(id).copied().unwrap_or(0)
    }

    /// How often a virtual end point was loaded.
    #[must_use]
    pub fn related_load_count(&self, end_point: &RelationEndPointId) -> usize {
        self.state
            .borrow()
            .related_loads
            .get(end_point)
            .copied()
            .unwrap_or(0)
    }

    /// How often `save` was called, failed calls included.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.state.borrow().saves
    }

    fn find_related(
        &self,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> Vec<ObjectId> {
        let mut state = self.state.borrow_mut();
        *state.related_loads.entry(end_point.clone()).or_default() += 1;

        let owner = Value::Object(end_point.object.clone());
        let mut related: Vec<(ObjectId, &StoredRow)> = state
            .rows
            .iter()
            .filter(|(id, _)| {
                self.mapping
                    .is_assignable(&id.class_id, &definition.opposite_class)
            })
            .filter(|(_, row)| row.values.get(&definition.opposite_property) == Some(&owner))
            .map(|(id, row)| (id.clone(), row))
            .collect();

        if let Some(sort) = &definition.sort_expression {
            related.sort_by(|(a_id, a), (b_id, b)| {
                compare_rows(sort, &a.values, &b.values).then_with(|| a_id.cmp(b_id))
            });
        }
        related.into_iter().map(|(id, _)| id).collect()
    }
}

fn compare_rows(
    sort: &SortExpression,
    a: &BTreeMap<PropertyName, Value>,
    b: &BTreeMap<PropertyName, Value>,
) -> Ordering {
    for spec in &sort.specs {
        let ordering = match (a.get(&spec.property), b.get(&spec.property)) {
            (Some(a), Some(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ordering = match spec.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl StorageProvider for InMemoryStorageProvider {
    fn load(&self, id: &ObjectId) -> Result<LoadedObject> {
        let mut state = self.state.borrow_mut();
        *state.loads.entry(id.clone()).or_default() += 1;
        state
            .rows
            .get(id)
            .map(|row| LoadedObject {
                values: row.values.clone(),
                timestamp: row.timestamp,
            })
            .ok_or_else(|| Error::object_not_found(id.clone()))
    }

    fn load_related_id(
        &self,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> Result<Option<ObjectId>> {
        let mut related = self.find_related(end_point, definition);
        if related.len() > 1 {
            return Err(Error::new(ErrorKind::WrongCardinality(
                end_point.property.clone(),
            )));
        }
        Ok(related.pop())
    }

    fn load_related_ids(
        &self,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> Result<Vec<ObjectId>> {
        Ok(self.find_related(end_point, definition))
    }

    fn save(&self, batch: &PersistenceBatch) -> Result<HashMap<ObjectId, Timestamp>> {
        let mut state = self.state.borrow_mut();
        state.saves += 1;
        if let Some(failure) = state.pending_failure.take() {
            return Err(Error::storage(failure));
        }

        // Work on a copy so a failure halfway leaves the table untouched.
        let mut rows = state.rows.clone();
        for record in batch.changed.iter().chain(batch.deleted.iter()) {
            let stored = rows
                .get(&record.id)
                .ok_or_else(|| Error::storage(StorageFailure::NotFound(record.id.clone())))?;
            if Some(stored.timestamp) != record.timestamp {
                return Err(Error::storage(StorageFailure::ConcurrencyViolation(
                    record.id.clone(),
                )));
            }
        }

        let mut timestamps = HashMap::new();
        for record in &batch.new {
            if rows.contains_key(&record.id) {
                return Err(Error::storage(StorageFailure::Rejected(format!(
                    "{} already exists",
                    record.id
                ))));
            }
            let timestamp = state.fresh_timestamp();
            rows.insert(
                record.id.clone(),
                StoredRow {
                    values: record.values.clone(),
                    timestamp,
                },
            );
            timestamps.insert(record.id.clone(), timestamp);
        }
        for record in &batch.changed {
            let timestamp = state.fresh_timestamp();
            rows.insert(
                record.id.clone(),
                StoredRow {
                    values: record.values.clone(),
                    timestamp,
                },
            );
            timestamps.insert(record.id.clone(), timestamp);
        }
        for record in &batch.deleted {
            rows.remove(&record.id);
        }

        state.rows = rows;
        tracing::debug!(
            new = batch.new.len(),
            changed = batch.changed.len(),
            deleted = batch.deleted.len(),
            "batch saved"
        );
        Ok(timestamps)
    }

    fn create_new_object_id(&self, class: &ClassId) -> Result<ObjectId> {
        self.mapping.class(class)?;
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        Ok(ObjectId::new(class.clone(), IdValue::Int(state.next_id)))
    }
}
