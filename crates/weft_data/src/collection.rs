//! Ordered, identity-keyed collections of object handles.
//!
//! A [`DomainObjectCollection`] is a list with unique keys: insertion order
//! is significant and no two items share an [`ObjectId`]. Collections are
//! persistent (`im`) structures, so taking a read-only snapshot is O(1).

use std::collections::HashSet;
use std::sync::Arc;

use weft_foundation::{ClassId, Error, ErrorKind, ObjectId, Result, TransactionId, ValueType};

use crate::domain_object::DomainObject;

/// Declared element type of a collection.
///
/// `accepted` holds the declared class and every class derived from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemType {
    class: ClassId,
    accepted: Arc<HashSet<ClassId>>,
}

impl ItemType {
    /// Creates an item type accepting `class` and the given derived classes.
    #[must_use]
    pub fn new(class: ClassId, accepted: HashSet<ClassId>) -> Self {
        let mut accepted = accepted;
        accepted.insert(class.clone());
        Self {
            class,
            accepted: Arc::new(accepted),
        }
    }

    /// Creates an item type accepting exactly one class.
    #[must_use]
    pub fn exact(class: ClassId) -> Self {
        Self::new(class, HashSet::new())
    }

    /// Returns the declared class.
    #[must_use]
    pub fn class(&self) -> &ClassId {
        &self.class
    }

    /// Returns true if objects of `class` may be stored.
    #[must_use]
    pub fn accepts(&self, class: &ClassId) -> bool {
        self.accepted.contains(class)
    }
}

/// Ordered sequence of object handles, unique by object identity.
#[derive(Clone, Debug, Default)]
pub struct DomainObjectCollection {
    items: im::Vector<DomainObject>,
    index: im::HashSet<ObjectId>,
    item_type: Option<ItemType>,
    transaction: Option<TransactionId>,
    read_only: bool,
}

impl DomainObjectCollection {
    /// Creates an empty, untyped collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the items to a declared element type.
    #[must_use]
    pub fn with_item_type(mut self, item_type: ItemType) -> Self {
        self.item_type = Some(item_type);
        self
    }

    /// Associates the collection with one transaction.
    ///
    /// Handles bound to a different transaction are rejected afterwards.
    #[must_use]
    pub fn for_transaction(mut self, transaction: TransactionId) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// Creates a collection holding `items` in order.
    ///
    /// # Errors
    ///
    /// Fails like [`add`](Self::add) on the first invalid item.
    pub fn with_items(mut self, items: impl IntoIterator<Item = DomainObject>) -> Result<Self> {
        for item in items {
            self.add(item)?;
        }
        Ok(self)
    }

    /// Returns the declared element type.
    #[must_use]
    pub fn item_type(&self) -> Option<&ItemType> {
        self.item_type.as_ref()
    }

    /// Returns the owning transaction.
    #[must_use]
    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the collection has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the item at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&DomainObject> {
        self.items.get(index)
    }

    /// Returns true if an item with this identity is present.
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains(id)
    }

    /// Returns the position of the item with this identity.
    #[must_use]
    pub fn index_of(&self, id: &ObjectId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.items.iter().position(|item| item.id() == id)
    }

    /// Iterates over the items in order.
    pub fn iter(&self) -> impl Iterator<Item = &DomainObject> {
        self.items.iter()
    }

    /// Returns the item identities in order.
    #[must_use]
    pub fn ids(&self) -> Vec<ObjectId> {
        self.items.iter().map(|item| item.id().clone()).collect()
    }

    /// Returns true if the collection is a read-only snapshot.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns a read-only snapshot sharing structure with this collection.
    #[must_use]
    pub fn as_read_only(&self) -> Self {
        let mut snapshot = self.clone();
        snapshot.read_only = true;
        snapshot
    }

    /// Returns a writable copy sharing structure with this collection.
    #[must_use]
    pub fn to_mutable(&self) -> Self {
        let mut copy = self.clone();
        copy.read_only = false;
        copy
    }

    /// Compares item identities ignoring order.
    #[must_use]
    pub fn set_equals(&self, other: &Self) -> bool {
        self.index == other.index
    }

    /// Checks that an item may be stored: element type and transaction.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` or `CrossTransaction`.
    pub fn check_item(&self, item: &DomainObject) -> Result<()> {
        if let Some(item_type) = &self.item_type {
            if !item_type.accepts(item.class_id()) {
                return Err(Error::type_mismatch(
                    ValueType::Object(item_type.class.clone()),
                    Some(ValueType::Object(item.class_id().clone())),
                ));
            }
        }
        if let Some(transaction) = self.transaction {
            if !item.usable_in(transaction) {
                return Err(Error::cross_transaction(item.id().clone(), transaction));
            }
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::new(ErrorKind::ReadOnlyCollection));
        }
        Ok(())
    }

    fn ensure_absent(&self, item: &DomainObject) -> Result<()> {
        if self.contains(item.id()) {
            return Err(Error::new(ErrorKind::DuplicateItem(item.id().clone())));
        }
        Ok(())
    }

    fn out_of_bounds(&self, index: usize) -> Error {
        Error::new(ErrorKind::IndexOutOfBounds {
            index,
            length: self.len(),
        })
    }

    /// Validates [`insert`](Self::insert) without mutating.
    ///
    /// # Errors
    ///
    /// See [`insert`](Self::insert).
    pub fn check_insert(&self, index: usize, item: &DomainObject) -> Result<()> {
        self.ensure_writable()?;
        if index > self.len() {
            return Err(self.out_of_bounds(index));
        }
        self.ensure_absent(item)?;
        self.check_item(item)
    }

    /// Validates [`set`](Self::set) without mutating.
    ///
    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn check_set(&self, index: usize, item: &DomainObject) -> Result<()> {
        self.ensure_writable()?;
        let current = self.get(index).ok_or_else(|| self.out_of_bounds(index))?;
        if current.id() != item.id() {
            self.ensure_absent(item)?;
        }
        self.check_item(item)
    }

    /// Appends an item.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnlyCollection`, `DuplicateItem`, `TypeMismatch`, or
    /// `CrossTransaction`. The collection is unchanged on error.
    pub fn add(&mut self, item: DomainObject) -> Result<()> {
        self.insert(self.len(), item)
    }

    /// Inserts an item at `index`.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` if `index > len`, otherwise like [`add`](Self::add).
    pub fn insert(&mut self, index: usize, item: DomainObject) -> Result<()> {
        self.check_insert(index, &item)?;
        self.index.insert(item.id().clone());
        self.items.insert(index, item);
        Ok(())
    }

    /// Removes the item with this identity. Returns false if it was absent.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnlyCollection`.
    pub fn remove(&mut self, id: &ObjectId) -> Result<bool> {
        self.ensure_writable()?;
        let Some(position) = self.index_of(id) else {
            return Ok(false);
        };
        self.items.remove(position);
        self.index.remove(id);
        Ok(true)
    }

    /// Replaces the item at `index`, returning the previous item.
    ///
    /// Replacing an item with itself is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds`, `ReadOnlyCollection`, `DuplicateItem` (the
    /// new item is stored at another index), `TypeMismatch`, or `CrossTransaction`.
    pub fn set(&mut self, index: usize, item: DomainObject) -> Result<DomainObject> {
        self.check_set(index, &item)?;
        let previous = self.items.set(index, item.clone());
        self.index.remove(previous.id());
        self.index.insert(item.id().clone());
        Ok(previous)
    }

    /// Removes every item.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnlyCollection`.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.items.clear();
        self.index.clear();
        Ok(())
    }

    /// Merges two collections by identity; items of `self` win.
    ///
    /// The result is a new writable collection with this collection's
    /// element type and transaction. Neither input changes.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` or `CrossTransaction` for an item of `other`
    /// this collection could not hold.
    pub fn combine(&self, other: &Self) -> Result<Self> {
        let mut combined = self.to_mutable();
        for item in other.iter() {
            if !combined.contains(item.id()) {
                combined.add(item.clone())?;
            }
        }
        Ok(combined)
    }
}

/// Ordered equality of the item identities.
impl PartialEq for DomainObjectCollection {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .items
                .iter()
                .zip(other.items.iter())
                .all(|(a, b)| a.id() == b.id())
    }
}

impl<'a> IntoIterator for &'a DomainObjectCollection {
    type Item = &'a DomainObject;
    type IntoIter = im::vector::Iter<'a, DomainObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
