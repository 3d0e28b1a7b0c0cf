//! A mutable view of one collection end point.

use weft_data::{DomainObject, DomainObjectCollection};
use weft_foundation::{PropertyName, Result};

use crate::transaction::ClientTransaction;

/// The items of a collection end point, as seen through a transaction.
///
/// Reads return the current state of the end point; every mutator runs the
/// relation change protocol, so the opposite end points follow along and
/// listeners are notified.
#[derive(Clone, Debug)]
pub struct RelationCollection {
    transaction: ClientTransaction,
    owner: DomainObject,
    property: PropertyName,
}

impl RelationCollection {
    pub(crate) fn new(transaction: ClientTransaction, owner: DomainObject, property: PropertyName) -> Self {
        Self {
            transaction,
            owner,
            property,
        }
    }

    /// The object owning the end point.
    #[must_use]
    pub fn owner(&self) -> &DomainObject {
        &self.owner
    }

    /// The relation property.
    #[must_use]
    pub fn property(&self) -> &PropertyName {
        &self.property
    }

    /// A read-only snapshot of the current items.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDeleted`, `ObjectDiscarded`, or a load error.
    pub fn items(&self) -> Result<DomainObjectCollection> {
        self.transaction.related_objects(&self.owner, self.property.clone())
    }

    /// The items as of the last commit.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDiscarded` or a load error.
    pub fn original(&self) -> Result<DomainObjectCollection> {
        self.transaction
            .original_related_objects(&self.owner, self.property.clone())
    }

    /// Number of items.
    ///
    /// # Errors
    ///
    /// Same as [`items`](Self::items).
    pub fn len(&self) -> Result<usize> {
        Ok(self.items()?.len())
    }

    /// Returns true if there are no items.
    ///
    /// # Errors
    ///
    /// Same as [`items`](Self::items).
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.items()?.is_empty())
    }

    /// Returns true if `item` is contained.
    ///
    /// # Errors
    ///
    /// Same as [`items`](Self::items).
    pub fn contains(&self, item: &DomainObject) -> Result<bool> {
        Ok(self.items()?.contains(item.id()))
    }

    /// The item at `index`.
    ///
    /// # Errors
    ///
    /// Same as [`items`](Self::items).
    pub fn get(&self, index: usize) -> Result<Option<DomainObject>> {
        Ok(self.items()?.get(index).cloned())
    }

    /// Appends an item, taking it away from its previous owner.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateItem`, `TypeMismatch`, `CrossTransaction`,
    /// `ObjectDeleted`, `ObjectDiscarded`, or `OperationCancelled`.
    pub fn add(&self, item: &DomainObject) -> Result<()> {
        self.transaction
            .insert_related(&self.owner, &self.property, None, item)
    }

    /// Inserts an item at `index`.
    ///
    /// # Errors
    ///
    /// Same as [`add`](Self::add), plus `IndexOutOfBounds`.
    pub fn insert(&self, index: usize, item: &DomainObject) -> Result<()> {
        self.transaction
            .insert_related(&self.owner, &self.property, Some(index), item)
    }

    /// Removes an item. Returns false if it was not contained.
    ///
    /// # Errors
    ///
    /// Returns `CrossTransaction`, `ObjectDeleted`, `ObjectDiscarded`, or `OperationCancelled`.
    pub fn remove(&self, item: &DomainObject) -> Result<bool> {
        self.transaction
            .remove_related(&self.owner, &self.property, item)
    }

    /// Replaces the item at `index` and returns the replaced item.
    ///
    /// # Errors
    ///
    /// Same as [`insert`](Self::insert).
    pub fn replace(&self, index: usize, item: &DomainObject) -> Result<DomainObject> {
        self.transaction
            .replace_related(&self.owner, &self.property, index, item)
    }

    /// Removes every item; all or nothing.
    ///
    /// # Errors
    ///
    /// Returns `ObjectDeleted`, `ObjectDiscarded`, or `OperationCancelled`.
    pub fn clear(&self) -> Result<()> {
        self.transaction.clear_related(&self.owner, &self.property)
    }
}
