//! Relation end points: one side of one relation instance.

use std::fmt;

use weft_foundation::{ObjectId, PropertyName};

use crate::collection::DomainObjectCollection;

/// Identifies one side of one relation instance: an object and its relation property.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationEndPointId {
    /// Owning object.
    pub object: ObjectId,
    /// Relation property on the owning object.
    pub property: PropertyName,
}

impl RelationEndPointId {
    /// Creates an end point ID.
    #[must_use]
    pub fn new(object: ObjectId, property: impl Into<PropertyName>) -> Self {
        Self {
            object,
            property: property.into(),
        }
    }
}

impl fmt::Debug for RelationEndPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelationEndPointId({self})")
    }
}

impl fmt::Display for RelationEndPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.object, self.property)
    }
}

/// A single-valued end point, either real (backed by a foreign key) or virtual.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectEndPoint {
    id: RelationEndPointId,
    original: Option<ObjectId>,
    current: Option<ObjectId>,
    touched: bool,
}

impl ObjectEndPoint {
    /// Creates an unchanged end point.
    #[must_use]
    pub fn new(id: RelationEndPointId, related: Option<ObjectId>) -> Self {
        Self {
            id,
            original: related.clone(),
            current: related,
            touched: false,
        }
    }

    /// Returns the end point ID.
    #[must_use]
    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    /// Returns the currently related object.
    #[must_use]
    pub fn current(&self) -> Option<&ObjectId> {
        self.current.as_ref()
    }

    /// Returns the related object as of the last commit.
    #[must_use]
    pub fn original(&self) -> Option<&ObjectId> {
        self.original.as_ref()
    }

    /// Sets the related object and marks the end point touched.
    pub fn set(&mut self, related: Option<ObjectId>) {
        self.current = related;
        self.touched = true;
    }

    /// Returns true if the related object differs from the original.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.current != self.original
    }

    fn commit(&mut self) {
        self.original.clone_from(&self.current);
        self.touched = false;
    }

    fn rollback(&mut self) {
        self.current.clone_from(&self.original);
        self.touched = false;
    }
}

/// A virtual end point holding an ordered collection of related objects.
///
/// The original collection is a read-only snapshot. Commit replaces it with
/// a fresh snapshot instead of mutating it, so holders of the old original
/// keep seeing the old contents.
#[derive(Clone, Debug)]
pub struct CollectionEndPoint {
    id: RelationEndPointId,
    original: DomainObjectCollection,
    current: DomainObjectCollection,
    touched: bool,
}

impl CollectionEndPoint {
    /// Creates an unchanged end point from the loaded items.
    #[must_use]
    pub fn new(id: RelationEndPointId, items: DomainObjectCollection) -> Self {
        Self {
            id,
            original: items.as_read_only(),
            current: items.to_mutable(),
            touched: false,
        }
    }

    /// Returns the end point ID.
    #[must_use]
    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    /// Returns the live collection.
    #[must_use]
    pub fn current(&self) -> &DomainObjectCollection {
        &self.current
    }

    /// Returns the read-only collection as of the last commit.
    #[must_use]
    pub fn original(&self) -> &DomainObjectCollection {
        &self.original
    }

    /// Mutable access to the live collection. Marks the end point touched.
    pub fn current_mut(&mut self) -> &mut DomainObjectCollection {
        self.touched = true;
        &mut self.current
    }

    /// Returns true if the set of related objects differs from the original.
    ///
    /// Order is not persisted, so reordering alone is not a change.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        !self.current.set_equals(&self.original)
    }

    fn commit(&mut self) {
        self.original = self.current.as_read_only();
        self.touched = false;
    }

    fn rollback(&mut self) {
        self.current = self.original.to_mutable();
        self.touched = false;
    }
}

/// One side of one relation instance.
#[derive(Clone, Debug)]
pub enum RelationEndPoint {
    /// Single-valued side that stores the foreign key.
    Real(ObjectEndPoint),
    /// Single-valued side derived from the opposite real end point.
    VirtualSingle(ObjectEndPoint),
    /// Collection side derived from the opposite real end points.
    VirtualCollection(CollectionEndPoint),
}

impl RelationEndPoint {
    /// Returns the end point ID.
    #[must_use]
    pub fn id(&self) -> &RelationEndPointId {
        match self {
            Self::Real(ep) | Self::VirtualSingle(ep) => ep.id(),
            Self::VirtualCollection(ep) => ep.id(),
        }
    }

    /// Returns true for the foreign-key side.
    #[must_use]
    pub fn is_real(&self) -> bool {
        matches!(self, Self::Real(_))
    }

    /// Returns the single-valued end point, if this is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectEndPoint> {
        match self {
            Self::Real(ep) | Self::VirtualSingle(ep) => Some(ep),
            Self::VirtualCollection(_) => None,
        }
    }

    /// Mutable access to the single-valued end point.
    pub fn as_object_mut(&mut self) -> Option<&mut ObjectEndPoint> {
        match self {
            Self::Real(ep) | Self::VirtualSingle(ep) => Some(ep),
            Self::VirtualCollection(_) => None,
        }
    }

    /// Returns the collection end point, if this is one.
    #[must_use]
    pub fn as_collection(&self) -> Option<&CollectionEndPoint> {
        match self {
            Self::VirtualCollection(ep) => Some(ep),
            _ => None,
        }
    }

    /// Mutable access to the collection end point.
    pub fn as_collection_mut(&mut self) -> Option<&mut CollectionEndPoint> {
        match self {
            Self::VirtualCollection(ep) => Some(ep),
            _ => None,
        }
    }

    /// Currently related objects, in collection order.
    #[must_use]
    pub fn related_ids(&self) -> Vec<ObjectId> {
        match self {
            Self::Real(ep) | Self::VirtualSingle(ep) => ep.current().cloned().into_iter().collect(),
            Self::VirtualCollection(ep) => ep.current().ids(),
        }
    }

    /// Related objects as of the last commit.
    #[must_use]
    pub fn original_related_ids(&self) -> Vec<ObjectId> {
        match self {
            Self::Real(ep) | Self::VirtualSingle(ep) => {
                ep.original().cloned().into_iter().collect()
            }
            Self::VirtualCollection(ep) => ep.original().ids(),
        }
    }

    /// Returns true if the relation differs from its original.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        match self {
            Self::Real(ep) | Self::VirtualSingle(ep) => ep.has_changed(),
            Self::VirtualCollection(ep) => ep.has_changed(),
        }
    }

    /// Returns true if the relation was assigned since the last commit or rollback.
    #[must_use]
    pub fn has_been_touched(&self) -> bool {
        match self {
            Self::Real(ep) | Self::VirtualSingle(ep) => ep.touched,
            Self::VirtualCollection(ep) => ep.touched,
        }
    }

    /// Marks the end point touched without changing it.
    pub fn touch(&mut self) {
        match self {
            Self::Real(ep) | Self::VirtualSingle(ep) => ep.touched = true,
            Self::VirtualCollection(ep) => ep.touched = true,
        }
    }

    /// Makes the current relation the original.
    pub fn commit(&mut self) {
        match self {
            Self::Real(ep) | Self::VirtualSingle(ep) => ep.commit(),
            Self::VirtualCollection(ep) => ep.commit(),
        }
    }

    /// Restores the original relation.
    pub fn rollback(&mut self) {
        match self {
            Self::Real(ep) | Self::VirtualSingle(ep) => ep.rollback(),
            Self::VirtualCollection(ep) => ep.rollback(),
        }
    }
}
