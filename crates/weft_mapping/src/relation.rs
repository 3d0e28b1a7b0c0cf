//! Relation definitions and their end points.
//!
//! Every relation is bidirectional and has exactly two end points. The real
//! end point stores the foreign key; the virtual end point is derived from it.

use weft_foundation::{ClassId, PropertyName};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How many objects one end point refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Cardinality {
    /// At most one related object.
    One,
    /// An ordered collection of related objects.
    Many,
}

/// What deleting the owner of an end point does to the related objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DeleteBehavior {
    /// Clear the opposite side of the relation.
    #[default]
    Nullify,
    /// Delete the related objects as well.
    Cascade,
}

/// Sort direction of one sort key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One key of a sort expression.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SortSpec {
    /// Property of the item class to sort by.
    pub property: PropertyName,
    /// Direction.
    pub direction: SortDirection,
}

/// Order in which the storage provider returns the items of a collection end point.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SortExpression {
    /// Sort keys, most significant first.
    pub specs: Vec<SortSpec>,
}

impl SortExpression {
    /// Creates an ascending sort on one property.
    #[must_use]
    pub fn ascending(property: impl Into<PropertyName>) -> Self {
        Self::default().then(property, SortDirection::Ascending)
    }

    /// Creates a descending sort on one property.
    #[must_use]
    pub fn descending(property: impl Into<PropertyName>) -> Self {
        Self::default().then(property, SortDirection::Descending)
    }

    /// Appends a less significant sort key.
    #[must_use]
    pub fn then(mut self, property: impl Into<PropertyName>, direction: SortDirection) -> Self {
        self.specs.push(SortSpec {
            property: property.into(),
            direction,
        });
        self
    }
}

/// One side of a relation as declared in the mapping.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RelationEndPointDefinition {
    /// Identifier of the relation this end point belongs to.
    pub relation_id: String,
    /// Class declaring the end point.
    pub class_id: ClassId,
    /// Relation property on that class.
    pub property: PropertyName,
    /// Class on the other side.
    pub opposite_class: ClassId,
    /// Relation property on the other side.
    pub opposite_property: PropertyName,
    /// One or many.
    pub cardinality: Cardinality,
    /// True if the end point has no stored column.
    pub is_virtual: bool,
    /// True if the relation must be set when committing.
    pub mandatory: bool,
    /// Load order of a collection end point.
    pub sort_expression: Option<SortExpression>,
    /// Effect of deleting the owner on the related objects.
    pub on_delete: DeleteBehavior,
}

impl RelationEndPointDefinition {
    /// Returns true if this end point holds a collection.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.cardinality == Cardinality::Many
    }

    /// Returns true if this end point stores the foreign key.
    #[must_use]
    pub fn is_real(&self) -> bool {
        !self.is_virtual
    }
}

/// Schema definition for a bidirectional relation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RelationDefinition {
    /// Relation identifier.
    pub id: String,
    /// The two end points.
    pub end_points: [RelationEndPointDefinition; 2],
}

impl RelationDefinition {
    /// Creates a one-to-many relation.
    ///
    /// `one_class.collection_property` is the virtual collection end point;
    /// `many_class.foreign_key_property` is the real end point.
    #[must_use]
    pub fn one_to_many(
        id: impl Into<String>,
        one_class: impl Into<ClassId>,
        collection_property: impl Into<PropertyName>,
        many_class: impl Into<ClassId>,
        foreign_key_property: impl Into<PropertyName>,
    ) -> Self {
        Self::pair(
            id.into(),
            (one_class.into(), collection_property.into(), Cardinality::Many),
            (many_class.into(), foreign_key_property.into()),
        )
    }

    /// Creates a one-to-one relation.
    ///
    /// `virtual_class.virtual_property` has no stored column;
    /// `real_class.real_property` stores the foreign key.
    #[must_use]
    pub fn one_to_one(
        id: impl Into<String>,
        virtual_class: impl Into<ClassId>,
        virtual_property: impl Into<PropertyName>,
        real_class: impl Into<ClassId>,
        real_property: impl Into<PropertyName>,
    ) -> Self {
        Self::pair(
            id.into(),
            (virtual_class.into(), virtual_property.into(), Cardinality::One),
            (real_class.into(), real_property.into()),
        )
    }

    fn pair(
        id: String,
        (virtual_class, virtual_property, virtual_cardinality): (
            ClassId,
            PropertyName,
            Cardinality,
        ),
        (real_class, real_property): (ClassId, PropertyName),
    ) -> Self {
        let virtual_end = RelationEndPointDefinition {
            relation_id: id.clone(),
            class_id: virtual_class.clone(),
            property: virtual_property.clone(),
            opposite_class: real_class.clone(),
            opposite_property: real_property.clone(),
            cardinality: virtual_cardinality,
            is_virtual: true,
            mandatory: false,
            sort_expression: None,
            on_delete: DeleteBehavior::Nullify,
        };
        let real_end = RelationEndPointDefinition {
            relation_id: id.clone(),
            class_id: real_class,
            property: real_property,
            opposite_class: virtual_class,
            opposite_property: virtual_property,
            cardinality: Cardinality::One,
            is_virtual: false,
            mandatory: false,
            sort_expression: None,
            on_delete: DeleteBehavior::Nullify,
        };
        Self {
            id,
            end_points: [virtual_end, real_end],
        }
    }

    /// Sets the sort expression of the collection end point.
    #[must_use]
    pub fn sorted_by(mut self, sort: SortExpression) -> Self {
        self.end_points[0].sort_expression = Some(sort);
        self
    }

    /// Marks the end point with the given property as mandatory.
    #[must_use]
    pub fn with_mandatory(mut self, property: impl Into<PropertyName>) -> Self {
        let property = property.into();
        for end_point in &mut self.end_points {
            if end_point.property == property {
                end_point.mandatory = true;
            }
        }
        self
    }

    /// Deleting the owner of the end point with the given property deletes the related objects.
    #[must_use]
    pub fn with_cascade_delete(mut self, property: impl Into<PropertyName>) -> Self {
        let property = property.into();
        for end_point in &mut self.end_points {
            if end_point.property == property {
                end_point.on_delete = DeleteBehavior::Cascade;
            }
        }
        self
    }

    /// Returns the end point on the given class side, if any.
    #[must_use]
    pub fn end_point(&self, property: &PropertyName) -> Option<&RelationEndPointDefinition> {
        self.end_points.iter().find(|ep| &ep.property == property)
    }
}
