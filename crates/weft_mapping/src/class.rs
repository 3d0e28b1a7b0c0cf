//! Class definitions.

use weft_foundation::{ClassId, PropertyName};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::property::PropertyDefinition;
use crate::relation::RelationEndPointDefinition;

/// Schema definition for a mapped class.
///
/// Once part of a [`MappingConfiguration`](crate::MappingConfiguration), the
/// property and end point lists include everything inherited from base
/// classes, base members first.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClassDefinition {
    /// Class identifier.
    pub id: ClassId,
    /// Base class, if any.
    pub base_class: Option<ClassId>,
    /// Stored properties, including foreign keys of real end points.
    pub properties: Vec<PropertyDefinition>,
    /// Relation end points.
    pub end_points: Vec<RelationEndPointDefinition>,
}

impl ClassDefinition {
    /// Creates a class definition without properties.
    #[must_use]
    pub fn new(id: impl Into<ClassId>) -> Self {
        Self {
            id: id.into(),
            base_class: None,
            properties: Vec::new(),
            end_points: Vec::new(),
        }
    }

    /// Sets the base class.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<ClassId>) -> Self {
        self.base_class = Some(base.into());
        self
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, property: PropertyDefinition) -> Self {
        self.properties.push(property);
        self
    }

    /// Returns the property definition by name.
    #[must_use]
    pub fn property(&self, name: &PropertyName) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| &p.name == name)
    }

    /// Returns the end point definition by property name.
    #[must_use]
    pub fn end_point(&self, name: &PropertyName) -> Option<&RelationEndPointDefinition> {
        self.end_points.iter().find(|ep| &ep.property == name)
    }

    /// Iterates over the relation property names in declaration order.
    pub fn relation_properties(&self) -> impl Iterator<Item = &PropertyName> {
        self.end_points.iter().map(|ep| &ep.property)
    }

    pub(crate) fn declares(&self, name: &PropertyName) -> bool {
        self.property(name).is_some() || self.end_point(name).is_some()
    }
}
