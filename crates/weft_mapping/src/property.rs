//! Property descriptors.

use weft_foundation::{PropertyName, Value, ValueType};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Whether a property holds plain data or the foreign key of a real end point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PropertyKind {
    /// Plain data column.
    Scalar,
    /// Foreign key backing a real relation end point.
    ForeignKey,
}

/// Schema definition for one stored property of a class.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PropertyDefinition {
    /// Property name.
    pub name: PropertyName,
    /// Declared type.
    pub value_type: ValueType,
    /// Whether null is accepted.
    pub nullable: bool,
    /// Maximum length for string properties.
    pub max_length: Option<usize>,
    /// Value of the property on newly created objects.
    pub default: Value,
    /// Scalar or foreign key.
    pub kind: PropertyKind,
}

impl PropertyDefinition {
    /// Creates a non-nullable scalar property with a type-appropriate default.
    #[must_use]
    pub fn new(name: impl Into<PropertyName>, value_type: ValueType) -> Self {
        let default = match &value_type {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::String => Value::string(""),
            ValueType::Object(_) => Value::Null,
        };
        Self {
            name: name.into(),
            value_type,
            nullable: false,
            max_length: None,
            default,
            kind: PropertyKind::Scalar,
        }
    }

    /// Creates a string property.
    #[must_use]
    pub fn string(name: impl Into<PropertyName>) -> Self {
        Self::new(name, ValueType::String)
    }

    /// Creates an integer property.
    #[must_use]
    pub fn int(name: impl Into<PropertyName>) -> Self {
        Self::new(name, ValueType::Int)
    }

    /// Creates the foreign-key property of a real end point.
    #[must_use]
    pub(crate) fn foreign_key(name: PropertyName, value_type: ValueType) -> Self {
        Self {
            name,
            value_type,
            nullable: true,
            max_length: None,
            default: Value::Null,
            kind: PropertyKind::ForeignKey,
        }
    }

    /// Makes the property nullable with a null default.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self.default = Value::Null;
        self
    }

    /// Sets the maximum string length.
    #[must_use]
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    /// Returns true if this property backs a relation end point.
    #[must_use]
    pub fn is_foreign_key(&self) -> bool {
        self.kind == PropertyKind::ForeignKey
    }
}
