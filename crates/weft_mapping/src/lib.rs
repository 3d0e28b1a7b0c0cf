//! Resolved mapping metadata for Weft.
//!
//! The engine never discovers metadata itself. An external loader builds a
//! [`MappingConfiguration`] once and injects it; this crate provides:
//! - [`ClassDefinition`] - Per-class property and relation end point lists
//! - [`PropertyDefinition`] - Scalar and foreign-key property descriptors
//! - [`RelationDefinition`] - Bidirectional relations and their end points
//! - [`MappingConfiguration`] - The validated, immutable lookup table

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod class;
pub mod configuration;
pub mod property;
pub mod relation;

pub use class::ClassDefinition;
pub use configuration::{MappingBuilder, MappingConfiguration};
pub use property::{PropertyDefinition, PropertyKind};
pub use relation::{
    Cardinality, DeleteBehavior, RelationDefinition, RelationEndPointDefinition, SortDirection,
    SortExpression, SortSpec,
};
