//! Change tracking and relation consistency for Weft.
//!
//! This crate provides:
//! - [`PropertyState`] - Original/current value holder with touched tracking
//! - [`DataContainer`] - Per-object property states and lifecycle
//! - [`DomainObjectCollection`] - Ordered, ID-keyed collection of handles
//! - [`RelationEndPoint`] - Real, virtual-single, and virtual-collection end points
//! - [`RelationEndPointMap`] - End point registry and the relation change protocol
//! - [`TransactionEvent`] - Cancelable two-phase notifications

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod change;
pub mod collection;
pub mod container;
pub mod domain_object;
pub mod end_point;
pub mod end_point_map;
pub mod event;
pub mod property;

pub use change::{EndPointModification, Plan, RelationChange};
pub use collection::{DomainObjectCollection, ItemType};
pub use container::{DataContainer, DataContainerMap, ObjectState};
pub use domain_object::DomainObject;
pub use end_point::{CollectionEndPoint, ObjectEndPoint, RelationEndPoint, RelationEndPointId};
pub use end_point_map::RelationEndPointMap;
pub use event::{
    Cancelled, EventRecorder, EventSink, ListenerId, ListenerRegistry, ListenerResult, NullSink,
    TransactionEvent, TransactionListener,
};
pub use property::PropertyState;
