//! Planned relation changes.
//!
//! A [`RelationChange`] lists every end point modification one logical
//! relation mutation needs, in notification order. It is computed without
//! mutating anything and executed by
//! [`RelationEndPointMap::execute`](crate::RelationEndPointMap::execute).

use weft_foundation::ObjectId;

use crate::end_point::RelationEndPointId;
use crate::event::TransactionEvent;

/// A change to one end point.
#[derive(Clone, Debug, PartialEq)]
pub enum EndPointModification {
    /// Replace the related object of a single-valued end point.
    SetObject {
        /// The end point.
        end_point: RelationEndPointId,
        /// Related object before.
        old: Option<ObjectId>,
        /// Related object after.
        new: Option<ObjectId>,
    },
    /// Insert an item into a collection end point.
    AddItem {
        /// The end point.
        end_point: RelationEndPointId,
        /// Insert position.
        index: usize,
        /// The item.
        item: ObjectId,
    },
    /// Remove an item from a collection end point.
    RemoveItem {
        /// The end point.
        end_point: RelationEndPointId,
        /// The item.
        item: ObjectId,
    },
    /// Replace the item at one position of a collection end point.
    ReplaceItem {
        /// The end point.
        end_point: RelationEndPointId,
        /// Position.
        index: usize,
        /// Item being replaced.
        old_item: ObjectId,
        /// Replacement.
        new_item: ObjectId,
    },
}

impl EndPointModification {
    /// Returns the modified end point.
    #[must_use]
    pub fn end_point(&self) -> &RelationEndPointId {
        match self {
            Self::SetObject { end_point, .. }
            | Self::AddItem { end_point, .. }
            | Self::RemoveItem { end_point, .. }
            | Self::ReplaceItem { end_point, .. } => end_point,
        }
    }

    /// Cancelable notifications, in order: collection events first, then
    /// the owner's relation event.
    #[must_use]
    pub fn before_events(&self) -> Vec<TransactionEvent> {
        self.events(true)
    }

    /// Completion notifications, mirroring [`before_events`](Self::before_events).
    #[must_use]
    pub fn after_events(&self) -> Vec<TransactionEvent> {
        self.events(false)
    }

    fn events(&self, before: bool) -> Vec<TransactionEvent> {
        let end_point = self.end_point();
        let owner = end_point.object.clone();
        let property = end_point.property.clone();

        let item_event = |adding: bool, item: &ObjectId| {
            let (owner, property, item) = (owner.clone(), property.clone(), item.clone());
            match (adding, before) {
                (true, true) => TransactionEvent::ItemAdding {
                    owner,
                    property,
                    item,
                },
                (true, false) => TransactionEvent::ItemAdded {
                    owner,
                    property,
                    item,
                },
                (false, true) => TransactionEvent::ItemRemoving {
                    owner,
                    property,
                    item,
                },
                (false, false) => TransactionEvent::ItemRemoved {
                    owner,
                    property,
                    item,
                },
            }
        };
        let relation_event = |old_related: Option<&ObjectId>, new_related: Option<&ObjectId>| {
            let (object, property) = (owner.clone(), property.clone());
            let (old_related, new_related) = (old_related.cloned(), new_related.cloned());
            if before {
                TransactionEvent::RelationChanging {
                    object,
                    property,
                    old_related,
                    new_related,
                }
            } else {
                TransactionEvent::RelationChanged {
                    object,
                    property,
                    old_related,
                    new_related,
                }
            }
        };

        match self {
            Self::SetObject { old, new, .. } => {
                vec![relation_event(old.as_ref(), new.as_ref())]
            }
            Self::AddItem { item, .. } => {
                vec![item_event(true, item), relation_event(None, Some(item))]
            }
            Self::RemoveItem { item, .. } => {
                vec![item_event(false, item), relation_event(Some(item), None)]
            }
            Self::ReplaceItem {
                old_item, new_item, ..
            } => vec![
                item_event(false, old_item),
                item_event(true, new_item),
                relation_event(Some(old_item), Some(new_item)),
            ],
        }
    }
}

/// Every end point modification of one logical relation mutation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelationChange {
    /// Modifications raising notifications, in notification order.
    pub notified: Vec<EndPointModification>,
    /// Modifications applied without notifications (the end points of an
    /// object being deleted).
    pub silent: Vec<EndPointModification>,
    /// End points marked touched without being modified.
    pub touched: Vec<RelationEndPointId>,
}

impl RelationChange {
    /// Creates a change that only touches end points.
    #[must_use]
    pub fn touch_only(touched: Vec<RelationEndPointId>) -> Self {
        Self {
            touched,
            ..Self::default()
        }
    }

    /// Returns true if nothing is modified or touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notified.is_empty() && self.silent.is_empty() && self.touched.is_empty()
    }

    /// Appends the modifications of another change.
    pub fn extend(&mut self, other: Self) {
        self.notified.extend(other.notified);
        self.silent.extend(other.silent);
        self.touched.extend(other.touched);
    }

    /// All cancelable notifications, in order.
    #[must_use]
    pub fn before_events(&self) -> Vec<TransactionEvent> {
        self.notified
            .iter()
            .flat_map(EndPointModification::before_events)
            .collect()
    }

    /// All completion notifications, in order.
    #[must_use]
    pub fn after_events(&self) -> Vec<TransactionEvent> {
        self.notified
            .iter()
            .flat_map(EndPointModification::after_events)
            .collect()
    }
}

/// Outcome of planning a relation change.
#[derive(Clone, Debug, PartialEq)]
pub enum Plan {
    /// All affected end points are loaded; the change can be executed.
    Ready(RelationChange),
    /// This end point must be loaded before planning can continue.
    Load(RelationEndPointId),
}
