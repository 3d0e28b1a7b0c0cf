//! Two-phase transaction notifications and listeners.
//!
//! Every protocol raises an "-ing" event before it mutates anything and an
//! "-ed" event after. A listener vetoes an "-ing" event by returning
//! [`Cancelled`]; the operation then fails with `OperationCancelled` and no
//! data has changed. Errors returned from "-ed" events are ignored.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;
use weft_foundation::{Error as WeftError, ObjectId, PropertyName, Result, Value};

// =============================================================================
// Transaction Event
// =============================================================================

/// A notification raised by a transaction.
#[derive(Clone, Debug, PartialEq)]
pub enum TransactionEvent {
    /// A scalar property is about to change.
    PropertyChanging {
        /// The object.
        object: ObjectId,
        /// The property.
        property: PropertyName,
        /// Value before the change.
        old_value: Value,
        /// Value after the change.
        new_value: Value,
    },

    /// A scalar property changed.
    PropertyChanged {
        /// The object.
        object: ObjectId,
        /// The property.
        property: PropertyName,
        /// Value before the change.
        old_value: Value,
        /// Value after the change.
        new_value: Value,
    },

    /// A relation end point is about to change.
    RelationChanging {
        /// Owner of the end point.
        object: ObjectId,
        /// Relation property.
        property: PropertyName,
        /// Related object being lost.
        old_related: Option<ObjectId>,
        /// Related object being gained.
        new_related: Option<ObjectId>,
    },

    /// A relation end point changed.
    RelationChanged {
        /// Owner of the end point.
        object: ObjectId,
        /// Relation property.
        property: PropertyName,
        /// Related object lost.
        old_related: Option<ObjectId>,
        /// Related object gained.
        new_related: Option<ObjectId>,
    },

    /// An item is about to be added to a relation collection.
    ItemAdding {
        /// Owner of the collection end point.
        owner: ObjectId,
        /// Relation property.
        property: PropertyName,
        /// The item.
        item: ObjectId,
    },

    /// An item was added to a relation collection.
    ItemAdded {
        /// Owner of the collection end point.
        owner: ObjectId,
        /// Relation property.
        property: PropertyName,
        /// The item.
        item: ObjectId,
    },

    /// An item is about to be removed from a relation collection.
    ItemRemoving {
        /// Owner of the collection end point.
        owner: ObjectId,
        /// Relation property.
        property: PropertyName,
        /// The item.
        item: ObjectId,
    },

    /// An item was removed from a relation collection.
    ItemRemoved {
        /// Owner of the collection end point.
        owner: ObjectId,
        /// Relation property.
        property: PropertyName,
        /// The item.
        item: ObjectId,
    },

    /// An object is about to be deleted.
    Deleting {
        /// The object.
        object: ObjectId,
    },

    /// An object was deleted.
    Deleted {
        /// The object.
        object: ObjectId,
    },

    /// A commit is about to write these objects.
    Committing {
        /// New, changed, and deleted objects.
        objects: Vec<ObjectId>,
    },

    /// A commit wrote these objects.
    Committed {
        /// New, changed, and deleted objects.
        objects: Vec<ObjectId>,
    },

    /// A rollback is about to revert these objects.
    RollingBack {
        /// New, changed, and deleted objects.
        objects: Vec<ObjectId>,
    },

    /// A rollback reverted these objects.
    RolledBack {
        /// New, changed, and deleted objects.
        objects: Vec<ObjectId>,
    },

    /// Objects were loaded from storage.
    ObjectsLoaded {
        /// The loaded objects.
        objects: Vec<ObjectId>,
    },
}

impl TransactionEvent {
    /// Returns a short name for the event type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PropertyChanging { .. } => "PropertyChanging",
            Self::PropertyChanged { .. } => "PropertyChanged",
            Self::RelationChanging { .. } => "RelationChanging",
            Self::RelationChanged { .. } => "RelationChanged",
            Self::ItemAdding { .. } => "ItemAdding",
            Self::ItemAdded { .. } => "ItemAdded",
            Self::ItemRemoving { .. } => "ItemRemoving",
            Self::ItemRemoved { .. } => "ItemRemoved",
            Self::Deleting { .. } => "Deleting",
            Self::Deleted { .. } => "Deleted",
            Self::Committing { .. } => "Committing",
            Self::Committed { .. } => "Committed",
            Self::RollingBack { .. } => "RollingBack",
            Self::RolledBack { .. } => "RolledBack",
            Self::ObjectsLoaded { .. } => "ObjectsLoaded",
        }
    }

    /// Returns true if a listener may veto this event.
    #[must_use]
    pub fn is_cancelable(&self) -> bool {
        matches!(
            self,
            Self::PropertyChanging { .. }
                | Self::RelationChanging { .. }
                | Self::ItemAdding { .. }
                | Self::ItemRemoving { .. }
                | Self::Deleting { .. }
                | Self::Committing { .. }
                | Self::RollingBack { .. }
        )
    }

    /// Compact rendering such as `RelationChanging(Order|1.Customer)`.
    ///
    /// Tests compare event sequences through this.
    #[must_use]
    pub fn summary(&self) -> String {
        let name = self.event_type();
        match self {
            Self::PropertyChanging {
                object, property, ..
            }
            | Self::PropertyChanged {
                object, property, ..
            }
            | Self::RelationChanging {
                object, property, ..
            }
            | Self::RelationChanged {
                object, property, ..
            } => format!("{name}({object}.{property})"),
            Self::ItemAdding {
                owner,
                property,
                item,
            }
            | Self::ItemAdded {
                owner,
                property,
                item,
            }
            | Self::ItemRemoving {
                owner,
                property,
                item,
            }
            | Self::ItemRemoved {
                owner,
                property,
                item,
            } => format!("{name}({owner}.{property}, {item})"),
            Self::Deleting { object } | Self::Deleted { object } => format!("{name}({object})"),
            Self::Committing { objects }
            | Self::Committed { objects }
            | Self::RollingBack { objects }
            | Self::RolledBack { objects }
            | Self::ObjectsLoaded { objects } => format!("{name}({})", objects.len()),
        }
    }
}

// =============================================================================
// Listeners
// =============================================================================

/// A veto raised by a listener.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("cancelled: {reason}")]
pub struct Cancelled {
    /// Why the listener vetoed.
    pub reason: String,
}

impl Cancelled {
    /// Creates a veto.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// What a listener returns: `Ok` to proceed, `Err` to veto.
pub type ListenerResult = std::result::Result<(), Cancelled>;

/// Receives transaction notifications.
pub trait TransactionListener {
    /// Handles one event. Returning `Err` from a cancelable event vetoes the operation.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] to veto.
    fn on_event(&mut self, event: &TransactionEvent) -> ListenerResult;
}

impl<F> TransactionListener for F
where
    F: FnMut(&TransactionEvent) -> ListenerResult,
{
    fn on_event(&mut self, event: &TransactionEvent) -> ListenerResult {
        self(event)
    }
}

/// Where the protocols send their notifications.
pub trait EventSink {
    /// Raises a cancelable event.
    ///
    /// # Errors
    ///
    /// Returns `OperationCancelled` if a listener vetoed.
    fn before(&mut self, event: &TransactionEvent) -> Result<()>;

    /// Raises a completion event. Listener errors are not propagated.
    fn after(&mut self, event: &TransactionEvent);
}

/// Sink that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn before(&mut self, _event: &TransactionEvent) -> Result<()> {
        Ok(())
    }

    fn after(&mut self, _event: &TransactionEvent) {}
}

/// Handle returned by [`ListenerRegistry::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The listeners of one transaction, notified in subscription order.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<(ListenerId, Box<dyn TransactionListener>)>,
    next_id: u64,
    trace_events: bool,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits a `trace!` record for every event when enabled.
    pub fn set_trace_events(&mut self, enabled: bool) {
        self.trace_events = enabled;
    }

    /// Adds a listener.
    pub fn subscribe(&mut self, listener: impl TransactionListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Returns the number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if nobody listens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn trace(&self, event: &TransactionEvent) {
        if self.trace_events {
            tracing::trace!(event = %event.summary(), "transaction event");
        }
    }
}

impl EventSink for ListenerRegistry {
    fn before(&mut self, event: &TransactionEvent) -> Result<()> {
        self.trace(event);
        for (_, listener) in &mut self.listeners {
            if let Err(cancelled) = listener.on_event(event) {
                tracing::debug!(event = %event.summary(), reason = %cancelled.reason, "operation vetoed");
                return Err(WeftError::cancelled(cancelled.reason));
            }
        }
        Ok(())
    }

    fn after(&mut self, event: &TransactionEvent) {
        self.trace(event);
        for (_, listener) in &mut self.listeners {
            if let Err(err) = listener.on_event(event) {
                tracing::warn!(event = %event.summary(), error = %err, "listener failed on completion event");
            }
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .field("trace_events", &self.trace_events)
            .finish()
    }
}

// =============================================================================
// Event Recorder
// =============================================================================

/// Listener that records every event it sees.
///
/// Clones share the same log, so one clone can be subscribed while another
/// is kept for assertions.
#[derive(Clone, Debug, Default)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<TransactionEvent>>>,
}

impl EventRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TransactionEvent> {
        self.events.borrow().clone()
    }

    /// Returns the summaries of the recorded events.
    #[must_use]
    pub fn summaries(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .map(TransactionEvent::summary)
            .collect()
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Forgets the recorded events.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl TransactionListener for EventRecorder {
    fn on_event(&mut self, event: &TransactionEvent) -> ListenerResult {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}
