//! Configuration for client transactions.

/// Configuration for one client transaction.
///
/// Controls commit validation, event tracing, traversal limits, and how
/// deletes and handles behave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Fail commits that leave a mandatory relation of a new or changed object empty.
    pub validate_mandatory_relations: bool,

    /// Emit a `trace!` record for every dispatched notification.
    pub trace_events: bool,

    /// Depth cap for graph traversals, applied on top of the strategy.
    pub max_traversal_depth: Option<usize>,

    /// Delete the related objects of end points declared `Cascade`.
    pub cascade_deletes: bool,

    /// Hand out handles bound to the transaction.
    pub bind_objects: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            validate_mandatory_relations: true,
            trace_events: false,
            max_traversal_depth: None,
            cascade_deletes: true,
            bind_objects: false,
        }
    }
}

impl TransactionConfig {
    /// Creates a configuration for binding transactions.
    #[must_use]
    pub fn binding() -> Self {
        Self {
            bind_objects: true,
            ..Self::default()
        }
    }

    /// Creates a configuration that traces every notification.
    #[must_use]
    pub fn tracing() -> Self {
        Self {
            trace_events: true,
            ..Self::default()
        }
    }

    /// Builder method to enable/disable mandatory relation checks on commit.
    #[must_use]
    pub fn with_validate_mandatory_relations(mut self, validate: bool) -> Self {
        self.validate_mandatory_relations = validate;
        self
    }

    /// Builder method to enable/disable event tracing.
    #[must_use]
    pub fn with_trace_events(mut self, trace: bool) -> Self {
        self.trace_events = trace;
        self
    }

    /// Builder method to set the traversal depth cap.
    #[must_use]
    pub fn with_max_traversal_depth(mut self, depth: Option<usize>) -> Self {
        self.max_traversal_depth = depth;
        self
    }

    /// Builder method to enable/disable cascading deletes.
    #[must_use]
    pub fn with_cascade_deletes(mut self, cascade: bool) -> Self {
        self.cascade_deletes = cascade;
        self
    }

    /// Builder method to enable/disable bound handles.
    #[must_use]
    pub fn with_bind_objects(mut self, bind: bool) -> Self {
        self.bind_objects = bind;
        self
    }
}
