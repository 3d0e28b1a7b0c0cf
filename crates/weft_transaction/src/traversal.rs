//! Policy-driven traversal of the object graph.
//!
//! A depth-first walk from a root, guarded by a visited set keyed on object
//! identity. Bidirectional relations make cycles routine; the visited set
//! is the only cycle guard, so every reachable object is visited once.
//!
//! Two hooks steer the walk:
//! - [`TraversalStrategy::should_process_object`] decides whether a reached
//!   object is part of the result. Objects that are not processed are still
//!   walked through.
//! - [`TraversalStrategy::should_follow_link`] decides whether to descend
//!   through one relation property of the current object.

use std::collections::HashSet;
use std::sync::Arc;

use weft_foundation::{ObjectId, PropertyName, Result};
use weft_mapping::{DeleteBehavior, MappingConfiguration};

// =============================================================================
// Graph and Strategy
// =============================================================================

/// Something whose relations can be walked.
pub trait RelationGraph {
    /// Relation properties of an object, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownClass` if the object's class is not mapped.
    fn relation_properties(&self, object: &ObjectId) -> Result<Vec<PropertyName>>;

    /// Objects related through one relation property.
    ///
    /// # Errors
    ///
    /// Returns an error if the relation cannot be loaded.
    fn related_objects(&mut self, object: &ObjectId, property: &PropertyName) -> Result<Vec<ObjectId>>;
}

/// Decides what a [`GraphTraverser`] collects and where it descends.
pub trait TraversalStrategy {
    /// Returns true if `object` belongs in the result.
    fn should_process_object(&self, object: &ObjectId) -> bool;

    /// Returns true if the walk descends from `current` (at `depth`, the root
    /// being 0) through `property`.
    fn should_follow_link(
        &self,
        root: &ObjectId,
        current: &ObjectId,
        depth: usize,
        property: &PropertyName,
    ) -> bool;
}

/// Collects everything reachable.
#[derive(Clone, Copy, Debug, Default)]
pub struct FullTraversal;

impl TraversalStrategy for FullTraversal {
    fn should_process_object(&self, _object: &ObjectId) -> bool {
        true
    }

    fn should_follow_link(
        &self,
        _root: &ObjectId,
        _current: &ObjectId,
        _depth: usize,
        _property: &PropertyName,
    ) -> bool {
        true
    }
}

/// Follows only end points declared [`DeleteBehavior::Cascade`].
///
/// The result is the set of objects deleting the root takes with it.
#[derive(Clone, Debug)]
pub struct CascadeDeleteStrategy {
    mapping: Arc<MappingConfiguration>,
}

impl CascadeDeleteStrategy {
    /// Creates the strategy for a mapping.
    #[must_use]
    pub fn new(mapping: Arc<MappingConfiguration>) -> Self {
        Self { mapping }
    }
}

impl TraversalStrategy for CascadeDeleteStrategy {
    fn should_process_object(&self, _object: &ObjectId) -> bool {
        true
    }

    fn should_follow_link(
        &self,
        _root: &ObjectId,
        current: &ObjectId,
        _depth: usize,
        property: &PropertyName,
    ) -> bool {
        self.mapping
            .end_point(&current.class_id, property)
            .is_ok_and(|definition| definition.on_delete == DeleteBehavior::Cascade)
    }
}

// =============================================================================
// Traverser
// =============================================================================

/// Walks a [`RelationGraph`] under a [`TraversalStrategy`].
#[derive(Debug)]
pub struct GraphTraverser<'s, S: TraversalStrategy + ?Sized> {
    strategy: &'s S,
    max_depth: Option<usize>,
}

impl<'s, S: TraversalStrategy + ?Sized> GraphTraverser<'s, S> {
    /// Creates a traverser without a depth cap.
    #[must_use]
    pub fn new(strategy: &'s S) -> Self {
        Self {
            strategy,
            max_depth: None,
        }
    }

    /// Stops descending below `max_depth` regardless of the strategy.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the processed objects as a set.
    ///
    /// # Errors
    ///
    /// Propagates errors from the graph.
    pub fn traverse(&self, root: &ObjectId, graph: &mut dyn RelationGraph) -> Result<HashSet<ObjectId>> {
        Ok(self.traverse_ordered(root, graph)?.into_iter().collect())
    }

    /// Returns the processed objects in depth-first pre-order.
    ///
    /// # Errors
    ///
    /// Propagates errors from the graph.
    pub fn traverse_ordered(&self, root: &ObjectId, graph: &mut dyn RelationGraph) -> Result<Vec<ObjectId>> {
        let mut visited = HashSet::new();
        let mut processed = Vec::new();
        let mut stack = vec![(root.clone(), 0usize)];

        while let Some((current, depth)) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if self.strategy.should_process_object(&current) {
                processed.push(current.clone());
            }
            if self.max_depth.is_some_and(|max| depth >= max) {
                continue;
            }

            let mut next = Vec::new();
            for property in graph.relation_properties(&current)? {
                if !self
                    .strategy
                    .should_follow_link(root, &current, depth, &property)
                {
                    continue;
                }
                for related in graph.related_objects(&current, &property)? {
                    if !visited.contains(&related) {
                        next.push((related, depth + 1));
                    }
                }
            }
            stack.extend(next.into_iter().rev());
        }
        Ok(processed)
    }
}
