//! Object handles.

use std::fmt;

use weft_foundation::{ClassId, ObjectId, TransactionId};

/// A thin handle to one persistable object.
///
/// A handle carries no data. Its values live in the data container of
/// whichever transaction the handle is used with. An *unbound* handle can be
/// used in any transaction it is enlisted in; a *bound* handle belongs to
/// exactly one transaction for its whole life.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DomainObject {
    id: ObjectId,
    binding: Option<TransactionId>,
}

impl DomainObject {
    /// Creates an unbound handle.
    #[must_use]
    pub fn new(id: ObjectId) -> Self {
        Self { id, binding: None }
    }

    /// Creates a handle bound to one transaction.
    #[must_use]
    pub fn bound(id: ObjectId, transaction: TransactionId) -> Self {
        Self {
            id,
            binding: Some(transaction),
        }
    }

    /// Creates a handle, bound when `binding` is set.
    #[must_use]
    pub fn with_binding(id: ObjectId, binding: Option<TransactionId>) -> Self {
        Self { id, binding }
    }

    /// Returns the object identity.
    #[must_use]
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Returns the object's class.
    #[must_use]
    pub fn class_id(&self) -> &ClassId {
        &self.id.class_id
    }

    /// Returns the transaction this handle is bound to.
    #[must_use]
    pub fn binding(&self) -> Option<TransactionId> {
        self.binding
    }

    /// Returns true if the handle is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Returns true if the handle may be used in `transaction`.
    #[must_use]
    pub fn usable_in(&self, transaction: TransactionId) -> bool {
        self.binding.is_none_or(|bound| bound == transaction)
    }
}

impl fmt::Debug for DomainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.binding {
            Some(tx) => write!(f, "DomainObject({} @ {tx})", self.id),
            None => write!(f, "DomainObject({})", self.id),
        }
    }
}

impl fmt::Display for DomainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl From<ObjectId> for DomainObject {
    fn from(id: ObjectId) -> Self {
        Self::new(id)
    }
}
