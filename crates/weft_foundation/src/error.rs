//! Error types for the Weft system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::id::{ClassId, ObjectId, PropertyName, TransactionId};
use crate::value::ValueType;

/// Result alias used throughout Weft.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Weft operations.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates an object discarded error.
    #[must_use]
    pub fn object_discarded(id: ObjectId) -> Self {
        Self::new(ErrorKind::ObjectDiscarded(id))
    }

    /// Creates an object deleted error.
    #[must_use]
    pub fn object_deleted(id: ObjectId) -> Self {
        Self::new(ErrorKind::ObjectDeleted(id))
    }

    /// Creates an object not found error.
    #[must_use]
    pub fn object_not_found(id: ObjectId) -> Self {
        Self::new(ErrorKind::ObjectNotFound(id))
    }

    /// Creates a cross-transaction error.
    #[must_use]
    pub fn cross_transaction(object: ObjectId, transaction: TransactionId) -> Self {
        Self::new(ErrorKind::CrossTransaction {
            object,
            transaction,
        })
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: ValueType, actual: Option<ValueType>) -> Self {
        Self::new(ErrorKind::TypeMismatch { expected, actual })
    }

    /// Creates an operation cancelled error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::OperationCancelled(reason.into()))
    }

    /// Creates a reentrancy violation error.
    #[must_use]
    pub fn reentrancy() -> Self {
        Self::new(ErrorKind::ReentrancyViolation)
    }

    /// Creates a storage failure error.
    #[must_use]
    pub fn storage(failure: StorageFailure) -> Self {
        Self::new(ErrorKind::Storage(failure))
    }

    /// Creates an unknown property error.
    #[must_use]
    pub fn unknown_property(class: ClassId, property: PropertyName) -> Self {
        Self::new(ErrorKind::UnknownProperty { class, property })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }

    /// Returns true if a listener vetoed the operation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind, ErrorKind::OperationCancelled(_))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    /// The object was discarded; every further use fails.
    #[error("object discarded: {0}")]
    ObjectDiscarded(ObjectId),

    /// The object is deleted and cannot be modified.
    #[error("object deleted: {0}")]
    ObjectDeleted(ObjectId),

    /// The object does not exist in storage.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// A handle was used in a transaction it is not enlisted in.
    #[error("object {object} cannot be used in transaction {transaction}")]
    CrossTransaction {
        /// The object whose handle was used.
        object: ObjectId,
        /// The transaction it was used in.
        transaction: TransactionId,
    },

    /// A value or related object has the wrong declared type.
    #[error("type mismatch: expected {expected}, got {}", display_actual(.actual))]
    TypeMismatch {
        /// The declared type.
        expected: ValueType,
        /// The type encountered (`None` for null).
        actual: Option<ValueType>,
    },

    /// A listener vetoed the operation; nothing was changed.
    #[error("operation cancelled: {0}")]
    OperationCancelled(String),

    /// The transaction was re-entered while executing a protocol.
    #[error("reentrant access to a transaction while it is executing an operation")]
    ReentrancyViolation,

    /// The storage provider rejected a load or a save.
    #[error("storage failure: {0}")]
    Storage(StorageFailure),

    /// The class is not part of the mapping.
    #[error("unknown class: {0}")]
    UnknownClass(ClassId),

    /// The property is not defined on the class.
    #[error("unknown property: {property} on class {class}")]
    UnknownProperty {
        /// The class that was queried.
        class: ClassId,
        /// The property that was not found.
        property: PropertyName,
    },

    /// The property is a scalar property, not a relation end point.
    #[error("property {0} is not a relation property")]
    NotARelation(PropertyName),

    /// The property is a relation property and must be changed through the relation API.
    #[error("property {0} is a relation property")]
    RelationProperty(PropertyName),

    /// A single-valued operation was used on a collection end point or vice versa.
    #[error("wrong cardinality for relation property {0}")]
    WrongCardinality(PropertyName),

    /// The item is already contained in the collection.
    #[error("collection already contains {0}")]
    DuplicateItem(ObjectId),

    /// The item is not contained in the collection.
    #[error("collection does not contain {0}")]
    ItemNotFound(ObjectId),

    /// Index out of bounds.
    #[error("index out of bounds: {index} (length {length})")]
    IndexOutOfBounds {
        /// The index that was accessed.
        index: usize,
        /// The actual length of the collection.
        length: usize,
    },

    /// The collection is a read-only snapshot.
    #[error("collection is read-only")]
    ReadOnlyCollection,

    /// The transaction cannot be modified (it has an active sub-transaction).
    #[error("transaction {0} is read-only")]
    ReadOnlyTransaction(TransactionId),

    /// A mandatory relation is empty at commit time.
    #[error("mandatory relation {property} of {object} is not set")]
    MandatoryRelationNotSet {
        /// The object owning the relation.
        object: ObjectId,
        /// The relation property.
        property: PropertyName,
    },

    /// Null assigned to a non-nullable property.
    #[error("property {0} does not accept null")]
    NullNotAllowed(PropertyName),

    /// String longer than the declared maximum length.
    #[error("value of {property} exceeds maximum length {max_length}")]
    ValueTooLong {
        /// The property being assigned.
        property: PropertyName,
        /// The declared maximum length.
        max_length: usize,
    },

    /// The mapping configuration is inconsistent.
    #[error("invalid mapping: {0}")]
    InvalidMapping(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

fn display_actual(actual: &Option<ValueType>) -> String {
    actual
        .as_ref()
        .map_or_else(|| "null".to_string(), ToString::to_string)
}

/// Reasons a storage provider can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageFailure {
    /// The requested object does not exist in storage.
    NotFound(ObjectId),
    /// The stored timestamp no longer matches the one the object was loaded with.
    ConcurrencyViolation(ObjectId),
    /// The store rejected the operation.
    Rejected(String),
}

impl fmt::Display for StorageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "{id} not found"),
            Self::ConcurrencyViolation(id) => {
                write!(f, "concurrency violation on {id}")
            }
            Self::Rejected(message) => write!(f, "rejected: {message}"),
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that failed.
    pub operation: Option<String>,
    /// The object the operation targeted.
    pub object: Option<ObjectId>,
    /// The property the operation targeted.
    pub property: Option<PropertyName>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failing operation.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Sets the target object.
    #[must_use]
    pub fn with_object(mut self, object: ObjectId) -> Self {
        self.object = Some(object);
        self
    }

    /// Sets the target property.
    #[must_use]
    pub fn with_property(mut self, property: PropertyName) -> Self {
        self.property = Some(property);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(operation) = &self.operation {
            write!(f, "in {operation}")?;
        }
        if let Some(object) = &self.object {
            write!(f, " on {object}")?;
            if let Some(property) = &self.property {
                write!(f, ".{property}")?;
            }
        }
        Ok(())
    }
}
