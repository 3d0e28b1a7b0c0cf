//! Core identities, values, and errors for Weft.
//!
//! This crate provides:
//! - [`ObjectId`] - Transaction-independent identity of a persistable object
//! - [`Value`] - The value type held by object properties
//! - [`ValueType`] - Type descriptors for property validation
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod value;

pub use error::{Error, ErrorContext, ErrorKind, Result, StorageFailure};
pub use id::{ClassId, IdValue, ObjectId, PropertyName, Timestamp, TransactionId};
pub use value::{Value, ValueType};
