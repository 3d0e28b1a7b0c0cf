//! Client transactions for Weft.
//!
//! This crate provides:
//! - [`ClientTransaction`] - The unit of work over object handles
//! - [`DataManager`] - Lazy loading, cascading delete, commit, and rollback
//! - [`StorageProvider`] - The storage collaborator, with an in-memory implementation
//! - [`GraphTraverser`] - Policy-driven, cycle-safe object graph traversal
//! - [`TransactionScope`] - The thread's current transaction
//!
//! # Example
//!
//! ```
//! use weft_transaction::testing::{customer, order, seeded_transaction};
//!
//! let (tx, _storage) = seeded_transaction();
//! let grace = tx.get_object(&customer(2))?;
//! let first = tx.get_object(&order(1))?;
//!
//! tx.related_collection(&grace, "Orders")?.add(&first)?;
//! assert_eq!(tx.related_object(&first, "Customer")?, Some(grace));
//! tx.commit()?;
//! # Ok::<(), weft_foundation::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod data_manager;
pub mod relation_collection;
pub mod scope;
pub mod storage;
pub mod testing;
pub mod transaction;
pub mod traversal;

pub use config::TransactionConfig;
pub use data_manager::DataManager;
pub use relation_collection::RelationCollection;
pub use scope::TransactionScope;
pub use storage::{
    InMemoryStorageProvider, LoadedObject, ObjectRecord, PersistenceBatch, StorageProvider,
};
pub use transaction::ClientTransaction;
pub use traversal::{
    CascadeDeleteStrategy, FullTraversal, GraphTraverser, RelationGraph, TraversalStrategy,
};
