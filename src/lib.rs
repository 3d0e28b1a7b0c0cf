//! Weft - Transactional change tracking for in-memory object graphs
//!
//! This crate re-exports all layers of the Weft system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: weft_transaction - Client transactions, data manager, storage, traversal
//! Layer 2: weft_data        - Data containers, relation end points, change protocol, events
//! Layer 1: weft_mapping     - Class and relation metadata
//! Layer 0: weft_foundation  - Core types (ObjectId, Value, Error)
//! ```

pub use weft_data as data;
pub use weft_foundation as foundation;
pub use weft_mapping as mapping;
pub use weft_transaction as transaction;
