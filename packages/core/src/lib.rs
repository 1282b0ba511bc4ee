//! Arbor Core Tree-Node Store
//!
//! This crate provides the hierarchical tree-node store backing Arbor: a
//! persistent parent/child hierarchy where every sibling group keeps a
//! strict, contiguous, zero-based ordering ("position").
//!
//! # Architecture
//!
//! - **Contiguous positions**: within a sibling group positions are always
//!   exactly `{0, 1, .., k-1}` after every committed operation
//! - **Atomic mutations**: every structural change (insert, move, reorder,
//!   cascade delete) runs inside a single write transaction
//! - **libsql/SQLite**: embedded database with WAL mode for snapshot reads
//! - **In-memory tree assembly**: reads fetch the flat row set once and
//!   rebuild the nested view without recursive SQL
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, NodeUpdate, tree views)
//! - [`db`] - Database layer: connection lifecycle, schema, position arithmetic
//! - [`services`] - TreeStore public API, cycle detection, tree assembly

pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use db::*;
pub use models::*;
pub use services::*;
