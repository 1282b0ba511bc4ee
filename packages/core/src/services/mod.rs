//! Tree Store Services
//!
//! This module contains the public tree-store API and its collaborators:
//!
//! - `TreeStore` - create/read/update/move/reorder/delete over the hierarchy
//! - `CycleGuard` - rejects parent reassignments that would create a cycle
//! - `HierarchyReader` - rebuilds the nested view from the flat row set
//! - `TreeStoreError` - the caller-facing error taxonomy
//!
//! `TreeStore` composes the database layer (`DatabaseService`,
//! `PositionAllocator`) with the guards above; all invariant checks run
//! inside the mutation's transaction before the first write.

pub mod cycle_guard;
pub mod error;
pub mod hierarchy_reader;
pub mod tree_store;

pub use cycle_guard::CycleGuard;
pub use error::TreeStoreError;
pub use hierarchy_reader::HierarchyReader;
pub use tree_store::{TreeStore, TreeStoreConfig};
