//! Data Models
//!
//! This module contains the core data structures used throughout Arbor:
//!
//! - `Node` - a single row of the persisted hierarchy
//! - `NodeUpdate` - partial update (rename and/or move/reorder in one call)
//! - `DeleteResult` - outcome of a cascading delete
//! - `TreeBranch` / `TreeSnapshot` - nested views assembled from flat rows
//!
//! All node data lives in the single `nodes` table; the nested views are
//! assembled in memory on every read and never persisted.

mod node;
mod tree;

pub use node::{DeleteResult, Node, NodeUpdate, ValidationError};
pub use tree::{TreeBranch, TreeSnapshot};
