//! Node Data Structures
//!
//! This module defines the core `Node` struct: one row of the persisted
//! hierarchy. A node has at most one parent (`parent_id = None` marks a
//! root) and a zero-based `position` inside its sibling group.
//!
//! # Examples
//!
//! ```rust
//! use arbor_core::models::Node;
//!
//! // Root node at the first slot of the root group
//! let root = Node::new("Projects".to_string(), None, 0);
//!
//! // Child inserted at the front of the root's children
//! let child = Node::new("Inbox".to_string(), Some(root.id.clone()), 0);
//! assert_eq!(child.parent_id.as_deref(), Some(root.id.as_str()));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Validation errors for node input
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Node name must not be empty")]
    EmptyName,

    #[error("Position must be non-negative, got {0}")]
    NegativePosition(i64),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// A single node of the hierarchy.
///
/// # Fields
///
/// - `id`: Unique identifier (UUID v4 string), immutable once assigned
/// - `name`: Non-empty display name
/// - `parent_id`: Optional reference to the parent node (`None` = root)
/// - `position`: Zero-based, contiguous ordering key within the sibling group
/// - `created_at`: Timestamp when the node was created
/// - `updated_at`: Timestamp of the last structural or name change
///
/// # Invariants
///
/// After every committed store operation, the positions of the nodes sharing
/// a `parent_id` (the "sibling group", including the root group where
/// `parent_id` is `None`) form exactly the set `{0, 1, .., k-1}` for group
/// size `k`, and no node is its own ancestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Create a new node with a generated UUID and current timestamps.
    ///
    /// Does not validate or persist anything; the store is responsible for
    /// name validation, parent existence, and position allocation.
    pub fn new(name: String, parent_id: Option<String>, position: i64) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        Self {
            id,
            name,
            parent_id,
            position,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate a node name (non-empty after trimming)
    pub fn validate_name(name: &str) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(())
    }

    /// Validate a requested position (non-negative)
    pub fn validate_position(position: i64) -> Result<(), ValidationError> {
        if position < 0 {
            return Err(ValidationError::NegativePosition(position));
        }
        Ok(())
    }
}

/// Partial update applied by `TreeStore::update_node`.
///
/// - `name`: rename when supplied
/// - `parent_id`: outer `Some` means "change the parent" (inner `None` moves
///   the node to the root group); outer `None` leaves the parent untouched
/// - `position`: reposition within the (possibly new) sibling group
///
/// Supplying `parent_id` without `position` inserts at position 0, matching
/// the create default. All supplied fields apply in one atomic unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub parent_id: Option<Option<String>>,
    pub position: Option<i64>,
}

impl NodeUpdate {
    /// Update that only renames the node
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set the target parent (None = move to root group)
    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set the target position
    pub fn with_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    /// True when no field is supplied (rejected by the store)
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.parent_id.is_none() && self.position.is_none()
    }
}

/// Outcome of a cascading delete.
///
/// `descendants_removed` counts the subtree below the deleted node (the
/// total rows removed is `descendants_removed + 1`); `siblings_shifted`
/// counts the former siblings whose position dropped by one to close the
/// gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub node: Node,
    pub descendants_removed: u64,
    pub siblings_shifted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_generates_unique_ids() {
        let a = Node::new("a".to_string(), None, 0);
        let b = Node::new("b".to_string(), None, 1);
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[test]
    fn test_validate_name_rejects_whitespace() {
        assert!(Node::validate_name("notes").is_ok());
        assert!(matches!(
            Node::validate_name("   "),
            Err(ValidationError::EmptyName)
        ));
        assert!(matches!(
            Node::validate_name(""),
            Err(ValidationError::EmptyName)
        ));
    }

    #[test]
    fn test_validate_position_rejects_negative() {
        assert!(Node::validate_position(0).is_ok());
        assert!(matches!(
            Node::validate_position(-1),
            Err(ValidationError::NegativePosition(-1))
        ));
    }

    #[test]
    fn test_node_update_emptiness() {
        assert!(NodeUpdate::default().is_empty());
        assert!(!NodeUpdate::rename("x").is_empty());
        assert!(!NodeUpdate::default().with_parent(None).is_empty());
        assert!(!NodeUpdate::default().with_position(2).is_empty());
    }

    #[test]
    fn test_node_serde_round_trip() {
        let node = Node::new("serde".to_string(), Some("parent-1".to_string()), 3);
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }
}
