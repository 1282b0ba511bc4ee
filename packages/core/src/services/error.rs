//! Tree Store Error Types
//!
//! Caller-facing error taxonomy for the tree store. Domain errors
//! (`NotFound`, `InvalidInput`, `InvalidOperation`, `ConstraintViolation`)
//! are raised before any write is issued, so a failed operation never
//! partially applies. Storage failures are wrapped in `Database` and are the
//! only retryable kind - see [`TreeStoreError::is_transient`].

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

/// Tree store operation errors
#[derive(Error, Debug)]
pub enum TreeStoreError {
    /// Referenced node id is absent
    #[error("Node not found: {id}")]
    NotFound { id: String },

    /// Empty name or missing required field
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// Structurally invalid mutation (cycle detected on move)
    #[error("Invalid operation: {context}")]
    InvalidOperation { context: String },

    /// Create referenced a nonexistent parent
    #[error("Constraint violation: parent node {parent_id} does not exist")]
    ConstraintViolation { parent_id: String },

    /// Storage-level failure (connectivity, lock timeout) - retryable
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),
}

impl TreeStoreError {
    /// Create a node not found error
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a circular reference error
    pub fn circular_reference(context: impl Into<String>) -> Self {
        Self::InvalidOperation {
            context: format!("circular reference: {}", context.into()),
        }
    }

    /// Create a constraint violation error for a missing parent
    pub fn missing_parent(parent_id: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            parent_id: parent_id.into(),
        }
    }

    /// Whether retrying the operation can succeed without caller changes.
    ///
    /// Only storage-level failures are transient; domain errors must not be
    /// retried blindly.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}
