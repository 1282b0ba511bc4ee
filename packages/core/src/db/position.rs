//! Sibling Position Arithmetic
//!
//! `PositionAllocator` is the sole authority for position shifts. Every
//! method takes the connection of an already-open write transaction: shifts
//! are only ever issued inside the same atomic unit as the structural change
//! they make room for, so a committed store never exposes a gapped or
//! duplicated position set.
//!
//! # Null-safe group matching
//!
//! Sibling groups are keyed by `parent_id`, and the root group's key is
//! NULL. Ordinary SQL `=` never matches NULL, so every group comparison here
//! uses the `IS` operator: a NULL key matches only the root group, never a
//! concrete id.

use libsql::Connection;

use super::error::DatabaseError;

/// Position arithmetic for one sibling group
pub struct PositionAllocator;

impl PositionAllocator {
    /// Null-safe sibling-group key equality.
    ///
    /// Two `None` keys are the same group (the root group); `None` never
    /// equals a concrete id. Rust's `Option` equality already has these
    /// semantics, so this exists to name the comparison at call sites.
    pub fn same_group(a: Option<&str>, b: Option<&str>) -> bool {
        a == b
    }

    /// Number of nodes in the sibling group keyed by `parent_id`
    pub async fn group_len(
        conn: &Connection,
        parent_id: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        let mut stmt = conn
            .prepare("SELECT COUNT(*) FROM nodes WHERE parent_id IS ?")
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare group count: {}", e))
            })?;

        let mut rows = stmt.query([parent_id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to count sibling group: {}", e))
        })?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
            .ok_or_else(|| DatabaseError::sql_execution("COUNT(*) returned no rows"))?;

        row.get::<i64>(0)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to read group count: {}", e)))
    }

    /// Open a gap at `at_position`: every sibling with `position >=
    /// at_position` moves up by one. Returns the number of rows shifted.
    pub async fn open_gap(
        conn: &Connection,
        parent_id: Option<&str>,
        at_position: i64,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "UPDATE nodes SET position = position + 1
             WHERE parent_id IS ? AND position >= ?",
            (parent_id, at_position),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to open position gap: {}", e)))
    }

    /// Close the gap left at `removed_position`: every sibling with
    /// `position > removed_position` moves down by one. Returns the number
    /// of rows shifted.
    pub async fn close_gap(
        conn: &Connection,
        parent_id: Option<&str>,
        removed_position: i64,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "UPDATE nodes SET position = position - 1
             WHERE parent_id IS ? AND position > ?",
            (parent_id, removed_position),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to close position gap: {}", e)))
    }

    /// Move `node_id` from `(old_parent_id, old_position)` to
    /// `(new_parent_id, new_position)`, shifting both groups as needed and
    /// finally assigning the node its new parent, position, and timestamp.
    ///
    /// Same-group moves shift a single contiguous range: moving down
    /// decrements the siblings strictly between the old and new slot (the
    /// requested position is interpreted relative to the post-close state),
    /// moving up increments the siblings from the new slot up to just below
    /// the old one. Cross-group moves close the old group's gap and open one
    /// in the new group independently.
    ///
    /// A same-group move to the same position is a no-op.
    #[allow(clippy::too_many_arguments)]
    pub async fn relocate(
        conn: &Connection,
        node_id: &str,
        old_parent_id: Option<&str>,
        old_position: i64,
        new_parent_id: Option<&str>,
        new_position: i64,
        updated_at: &str,
    ) -> Result<(), DatabaseError> {
        let same_group = Self::same_group(old_parent_id, new_parent_id);

        if same_group && new_position == old_position {
            return Ok(());
        }

        if same_group {
            if new_position > old_position {
                // Down-move: pull the range (old, new] back by one
                conn.execute(
                    "UPDATE nodes SET position = position - 1
                     WHERE parent_id IS ? AND position > ? AND position <= ?",
                    (old_parent_id, old_position, new_position),
                )
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to shift siblings down: {}", e))
                })?;
            } else {
                // Up-move: push the range [new, old) forward by one
                conn.execute(
                    "UPDATE nodes SET position = position + 1
                     WHERE parent_id IS ? AND position >= ? AND position < ?",
                    (old_parent_id, new_position, old_position),
                )
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to shift siblings up: {}", e))
                })?;
            }
        } else {
            Self::close_gap(conn, old_parent_id, old_position).await?;
            Self::open_gap(conn, new_parent_id, new_position).await?;
        }

        conn.execute(
            "UPDATE nodes SET parent_id = ?, position = ?, updated_at = ? WHERE id = ?",
            (new_parent_id, new_position, updated_at, node_id),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to assign node position: {}", e))
        })?;

        Ok(())
    }
}
