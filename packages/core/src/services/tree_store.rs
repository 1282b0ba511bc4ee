//! Tree Store
//!
//! `TreeStore` is the public API over the persisted hierarchy. It composes
//! the database layer (`DatabaseService`, `PositionAllocator`) with
//! `CycleGuard` and `HierarchyReader` into the full operation set:
//! create, read, rename, move, reorder, cascading delete, and the nested
//! tree view.
//!
//! # Atomicity
//!
//! Every structural mutation runs inside one `BEGIN IMMEDIATE` transaction:
//! existence and cycle checks first, then the position shifts, then the
//! structural field update. Either all of it commits or none does, so a
//! crash or a concurrent writer can never observe a sibling group whose
//! positions are not exactly `{0, .., k-1}`.
//!
//! # Concurrency
//!
//! Writers targeting the same sibling group serialize on SQLite's write
//! lock (with a busy timeout instead of immediate failure); readers run
//! against the WAL snapshot and never see a partially-shifted state.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use libsql::Connection;
use tracing::{debug, warn};

use super::cycle_guard::CycleGuard;
use super::error::TreeStoreError;
use super::hierarchy_reader::HierarchyReader;
use crate::db::{DatabaseError, DatabaseService, PositionAllocator};
use crate::models::{DeleteResult, Node, NodeUpdate, TreeSnapshot, ValidationError};

const NODE_COLUMNS: &str = "id, name, parent_id, position, created_at, updated_at";

/// Tunables for the tree store
#[derive(Debug, Clone)]
pub struct TreeStoreConfig {
    /// Cascade deletes touching at least this many descendants log a
    /// warning; the operation still proceeds, its cost is proportional to
    /// the subtree size.
    pub cascade_warn_limit: u64,
}

impl Default for TreeStoreConfig {
    fn default() -> Self {
        Self {
            cascade_warn_limit: 1000,
        }
    }
}

/// Public API over the persisted hierarchy.
///
/// Cheap to clone; all clones share the injected database handle.
#[derive(Debug, Clone)]
pub struct TreeStore {
    db: Arc<DatabaseService>,
    config: TreeStoreConfig,
}

impl TreeStore {
    /// Create a store over an open database handle with default tunables
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self::with_config(db, TreeStoreConfig::default())
    }

    /// Create a store with explicit tunables
    pub fn with_config(db: Arc<DatabaseService>, config: TreeStoreConfig) -> Self {
        Self { db, config }
    }

    /// The underlying database handle
    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    //
    // PUBLIC OPERATIONS
    //

    /// Create a node under `parent_id` (None = root group) at `position`.
    ///
    /// Siblings at or after the requested position shift up by one before
    /// the insert, so the new node lands exactly at its position with no gap
    /// above it. A position past the end of the group is clamped to append.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` - empty name or negative position
    /// - `ConstraintViolation` - `parent_id` references a nonexistent node
    pub async fn create_node(
        &self,
        name: &str,
        parent_id: Option<&str>,
        position: i64,
    ) -> Result<Node, TreeStoreError> {
        Node::validate_name(name)?;
        Node::validate_position(position)?;

        let tx = self.db.begin_write().await?;

        if let Some(parent) = parent_id {
            if !Self::node_exists(&tx, parent).await? {
                return Err(TreeStoreError::missing_parent(parent));
            }
        }

        let group_len = PositionAllocator::group_len(&tx, parent_id).await?;
        let position = position.min(group_len);

        PositionAllocator::open_gap(&tx, parent_id, position).await?;

        let node = Node::new(name.to_string(), parent_id.map(str::to_string), position);
        tx.execute(
            &format!("INSERT INTO nodes ({}) VALUES (?, ?, ?, ?, ?, ?)", NODE_COLUMNS),
            (
                node.id.as_str(),
                node.name.as_str(),
                node.parent_id.as_deref(),
                node.position,
                node.created_at.to_rfc3339(),
                node.updated_at.to_rfc3339(),
            ),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert node: {}", e)))?;

        tx.commit().await.map_err(DatabaseError::from)?;

        debug!(
            id = %node.id,
            parent_id = node.parent_id.as_deref().unwrap_or("<root>"),
            position = node.position,
            "created node"
        );

        Ok(node)
    }

    /// Fetch a node by id
    ///
    /// # Errors
    ///
    /// `NotFound` when the id is absent.
    pub async fn get_node(&self, id: &str) -> Result<Node, TreeStoreError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::require_node(&conn, id).await
    }

    /// Rename a node; only `name` and `updated_at` change.
    ///
    /// # Errors
    ///
    /// `NotFound` / `InvalidInput` (empty name).
    pub async fn rename_node(&self, id: &str, name: &str) -> Result<Node, TreeStoreError> {
        Node::validate_name(name)?;

        let tx = self.db.begin_write().await?;
        Self::require_node(&tx, id).await?;

        tx.execute(
            "UPDATE nodes SET name = ?, updated_at = ? WHERE id = ?",
            (name, Utc::now().to_rfc3339(), id),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to rename node: {}", e)))?;

        let node = Self::require_node(&tx, id).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        debug!(id = %node.id, "renamed node");
        Ok(node)
    }

    /// Move a node under a new parent (None = root group) at `new_position`.
    ///
    /// CycleGuard validates the target first: moving a node under itself or
    /// under one of its descendants fails `InvalidOperation` and changes
    /// nothing. The old group's gap closes and the new group opens one, both
    /// inside the same transaction.
    ///
    /// # Errors
    ///
    /// - `NotFound` - `id` or a non-null `new_parent_id` is absent
    /// - `InvalidOperation` - the move would create a cycle
    /// - `InvalidInput` - negative position
    pub async fn move_node(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        new_position: i64,
    ) -> Result<Node, TreeStoreError> {
        let tx = self.db.begin_write().await?;

        let node = Self::require_node(&tx, id).await?;
        self.apply_move(&tx, &node, new_parent_id, new_position)
            .await?;

        let node = Self::require_node(&tx, id).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        debug!(
            id = %node.id,
            parent_id = node.parent_id.as_deref().unwrap_or("<root>"),
            position = node.position,
            "moved node"
        );
        Ok(node)
    }

    /// Reorder a node within its current sibling group.
    ///
    /// Equivalent to `move_node(id, <current parent>, new_position)`.
    /// Reordering to the current position is a no-op that leaves every
    /// field, timestamps included, untouched.
    pub async fn reorder_node(&self, id: &str, new_position: i64) -> Result<Node, TreeStoreError> {
        let tx = self.db.begin_write().await?;

        let node = Self::require_node(&tx, id).await?;
        let parent_id = node.parent_id.clone();
        self.apply_move(&tx, &node, parent_id.as_deref(), new_position)
            .await?;

        let node = Self::require_node(&tx, id).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        Ok(node)
    }

    /// Partial update: rename and/or move/reorder in one atomic unit.
    ///
    /// Supplying `parent_id` and/or `position` behaves as `move_node` /
    /// `reorder_node`; supplying `parent_id` without `position` inserts at
    /// position 0, matching the create default.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when no field is supplied, plus everything the
    /// underlying rename/move can raise. Nothing applies on failure.
    pub async fn update_node(&self, id: &str, update: NodeUpdate) -> Result<Node, TreeStoreError> {
        if update.is_empty() {
            return Err(ValidationError::MissingField(
                "name, parent_id, or position".to_string(),
            )
            .into());
        }

        if let Some(name) = &update.name {
            Node::validate_name(name)?;
        }

        let tx = self.db.begin_write().await?;
        let mut node = Self::require_node(&tx, id).await?;

        if let Some(name) = &update.name {
            tx.execute(
                "UPDATE nodes SET name = ?, updated_at = ? WHERE id = ?",
                (name.as_str(), Utc::now().to_rfc3339(), id),
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to rename node: {}", e)))?;
            node.name = name.clone();
        }

        if update.parent_id.is_some() || update.position.is_some() {
            let new_parent = match &update.parent_id {
                Some(parent) => parent.clone(),
                None => node.parent_id.clone(),
            };
            let new_position = update
                .position
                .unwrap_or(if update.parent_id.is_some() { 0 } else { node.position });

            self.apply_move(&tx, &node, new_parent.as_deref(), new_position)
                .await?;
        }

        let node = Self::require_node(&tx, id).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        debug!(id = %node.id, "updated node");
        Ok(node)
    }

    /// Delete a node and its entire subtree, then close the gap left in the
    /// old sibling group.
    ///
    /// Returns the removed node, the descendant count, and how many former
    /// siblings shifted down. Subtrees at or above the configured warn limit
    /// are logged before deletion.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id is absent.
    pub async fn delete_node(&self, id: &str) -> Result<DeleteResult, TreeStoreError> {
        let tx = self.db.begin_write().await?;

        let node = Self::require_node(&tx, id).await?;
        let descendants_removed = Self::count_descendants(&tx, id).await?;

        if descendants_removed >= self.config.cascade_warn_limit {
            warn!(
                id = %node.id,
                descendants = descendants_removed,
                limit = self.config.cascade_warn_limit,
                "cascade delete over soft limit"
            );
        }

        // ON DELETE CASCADE removes the subtree with the root row
        tx.execute("DELETE FROM nodes WHERE id = ?", [id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete node: {}", e)))?;

        let siblings_shifted =
            PositionAllocator::close_gap(&tx, node.parent_id.as_deref(), node.position).await?;

        tx.commit().await.map_err(DatabaseError::from)?;

        debug!(
            id = %node.id,
            descendants = descendants_removed,
            siblings_shifted,
            "deleted node"
        );

        Ok(DeleteResult {
            node,
            descendants_removed,
            siblings_shifted,
        })
    }

    /// One sibling group, ordered by position (ties by id, defensive).
    ///
    /// # Errors
    ///
    /// `NotFound` when a non-null `parent_id` is absent.
    pub async fn get_children(&self, parent_id: Option<&str>) -> Result<Vec<Node>, TreeStoreError> {
        let conn = self.db.connect_with_timeout().await?;

        if let Some(parent) = parent_id {
            if !Self::node_exists(&conn, parent).await? {
                return Err(TreeStoreError::node_not_found(parent));
            }
        }

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM nodes WHERE parent_id IS ? ORDER BY position, id",
                NODE_COLUMNS
            ))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare children query: {}", e))
            })?;

        let mut rows = stmt.query([parent_id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to query children: {}", e))
        })?;

        let mut children = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            children.push(Self::row_to_node(&row)?);
        }
        Ok(children)
    }

    /// Full nested view of the store.
    ///
    /// Fetches the flat row set once and hands it to `HierarchyReader`;
    /// orphaned rows (possible only under corrupt data) are surfaced in the
    /// snapshot and logged.
    pub async fn list_tree(&self) -> Result<TreeSnapshot, TreeStoreError> {
        let conn = self.db.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM nodes", NODE_COLUMNS))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare tree query: {}", e))
            })?;

        let mut rows = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to query node rows: {}", e))
        })?;

        let mut flat = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            flat.push(Self::row_to_node(&row)?);
        }

        let snapshot = HierarchyReader::build_tree(flat);
        if !snapshot.orphans.is_empty() {
            warn!(
                orphans = snapshot.orphans.len(),
                "tree snapshot surfaced orphaned rows"
            );
        }
        Ok(snapshot)
    }

    /// Total number of nodes in the store
    pub async fn node_count(&self) -> Result<i64, TreeStoreError> {
        Ok(self.db.node_count().await?)
    }

    //
    // INTERNALS
    //

    /// Validate and apply a parent/position change on the open transaction.
    ///
    /// Runs every check (target existence, cycle) before the first write.
    /// The requested position is clamped to the target group's valid range;
    /// a same-group move to the current position is a no-op.
    async fn apply_move(
        &self,
        tx: &Connection,
        node: &Node,
        new_parent_id: Option<&str>,
        new_position: i64,
    ) -> Result<(), TreeStoreError> {
        Node::validate_position(new_position)?;

        let same_group =
            PositionAllocator::same_group(node.parent_id.as_deref(), new_parent_id);

        if !same_group {
            if let Some(parent) = new_parent_id {
                if parent == node.id {
                    return Err(TreeStoreError::circular_reference(format!(
                        "cannot move node {} under itself",
                        node.id
                    )));
                }
                if !Self::node_exists(tx, parent).await? {
                    return Err(TreeStoreError::node_not_found(parent));
                }
                CycleGuard::check(tx, &node.id, new_parent_id).await?;
            }
        }

        let group_len = PositionAllocator::group_len(tx, new_parent_id).await?;
        // Same-group: highest valid slot is k-1; cross-group: appending at k
        let max_position = if same_group { group_len - 1 } else { group_len };
        let new_position = new_position.min(max_position.max(0));

        if same_group && new_position == node.position {
            return Ok(());
        }

        PositionAllocator::relocate(
            tx,
            &node.id,
            node.parent_id.as_deref(),
            node.position,
            new_parent_id,
            new_position,
            &Utc::now().to_rfc3339(),
        )
        .await?;

        Ok(())
    }

    /// Count the descendants of `id` with iterative frontier scans over the
    /// `parent_id` index; bounded by the subtree size, not the whole tree.
    async fn count_descendants(tx: &Connection, id: &str) -> Result<u64, TreeStoreError> {
        let mut frontier = vec![id.to_string()];
        let mut count: u64 = 0;

        while let Some(parent) = frontier.pop() {
            let mut stmt = tx
                .prepare("SELECT id FROM nodes WHERE parent_id = ?")
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!(
                        "Failed to prepare descendant query: {}",
                        e
                    ))
                })?;

            let mut rows = stmt.query([parent.as_str()]).await.map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to query descendants: {}", e))
            })?;

            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
            {
                count += 1;
                frontier.push(row.get::<String>(0).map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to read descendant id: {}", e))
                })?);
            }
        }

        Ok(count)
    }

    async fn node_exists(conn: &Connection, id: &str) -> Result<bool, TreeStoreError> {
        Ok(Self::fetch_node(conn, id).await?.is_some())
    }

    async fn require_node(conn: &Connection, id: &str) -> Result<Node, TreeStoreError> {
        Self::fetch_node(conn, id)
            .await?
            .ok_or_else(|| TreeStoreError::node_not_found(id))
    }

    async fn fetch_node(conn: &Connection, id: &str) -> Result<Option<Node>, TreeStoreError> {
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM nodes WHERE id = ?", NODE_COLUMNS))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare node query: {}", e))
            })?;

        let mut rows = stmt.query([id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to query node: {}", e))
        })?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(Some(Self::row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    /// Convert a `nodes` row into the model.
    ///
    /// Expected columns, in order: id, name, parent_id, position,
    /// created_at, updated_at.
    fn row_to_node(row: &libsql::Row) -> Result<Node, TreeStoreError> {
        let id: String = row
            .get(0)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get id: {}", e)))?;
        let name: String = row
            .get(1)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get name: {}", e)))?;
        let parent_id: Option<String> = row
            .get(2)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get parent_id: {}", e)))?;
        let position: i64 = row
            .get(3)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get position: {}", e)))?;
        let created_at_str: String = row
            .get(4)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get created_at: {}", e)))?;
        let updated_at_str: String = row
            .get(5)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get updated_at: {}", e)))?;

        let created_at = parse_timestamp(&created_at_str).map_err(DatabaseError::sql_execution)?;
        let updated_at = parse_timestamp(&updated_at_str).map_err(DatabaseError::sql_execution)?;

        Ok(Node {
            id,
            name,
            parent_id,
            position,
            created_at,
            updated_at,
        })
    }
}

/// Parse a stored timestamp - handles both SQLite and RFC3339 formats
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    Err(format!(
        "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
        s
    ))
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "tree_store_test.rs"]
mod tree_store_test;
