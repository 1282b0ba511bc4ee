//! Database Service
//!
//! `DatabaseService` owns the libsql database handle: it opens (or creates)
//! the database file, initializes the schema, and hands out connections and
//! write transactions to the store layer.
//!
//! # Schema
//!
//! A single `nodes` table keyed by synthetic id:
//!
//! - `parent_id` is a nullable self-reference with `ON DELETE CASCADE`, so
//!   deleting a node removes its entire subtree in one statement
//! - `position` is the zero-based ordering key within a sibling group
//! - `idx_nodes_parent` makes sibling-group scans and cascade deletes
//!   efficient; `idx_nodes_parent_position` serves ordered sibling reads
//!
//! # SQLite Configuration
//!
//! - WAL mode: readers see a consistent snapshot while a writer runs
//! - `busy_timeout = 5000`: concurrent writers wait and retry instead of
//!   failing immediately on lock
//! - `foreign_keys = ON` per connection: required for the cascade

use std::path::PathBuf;
use std::sync::Arc;

use libsql::{Builder, TransactionBehavior};

use super::error::DatabaseError;

/// Handle to the embedded database, injected into the tree store.
///
/// Cheap to clone via `Arc`; lifecycle (open/close) is managed by the
/// caller, not by global state.
#[derive(Debug, Clone)]
pub struct DatabaseService {
    db: Arc<libsql::Database>,
    db_path: PathBuf,
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` and initialize the schema.
    ///
    /// Creates the parent directory when missing. Initialization is
    /// idempotent (`CREATE TABLE IF NOT EXISTS`), so reopening an existing
    /// database is safe.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the parent directory cannot be created,
    /// the connection fails, or schema initialization fails.
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if db_path.as_os_str().is_empty() {
            return Err(DatabaseError::invalid_path(db_path));
        }

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema().await?;

        Ok(service)
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so query() must be used instead of
    /// execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration (idempotent)
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        // Enable WAL mode for snapshot reads under a concurrent writer
        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                parent_id TEXT,
                position INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                -- Parent deletion cascades through the subtree
                FOREIGN KEY (parent_id) REFERENCES nodes(id) ON DELETE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create nodes table: {}", e))
        })?;

        // Sibling-group scans and cascade deletes
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create parent index: {}", e))
        })?;

        // Ordered sibling reads
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_nodes_parent_position
             ON nodes(parent_id, position)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create position index: {}", e))
        })?;

        Ok(())
    }

    /// Get a raw connection without per-connection pragmas.
    ///
    /// Prefer `connect_with_timeout()` in async code; this exists for
    /// synchronous contexts and tests that need an unconfigured connection.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection configured for concurrent use.
    ///
    /// Sets a 5-second busy timeout so concurrent operations wait and retry
    /// instead of failing immediately when the database is locked, and turns
    /// foreign keys on so subtree deletion cascades.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Begin a write transaction for one structural mutation.
    ///
    /// `BEGIN IMMEDIATE` takes the write lock up front, so two mutations
    /// targeting the same sibling group serialize instead of both computing
    /// stale position sets. Dropping the transaction without committing
    /// rolls it back, leaving the store unchanged.
    pub async fn begin_write(&self) -> Result<libsql::Transaction, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        conn.transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to begin write transaction: {}", e))
            })
    }

    /// Total number of node rows
    pub async fn node_count(&self) -> Result<i64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare("SELECT COUNT(*) FROM nodes")
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare count query: {}", e))
            })?;

        let mut rows = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute count query: {}", e))
        })?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
            .ok_or_else(|| DatabaseError::sql_execution("COUNT(*) returned no rows"))?;

        row.get::<i64>(0)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to read count: {}", e)))
    }

    /// Flush the WAL to the main database file and release the handle.
    ///
    /// Safe to call at shutdown; subsequent operations on clones of this
    /// service still work (SQLite reopens the WAL as needed).
    pub async fn close(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp() -> (DatabaseService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = DatabaseService::new(db_path).await.unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_database_creation() {
        let (db, _temp) = open_temp().await;
        assert_eq!(db.node_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_path_rejected() {
        let err = DatabaseService::new(PathBuf::new()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_parent_directory_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("dirs").join("test.db");
        let db = DatabaseService::new(db_path.clone()).await.unwrap();
        assert_eq!(db.path(), &db_path);
        assert!(db_path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_idempotent_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let first = DatabaseService::new(db_path.clone()).await.unwrap();
        let conn = first.connect_with_timeout().await.unwrap();
        conn.execute(
            "INSERT INTO nodes (id, name, parent_id, position, created_at, updated_at)
             VALUES ('n1', 'kept', NULL, 0, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            (),
        )
        .await
        .unwrap();

        // Reopening must not reset existing data
        let second = DatabaseService::new(db_path).await.unwrap();
        assert_eq!(second.node_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_schema_has_parent_indexes() {
        let (db, _temp) = open_temp().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'nodes'")
            .await
            .unwrap();
        let mut rows = stmt.query(()).await.unwrap();

        let mut names = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            names.push(row.get::<String>(0).unwrap());
        }

        assert!(names.contains(&"idx_nodes_parent".to_string()));
        assert!(names.contains(&"idx_nodes_parent_position".to_string()));
    }

    #[tokio::test]
    async fn test_write_transaction_rollback_on_drop() {
        let (db, _temp) = open_temp().await;

        {
            let tx = db.begin_write().await.unwrap();
            tx.execute(
                "INSERT INTO nodes (id, name, parent_id, position, created_at, updated_at)
                 VALUES ('n1', 'ghost', NULL, 0, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                (),
            )
            .await
            .unwrap();
            // Dropped without commit
        }

        assert_eq!(db.node_count().await.unwrap(), 0);
    }
}
