//! Database Layer
//!
//! This module handles all database interactions using libsql (embedded
//! SQLite-compatible storage):
//!
//! - Database initialization and connection management
//! - The single `nodes` table with its `parent_id` indexes
//! - Write transactions used by every structural mutation
//! - Position arithmetic for sibling groups (`PositionAllocator`)
//!
//! # Architecture
//!
//! The store is handed an explicit `DatabaseService` handle; there is no
//! process-wide connection singleton. Callers own the lifecycle: construct
//! with `DatabaseService::new(path)` and release with `close()`.
//!
//! WAL mode gives readers snapshot isolation while a writer runs, and
//! `BEGIN IMMEDIATE` transactions serialize conflicting writers with a busy
//! timeout instead of failing immediately.

mod database;
mod error;
mod position;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub use position::PositionAllocator;
