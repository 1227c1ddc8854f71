//! Database layer for branch-scoped retail data.
//!
//! This crate is the only place that talks SQL. The engine crate asks for
//! counts, cleanup statements and catalog rows through the typed methods on
//! [`BranchDb`]; table and column names it passes in are validated by
//! [`sql::Ident`] before they reach a statement.
//!
//! # Usage
//!
//! ```rust,ignore
//! use branchscope_db::BranchDb;
//!
//! let db = BranchDb::open("~/.branchscope/branchscope.sqlite3").await?;
//! let branches = db.list_branches(false).await?;
//! let counts = db.ownership_counts("orders", "branch_id", &branches[0].id, None).await?;
//! ```

mod error;
mod schema;
mod types;

pub mod sql;

// Method implementations organized by domain
mod branches;
mod catalog;
mod cleanup;
mod lock;
mod scan;

pub use error::{DbError, Result};
pub use cleanup::ForeignRows;
pub use lock::MaintenanceLock;
pub use schema::SCOPED_TABLES;
pub use types::*;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Handle to the branch-scoped database.
#[derive(Clone)]
pub struct BranchDb {
    pool: SqlitePool,
}

impl std::fmt::Debug for BranchDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchDb")
            .field("backend", &"SQLite")
            .field("connections", &self.pool.size())
            .finish()
    }
}

impl BranchDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Database opened");

        Ok(db)
    }

    /// Open an existing database (fails if not exists).
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(DbError::not_found(format!(
                "Database not found: {}",
                path.display()
            )));
        }

        let url = format!("sqlite:{}?mode=rw", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        Ok(Self { pool })
    }

    /// Open a private in-memory database with the full schema (for testing).
    ///
    /// Limited to one connection: every connection to `:memory:` is its own
    /// database, and it must never be recycled.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Wrap an existing pool without touching the schema.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool (escape hatch for fixtures and
    /// one-off queries). Prefer the typed methods.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// Timestamp utilities
impl BranchDb {
    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_database() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("test.db");

        let db = BranchDb::open(&db_path).await.unwrap();
        assert!(db_path.exists());

        db.close().await;
    }

    #[tokio::test]
    async fn test_open_existing_fails_if_not_exists() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nonexistent.db");

        let result = BranchDb::open_existing(&db_path).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_in_memory_has_schema() {
        let db = BranchDb::open_in_memory().await.unwrap();
        let columns = db.table_columns("products").await.unwrap();
        assert!(columns.iter().any(|c| c == "branch_id"));
        assert!(columns.iter().any(|c| c == "stock_quantity"));
    }
}
