//! Cleanup statements over "foreign" rows: rows owned by a branch other
//! than the given one. Unassigned rows (NULL owner) are never selected.
//!
//! Counting, reassigning and deleting all share [`ForeignRows::predicate`],
//! so a dry-run count previews exactly the rows a live run touches.

use crate::error::Result;
use crate::sql::{query_span, timed, Ident};
use crate::BranchDb;
use branchscope_ids::BranchId;
use tracing::debug;

/// Selection of rows in `table` owned by some branch other than `branch`.
#[derive(Debug, Clone)]
pub struct ForeignRows<'a> {
    pub table: &'a str,
    pub owner_column: &'a str,
    pub branch: &'a BranchId,
}

impl ForeignRows<'_> {
    /// WHERE-clause body; binds the branch id once.
    fn predicate(&self) -> Result<(Ident, String)> {
        let t = Ident::new(self.table)?;
        let o = Ident::new(self.owner_column)?;
        Ok((t, format!("{o} IS NOT NULL AND {o} <> ?")))
    }
}

impl BranchDb {
    /// Number of foreign rows (dry-run preview).
    pub async fn count_foreign_rows(&self, rows: &ForeignRows<'_>) -> Result<u64> {
        let (t, predicate) = rows.predicate()?;
        let sql = format!("SELECT COUNT(*) FROM {t} WHERE {predicate}");

        let query = sqlx::query_scalar(&sql)
            .bind(rows.branch.as_str())
            .fetch_one(&self.pool);
        let count: i64 = timed(query_span!(&sql, rows.table), query).await?;

        Ok(count.max(0) as u64)
    }

    /// Move every foreign row to `rows.branch` in one transaction.
    pub async fn reassign_foreign_rows(&self, rows: &ForeignRows<'_>) -> Result<u64> {
        let (t, predicate) = rows.predicate()?;
        let o = Ident::new(rows.owner_column)?;
        let sql = format!("UPDATE {t} SET {o} = ? WHERE {predicate}");

        let mut tx = self.pool.begin().await?;
        let update = sqlx::query(&sql)
            .bind(rows.branch.as_str())
            .bind(rows.branch.as_str())
            .execute(&mut *tx);
        let affected = timed(query_span!(&sql, rows.table), update)
            .await?
            .rows_affected();
        tx.commit().await?;

        debug!(table = rows.table, affected, "Reassigned foreign rows");
        Ok(affected)
    }

    /// Permanently delete every foreign row in one transaction.
    pub async fn delete_foreign_rows(&self, rows: &ForeignRows<'_>) -> Result<u64> {
        let (t, predicate) = rows.predicate()?;
        let sql = format!("DELETE FROM {t} WHERE {predicate}");

        let mut tx = self.pool.begin().await?;
        let delete = sqlx::query(&sql)
            .bind(rows.branch.as_str())
            .execute(&mut *tx);
        let affected = timed(query_span!(&sql, rows.table), delete)
            .await?
            .rows_affected();
        tx.commit().await?;

        debug!(table = rows.table, affected, "Deleted foreign rows");
        Ok(affected)
    }
}
