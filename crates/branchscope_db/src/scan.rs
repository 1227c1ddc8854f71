//! Ownership counts over branch-scoped tables.
//!
//! Both queries are single grouped aggregates, so the categories of one
//! call come from the same read. Counts from separate calls may drift under
//! concurrent writes.

use crate::error::Result;
use crate::sql::{query_span, timed, Ident};
use crate::types::*;
use crate::BranchDb;
use branchscope_ids::BranchId;
use sqlx::Row;

impl BranchDb {
    /// Count all rows of `table` by owner relative to `branch`.
    ///
    /// `filter` narrows the counted rows; it is spliced verbatim and must be
    /// code-defined SQL, never user input.
    pub async fn ownership_counts(
        &self,
        table: &str,
        owner_column: &str,
        branch: &BranchId,
        filter: Option<&str>,
    ) -> Result<OwnershipCounts> {
        let t = Ident::new(table)?;
        let o = Ident::new(owner_column)?;
        let where_clause = filter
            .map(|f| format!("WHERE ({})", f))
            .unwrap_or_default();

        let sql = format!(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN {o} = ? THEN 1 ELSE 0 END), 0) AS current,
                COALESCE(SUM(CASE WHEN {o} IS NOT NULL AND {o} <> ? THEN 1 ELSE 0 END), 0) AS other,
                COALESCE(SUM(CASE WHEN {o} IS NULL THEN 1 ELSE 0 END), 0) AS unassigned
            FROM {t}
            {where_clause}
            "#
        );

        let query = sqlx::query(&sql)
            .bind(branch.as_str())
            .bind(branch.as_str())
            .fetch_one(&self.pool);
        let row = timed(query_span!(&sql, table), query).await?;

        Ok(OwnershipCounts {
            total: count_col(&row, "total")?,
            current: count_col(&row, "current")?,
            other: count_col(&row, "other")?,
            unassigned: count_col(&row, "unassigned")?,
        })
    }

    /// Count the rows a branch can see through the application visibility
    /// path, split by owner.
    ///
    /// With `include_foreign` every row is visible. Otherwise the branch sees
    /// its own rows, unassigned rows and rows whose shared flag is set.
    pub async fn visible_counts(&self, query: &VisibilityQuery<'_>) -> Result<OwnershipCounts> {
        let t = Ident::new(query.table)?;
        let o = Ident::new(query.owner_column)?;

        let mut conditions = Vec::new();
        if !query.include_foreign {
            let visibility = match query.shared_flag_column {
                Some(flag) => {
                    let f = Ident::new(flag)?;
                    format!("({o} = ? OR {o} IS NULL OR {f} = 1)")
                }
                None => format!("({o} = ? OR {o} IS NULL)"),
            };
            conditions.push(visibility);
        }
        if let Some(filter) = query.filter {
            conditions.push(format!("({})", filter));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN {o} = ? THEN 1 ELSE 0 END), 0) AS current,
                COALESCE(SUM(CASE WHEN {o} IS NOT NULL AND {o} <> ? THEN 1 ELSE 0 END), 0) AS other,
                COALESCE(SUM(CASE WHEN {o} IS NULL THEN 1 ELSE 0 END), 0) AS unassigned
            FROM {t}
            {where_clause}
            "#
        );

        let branch = query.branch.as_str();
        let mut q = sqlx::query(&sql).bind(branch).bind(branch);
        if !query.include_foreign {
            q = q.bind(branch);
        }

        let row = timed(query_span!(&sql, query.table), q.fetch_one(&self.pool)).await?;

        Ok(OwnershipCounts {
            total: count_col(&row, "total")?,
            current: count_col(&row, "current")?,
            other: count_col(&row, "other")?,
            unassigned: count_col(&row, "unassigned")?,
        })
    }
}

fn count_col(row: &sqlx::sqlite::SqliteRow, name: &str) -> Result<u64> {
    let value: i64 = row.try_get(name)?;
    Ok(value.max(0) as u64)
}
