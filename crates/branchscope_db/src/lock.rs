//! Per-branch advisory locks for maintenance runs.
//!
//! A lock is one row in `branch_maintenance_locks`. Acquisition is a single
//! upsert that only overwrites an existing row when it is older than the
//! caller's TTL, so two processes sharing the database cannot both hold a
//! branch. A holder that crashed is taken over once its row goes stale.

use crate::error::Result;
use crate::BranchDb;
use branchscope_ids::BranchId;
use serde::Serialize;
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A held (or observed) maintenance lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceLock {
    pub branch_id: BranchId,
    pub holder: String,
    pub acquired_at: i64,
}

impl BranchDb {
    /// Try to take the maintenance lock of `branch` for `holder`.
    ///
    /// Returns `None` when another holder owns a lock younger than `ttl`.
    pub async fn try_acquire_branch_lock(
        &self,
        branch: &BranchId,
        holder: &str,
        ttl: Duration,
    ) -> Result<Option<MaintenanceLock>> {
        let now = Self::now_millis();
        let stale_before = now.saturating_sub(ttl.as_millis().min(i64::MAX as u128) as i64);

        let affected = sqlx::query(
            r#"
            INSERT INTO branch_maintenance_locks (branch_id, holder, acquired_at)
            VALUES (?, ?, ?)
            ON CONFLICT(branch_id) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at
            WHERE branch_maintenance_locks.acquired_at < ?
            "#,
        )
        .bind(branch.as_str())
        .bind(holder)
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            debug!(branch = %branch, holder, "Branch lock busy");
            return Ok(None);
        }

        info!(branch = %branch, holder, "Branch lock acquired");
        Ok(Some(MaintenanceLock {
            branch_id: branch.clone(),
            holder: holder.to_string(),
            acquired_at: now,
        }))
    }

    /// Release a lock. Only the holder that took it can release it.
    pub async fn release_branch_lock(&self, lock: &MaintenanceLock) -> Result<bool> {
        let released = sqlx::query(
            "DELETE FROM branch_maintenance_locks WHERE branch_id = ? AND holder = ?",
        )
        .bind(lock.branch_id.as_str())
        .bind(&lock.holder)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        if !released {
            warn!(
                branch = %lock.branch_id,
                holder = %lock.holder,
                "Branch lock was already taken over or released"
            );
        }
        Ok(released)
    }

    /// Current lock row of a branch, if any.
    pub async fn branch_lock(&self, branch: &BranchId) -> Result<Option<MaintenanceLock>> {
        let row = sqlx::query(
            "SELECT holder, acquired_at FROM branch_maintenance_locks WHERE branch_id = ?",
        )
        .bind(branch.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(MaintenanceLock {
                branch_id: branch.clone(),
                holder: row.try_get("holder")?,
                acquired_at: row.try_get("acquired_at")?,
            })),
            None => Ok(None),
        }
    }
}
