//! Branch registry rows and per-feature sharing flags.

use crate::error::{DbError, Result};
use crate::types::*;
use crate::BranchDb;
use branchscope_ids::BranchId;
use sqlx::Row;
use std::collections::BTreeMap;

impl BranchDb {
    /// Insert a branch or update its name, code, mode and active flag.
    pub async fn upsert_branch(&self, branch: &Branch) -> Result<()> {
        let now = Self::now_millis();
        sqlx::query(
            r#"
            INSERT INTO branches (id, name, code, isolation_mode, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                code = excluded.code,
                isolation_mode = excluded.isolation_mode,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(branch.id.as_str())
        .bind(&branch.name)
        .bind(branch.code.as_deref())
        .bind(branch.isolation_mode.as_str())
        .bind(branch.is_active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a branch by ID.
    pub async fn get_branch(&self, id: &BranchId) -> Result<Option<Branch>> {
        let row = sqlx::query(
            "SELECT id, name, code, isolation_mode, is_active FROM branches WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row_to_branch(&row)).transpose()
    }

    /// List branches ordered by name.
    pub async fn list_branches(&self, include_inactive: bool) -> Result<Vec<Branch>> {
        let sql = if include_inactive {
            "SELECT id, name, code, isolation_mode, is_active FROM branches ORDER BY name"
        } else {
            "SELECT id, name, code, isolation_mode, is_active FROM branches WHERE is_active = 1 ORDER BY name"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_branch).collect()
    }

    /// Store the sharing flag of one feature for a branch.
    pub async fn set_feature_sharing(
        &self,
        branch: &BranchId,
        feature_key: &str,
        shared: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO branch_feature_settings (branch_id, feature_key, shared)
            VALUES (?, ?, ?)
            ON CONFLICT(branch_id, feature_key) DO UPDATE SET shared = excluded.shared
            "#,
        )
        .bind(branch.as_str())
        .bind(feature_key)
        .bind(shared)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stored sharing flags of a branch, keyed by feature.
    ///
    /// Features never set are absent from the map.
    pub async fn feature_sharing(&self, branch: &BranchId) -> Result<BTreeMap<String, bool>> {
        let rows = sqlx::query(
            "SELECT feature_key, shared FROM branch_feature_settings WHERE branch_id = ?",
        )
        .bind(branch.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut settings = BTreeMap::new();
        for row in rows {
            let key: String = row.try_get("feature_key")?;
            let shared: bool = row.try_get("shared")?;
            settings.insert(key, shared);
        }
        Ok(settings)
    }
}

fn row_to_branch(row: &sqlx::sqlite::SqliteRow) -> Result<Branch> {
    let id: String = row.try_get("id")?;
    let mode: String = row.try_get("isolation_mode")?;
    let isolation_mode = IsolationMode::parse(&mode)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown isolation mode: {}", mode)))?;
    let id = BranchId::parse(&id).map_err(|e| DbError::invalid_state(e.to_string()))?;

    Ok(Branch {
        id,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        isolation_mode,
        is_active: row.try_get("is_active")?,
    })
}
