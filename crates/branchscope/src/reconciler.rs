//! Reconciler: repairs rows owned by other branches.
//!
//! Only rows with a non-NULL owner different from the active branch are
//! touched. Each table is its own transaction, so a failure on one table
//! leaves the tables before it committed and is reported in
//! [`CleanupSummary::errors`].

use crate::error::{EngineError, Result};
use crate::registry::{ScopedTable, TableRegistry};
use branchscope_db::{BranchDb, ForeignRows};
use branchscope_ids::BranchId;
use branchscope_logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupAction {
    /// Move foreign rows to the active branch. Lossless.
    #[default]
    Reassign,
    /// Permanently remove foreign rows.
    Delete,
}

impl CleanupAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupAction::Reassign => "reassign",
            CleanupAction::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reassign" => Some(CleanupAction::Reassign),
            "delete" => Some(CleanupAction::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOptions {
    pub action: CleanupAction,
    pub dry_run: bool,
    /// Set by callers that have not yet confirmed with the operator. A live
    /// run with this set is refused.
    pub confirmation_required: bool,
    /// Restrict the run to these registered tables.
    #[serde(default)]
    pub tables: Option<Vec<String>>,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self::preview(CleanupAction::Reassign)
    }
}

impl CleanupOptions {
    /// Dry run of `action`.
    pub fn preview(action: CleanupAction) -> Self {
        Self {
            action,
            dry_run: true,
            confirmation_required: true,
            tables: None,
        }
    }

    /// Live run of `action`, already confirmed by the operator.
    pub fn confirmed(action: CleanupAction) -> Self {
        Self {
            action,
            dry_run: false,
            confirmation_required: false,
            tables: None,
        }
    }

    pub fn only(mut self, tables: Vec<String>) -> Self {
        self.tables = Some(tables);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOutcome {
    pub table: String,
    pub affected: u64,
    pub action: CleanupAction,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupFailure {
    pub table: String,
    pub cause: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub branch_id: BranchId,
    pub per_table: Vec<TableOutcome>,
    pub errors: Vec<CleanupFailure>,
}

impl CleanupSummary {
    pub fn total_affected(&self) -> u64 {
        self.per_table.iter().map(|t| t.affected).sum()
    }

    pub fn affected(&self, table: &str) -> Option<u64> {
        self.per_table
            .iter()
            .find(|t| t.table == table)
            .map(|t| t.affected)
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    db: BranchDb,
    registry: Arc<TableRegistry>,
    lock_ttl: Duration,
}

impl Reconciler {
    pub fn new(db: BranchDb, registry: Arc<TableRegistry>, lock_ttl: Duration) -> Self {
        Self {
            db,
            registry,
            lock_ttl,
        }
    }

    /// Preview or apply `options.action` on `branch`'s foreign rows.
    ///
    /// Live runs hold the branch's maintenance lock for their duration and
    /// fail with [`EngineError::Busy`] when another run holds it.
    pub async fn cleanup(
        &self,
        branch: &BranchId,
        options: &CleanupOptions,
        level: LogLevel,
    ) -> Result<CleanupSummary> {
        if !options.dry_run && options.confirmation_required {
            return Err(EngineError::validation(format!(
                "Live {} requires operator confirmation",
                options.action
            )));
        }

        let tables = self.registry.select(options.tables.as_deref())?;

        if options.dry_run {
            return Ok(self.run_tables(branch, &tables, options, level).await);
        }

        let holder = format!("cleanup-{}", Uuid::new_v4());
        let lock = self
            .db
            .try_acquire_branch_lock(branch, &holder, self.lock_ttl)
            .await?
            .ok_or_else(|| EngineError::Busy {
                branch: branch.clone(),
            })?;

        let summary = self.run_tables(branch, &tables, options, level).await;

        if let Err(e) = self.db.release_branch_lock(&lock).await {
            warn!(branch = %branch, error = %e, "Failed to release branch lock");
        }

        info!(
            branch = %branch,
            action = %options.action,
            affected = summary.total_affected(),
            failed = summary.errors.len(),
            "Cleanup applied"
        );
        Ok(summary)
    }

    async fn run_tables(
        &self,
        branch: &BranchId,
        tables: &[&ScopedTable],
        options: &CleanupOptions,
        level: LogLevel,
    ) -> CleanupSummary {
        let mut per_table = Vec::with_capacity(tables.len());
        let mut errors = Vec::new();

        for table in tables {
            let rows = ForeignRows {
                table: &table.name,
                owner_column: &table.owner_column,
                branch,
            };
            let result = if options.dry_run {
                self.db.count_foreign_rows(&rows).await
            } else {
                match options.action {
                    CleanupAction::Reassign => self.db.reassign_foreign_rows(&rows).await,
                    CleanupAction::Delete => self.db.delete_foreign_rows(&rows).await,
                }
            };

            match result {
                Ok(affected) => {
                    if level.is_verbose() {
                        info!(
                            table = %table.name,
                            action = %options.action,
                            dry_run = options.dry_run,
                            affected,
                            "Table cleaned"
                        );
                    } else {
                        debug!(table = %table.name, affected, "Table cleaned");
                    }
                    per_table.push(TableOutcome {
                        table: table.name.clone(),
                        affected,
                        action: options.action,
                        dry_run: options.dry_run,
                    });
                }
                Err(e) => {
                    let err = EngineError::write(&table.name, e);
                    warn!(error = %err, "Cleanup of table failed");
                    errors.push(CleanupFailure {
                        table: table.name.clone(),
                        cause: match err {
                            EngineError::Write { cause, .. } => cause,
                            other => other.to_string(),
                        },
                    });
                }
            }
        }

        CleanupSummary {
            branch_id: branch.clone(),
            per_table,
            errors,
        }
    }
}
