//! Table scanner: ownership counts for one registered table.

use crate::error::{EngineError, Result};
use crate::registry::TableRegistry;
use branchscope_db::{BranchDb, OwnershipCounts};
use branchscope_ids::BranchId;
use branchscope_logging::LogLevel;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Row counts of one table relative to a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReport {
    pub table: String,
    pub total_records: u64,
    pub current_branch_records: u64,
    pub other_branch_records: u64,
    pub unassigned_records: u64,
}

impl TableReport {
    pub fn from_counts(table: impl Into<String>, counts: OwnershipCounts) -> Self {
        Self {
            table: table.into(),
            total_records: counts.total,
            current_branch_records: counts.current,
            other_branch_records: counts.other,
            unassigned_records: counts.unassigned,
        }
    }

    /// `total == current + other + unassigned`
    pub fn is_consistent(&self) -> bool {
        self.total_records
            == self.current_branch_records + self.other_branch_records + self.unassigned_records
    }

    pub fn has_violation(&self) -> bool {
        self.other_branch_records > 0
    }
}

#[derive(Debug, Clone)]
pub struct Scanner {
    db: BranchDb,
    registry: Arc<TableRegistry>,
}

impl Scanner {
    pub fn new(db: BranchDb, registry: Arc<TableRegistry>) -> Self {
        Self { db, registry }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    /// Count `table` by owner relative to `branch`.
    ///
    /// A table missing from the registry is a configuration error; a failed
    /// query is a scan error for that table only.
    pub async fn scan(&self, table: &str, branch: &BranchId, level: LogLevel) -> Result<TableReport> {
        let entry = self.registry.get(table)?;
        let start = Instant::now();

        let counts = self
            .db
            .ownership_counts(&entry.name, &entry.owner_column, branch, None)
            .await
            .map_err(|e| EngineError::scan(&entry.name, e))?;

        let report = TableReport::from_counts(&entry.name, counts);
        let duration_ms = start.elapsed().as_millis() as u64;
        if level.is_verbose() {
            info!(
                table = %report.table,
                branch = %branch,
                total = report.total_records,
                current = report.current_branch_records,
                other = report.other_branch_records,
                unassigned = report.unassigned_records,
                duration_ms,
                "Scanned table"
            );
        } else if !level.is_quiet() {
            debug!(table = %report.table, duration_ms, "Scanned table");
        }

        Ok(report)
    }
}
