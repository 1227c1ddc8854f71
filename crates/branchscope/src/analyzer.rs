//! Isolation analyzer.
//!
//! Two read-only passes:
//! - [`Analyzer::analyze`] counts every registered table by owner.
//! - [`Analyzer::isolation_test`] audits each feature's observed visibility
//!   against the branch's stored sharing settings.

use crate::context::load_effective_settings;
use crate::error::{EngineError, Result};
use crate::registry::{FeatureKey, FeatureCheck, TableRegistry};
use crate::scanner::{Scanner, TableReport};
use branchscope_db::{Branch, BranchDb, IsolationMode, OwnershipCounts, VisibilityQuery};
use branchscope_ids::BranchId;
use branchscope_logging::LogLevel;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

// ============================================================================
// Full analysis
// ============================================================================

/// A table whose scan failed; its report is left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanFailure {
    pub table: String,
    pub cause: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub branch_id: BranchId,
    pub reports: Vec<TableReport>,
    pub scan_errors: Vec<ScanFailure>,
    pub has_violation: bool,
    pub has_unassigned: bool,
}

impl AnalysisReport {
    pub fn new(branch_id: BranchId, reports: Vec<TableReport>, scan_errors: Vec<ScanFailure>) -> Self {
        let has_violation = reports.iter().map(|r| r.other_branch_records).sum::<u64>() > 0;
        let has_unassigned = reports.iter().map(|r| r.unassigned_records).sum::<u64>() > 0;
        Self {
            branch_id,
            reports,
            scan_errors,
            has_violation,
            has_unassigned,
        }
    }

    pub fn report(&self, table: &str) -> Option<&TableReport> {
        self.reports.iter().find(|r| r.table == table)
    }

    pub fn total_other(&self) -> u64 {
        self.reports.iter().map(|r| r.other_branch_records).sum()
    }

    pub fn total_unassigned(&self) -> u64 {
        self.reports.iter().map(|r| r.unassigned_records).sum()
    }
}

// ============================================================================
// Isolation test
// ============================================================================

/// Sharing policy of a feature, expected or observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SharingMode {
    Shared,
    Isolated,
}

impl SharingMode {
    pub fn from_shared(shared: bool) -> Self {
        if shared {
            SharingMode::Shared
        } else {
            SharingMode::Isolated
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SharingMode::Shared => "shared",
            SharingMode::Isolated => "isolated",
        }
    }
}

/// Non-fatal annotation on a passing test. Counted as a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Caution {
    /// Feature is intentionally shared and other branches' rows are visible.
    ForeignRecordsVisible,
    /// The branch owns no rows for this feature yet.
    NoLocalRecords,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCount {
    pub current_branch: u64,
    pub other_branches: u64,
    /// Unassigned rows; visible to every branch.
    pub shared: u64,
    pub total: u64,
}

impl From<OwnershipCounts> for DataCount {
    fn from(counts: OwnershipCounts) -> Self {
        Self {
            current_branch: counts.current,
            other_branches: counts.other,
            shared: counts.unassigned,
            total: counts.current + counts.other + counts.unassigned,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolationTestResult {
    pub feature: FeatureKey,
    pub expected: SharingMode,
    /// `None` when the check query failed.
    pub actual: Option<SharingMode>,
    pub passed: bool,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caution: Option<Caution>,
    pub data_count: DataCount,
    pub timestamp: DateTime<Utc>,
}

impl IsolationTestResult {
    pub fn is_warning(&self) -> bool {
        self.passed && self.caution.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
}

impl TestSummary {
    pub fn from_results(results: &[IsolationTestResult]) -> Self {
        let mut summary = TestSummary {
            total_tests: results.len(),
            ..Default::default()
        };
        for result in results {
            match (result.passed, result.caution) {
                (false, _) => summary.failed += 1,
                (true, Some(_)) => summary.warnings += 1,
                (true, None) => summary.passed += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDebugInfo {
    pub branch_id: BranchId,
    pub branch_name: String,
    pub isolation_mode: IsolationMode,
    pub settings: BTreeMap<FeatureKey, bool>,
    pub test_results: Vec<IsolationTestResult>,
    pub summary: TestSummary,
}

/// Judge one feature from its visible counts.
///
/// `hidden_foreign` is the number of other-branch rows the branch cannot see,
/// used only in the details text.
pub fn evaluate_feature(
    feature: FeatureKey,
    expected: SharingMode,
    visible: OwnershipCounts,
    hidden_foreign: u64,
) -> IsolationTestResult {
    let data_count = DataCount::from(visible);
    let actual = SharingMode::from_shared(data_count.other_branches > 0);
    let passed = expected == actual;
    let label = feature.label();

    let caution = if !passed {
        None
    } else if expected == SharingMode::Shared && data_count.other_branches > 0 {
        Some(Caution::ForeignRecordsVisible)
    } else if data_count.current_branch == 0 {
        Some(Caution::NoLocalRecords)
    } else {
        None
    };

    let details = match (expected, passed, caution) {
        (SharingMode::Isolated, true, Some(Caution::NoLocalRecords)) => format!(
            "No {label} found for this branch yet. {hidden_foreign} {label} from other branches are correctly hidden"
        ),
        (SharingMode::Isolated, true, _) => format!(
            "Isolation working: {} {label} visible, none from other branches. {hidden_foreign} {label} from other branches are correctly hidden",
            data_count.total
        ),
        (SharingMode::Isolated, false, _) => format!(
            "Isolation FAILED: {} {label} visible but only {} belong to this branch ({} from other branches)",
            data_count.total, data_count.current_branch, data_count.other_branches
        ),
        (SharingMode::Shared, true, _) => format!(
            "Sharing working: {} {label} visible ({} from this branch, {} from others)",
            data_count.total, data_count.current_branch, data_count.other_branches
        ),
        (SharingMode::Shared, false, _) => format!(
            "Sharing configured but only this branch's {label} are visible ({} rows)",
            data_count.total
        ),
    };

    IsolationTestResult {
        feature,
        expected,
        actual: Some(actual),
        passed,
        details,
        caution,
        data_count,
        timestamp: Utc::now(),
    }
}

fn check_failed(feature: FeatureKey, expected: SharingMode, cause: impl std::fmt::Display) -> IsolationTestResult {
    IsolationTestResult {
        feature,
        expected,
        actual: None,
        passed: false,
        details: format!("Error testing {}: {}", feature.label(), cause),
        caution: None,
        data_count: DataCount::default(),
        timestamp: Utc::now(),
    }
}

// ============================================================================
// Analyzer
// ============================================================================

#[derive(Debug, Clone)]
pub struct Analyzer {
    db: BranchDb,
    scanner: Scanner,
    registry: Arc<TableRegistry>,
    concurrency: usize,
}

impl Analyzer {
    pub fn new(db: BranchDb, registry: Arc<TableRegistry>, concurrency: usize) -> Self {
        Self {
            scanner: Scanner::new(db.clone(), registry.clone()),
            db,
            registry,
            concurrency: concurrency.max(1),
        }
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Scan every registered table for `branch`.
    ///
    /// Scans run on a bounded pool; reports keep registry order. A failing
    /// table is logged and listed in `scan_errors` without stopping the rest.
    pub async fn analyze(&self, branch: &BranchId, level: LogLevel) -> Result<AnalysisReport> {
        let tables: Vec<String> = self.registry.tables().iter().map(|t| t.name.clone()).collect();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (idx, table) in tables.iter().enumerate() {
            let scanner = self.scanner.clone();
            let semaphore = semaphore.clone();
            let table = table.clone();
            let branch = branch.clone();
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => scanner.scan(&table, &branch, level).await,
                    Err(e) => Err(EngineError::scan(&table, e)),
                };
                (idx, result)
            });
        }

        let mut slots: Vec<Option<Result<TableReport>>> = tables.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => warn!(error = %e, "Scan task aborted"),
            }
        }

        let mut reports = Vec::with_capacity(tables.len());
        let mut scan_errors = Vec::new();
        for (table, slot) in tables.into_iter().zip(slots) {
            match slot {
                Some(Ok(report)) => reports.push(report),
                Some(Err(err)) => {
                    let cause = match err {
                        EngineError::Scan { cause, .. } => cause,
                        other => other.to_string(),
                    };
                    warn!(table = %table, cause = %cause, "Table scan failed");
                    scan_errors.push(ScanFailure { table, cause });
                }
                None => scan_errors.push(ScanFailure {
                    table,
                    cause: "scan task aborted".to_string(),
                }),
            }
        }

        let report = AnalysisReport::new(branch.clone(), reports, scan_errors);
        if !level.is_quiet() {
            info!(
                branch = %branch,
                tables = report.reports.len(),
                failed = report.scan_errors.len(),
                other = report.total_other(),
                unassigned = report.total_unassigned(),
                "Analysis complete"
            );
        }
        Ok(report)
    }

    /// Audit each feature of `branch` against its effective sharing setting.
    ///
    /// Purely diagnostic. A failing check yields a failed result with no
    /// observed mode; the other checks still run.
    pub async fn isolation_test(
        &self,
        branch: &Branch,
        features: &[FeatureKey],
        level: LogLevel,
    ) -> Result<BranchDebugInfo> {
        let settings = load_effective_settings(&self.db, branch, features).await?;

        let mut test_results = Vec::with_capacity(features.len());
        for feature in features {
            let shared = settings.get(feature).copied().unwrap_or(false);
            let result = self.check_feature(&branch.id, *feature, shared).await;
            if level.is_verbose() {
                info!(
                    feature = %feature,
                    passed = result.passed,
                    current = result.data_count.current_branch,
                    other = result.data_count.other_branches,
                    details = %result.details,
                    "Feature checked"
                );
            }
            test_results.push(result);
        }

        let summary = TestSummary::from_results(&test_results);
        if !level.is_quiet() {
            info!(
                branch = %branch.id,
                passed = summary.passed,
                failed = summary.failed,
                warnings = summary.warnings,
                "Isolation test complete"
            );
        }

        Ok(BranchDebugInfo {
            branch_id: branch.id.clone(),
            branch_name: branch.name.clone(),
            isolation_mode: branch.isolation_mode,
            settings,
            test_results,
            summary,
        })
    }

    async fn check_feature(&self, branch: &BranchId, feature: FeatureKey, shared: bool) -> IsolationTestResult {
        let expected = SharingMode::from_shared(shared);
        let Some(check) = self.registry.feature_check(feature) else {
            return check_failed(feature, expected, "no registered table backs this feature");
        };

        match self.check_counts(&check, branch, shared).await {
            Ok((visible, all)) => {
                let hidden = all.other.saturating_sub(visible.other);
                evaluate_feature(feature, expected, visible, hidden)
            }
            Err(e) => {
                warn!(feature = %feature, error = %e, "Feature check failed");
                check_failed(feature, expected, e)
            }
        }
    }

    /// Counts visible to the branch, then counts over every row.
    async fn check_counts(
        &self,
        check: &FeatureCheck<'_>,
        branch: &BranchId,
        shared: bool,
    ) -> std::result::Result<(OwnershipCounts, OwnershipCounts), branchscope_db::DbError> {
        let query = VisibilityQuery {
            table: &check.table.name,
            owner_column: &check.table.owner_column,
            shared_flag_column: check.table.shared_flag_column.as_deref(),
            filter: check.filter,
            branch,
            include_foreign: shared,
        };
        let visible = self.db.visible_counts(&query).await?;
        let all = if shared {
            visible
        } else {
            self.db
                .visible_counts(&VisibilityQuery {
                    include_foreign: true,
                    ..query
                })
                .await?
        };
        debug!(feature = %check.feature, table = %check.table.name, "Check counts loaded");
        Ok((visible, all))
    }
}
