//! Engine error taxonomy.
//!
//! Only precondition failures come back as `Err`. Per-table scan failures and
//! per-table/per-product write failures are folded into the structured
//! results ([`crate::AnalysisReport`], [`crate::CleanupSummary`],
//! [`crate::ShareResult`]) and the call still succeeds.

use branchscope_db::DbError;
use branchscope_ids::BranchId;
use thiserror::Error;

/// Engine operation result type.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown table, feature key or invalid setting. Aborts the call.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// One table's read failed.
    #[error("Scan of '{table}' failed: {cause}")]
    Scan { table: String, cause: String },

    /// Missing branch, identical source/target, empty selection, unconfirmed
    /// destructive run.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An insert/update/delete on one row set failed.
    #[error("Write to '{target}' failed: {cause}")]
    Write { target: String, cause: String },

    /// Another live cleanup holds the branch's maintenance lock.
    #[error("Branch {branch} is busy: another cleanup is running")]
    Busy { branch: BranchId },

    #[error(transparent)]
    Database(#[from] DbError),
}

impl EngineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn scan(table: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Scan {
            table: table.into(),
            cause: cause.to_string(),
        }
    }

    pub fn write(target: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Write {
            target: target.into(),
            cause: cause.to_string(),
        }
    }
}
