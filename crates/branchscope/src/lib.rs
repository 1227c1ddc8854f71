//! Branch isolation audit and reconciliation engine.
//!
//! Every business row in the branch-scoped tables carries an owning branch.
//! This crate audits whether rows are scoped correctly, repairs rows that
//! leaked into another branch, and copies catalog data between branches:
//!
//! - [`Analyzer`] counts rows per table by owner and audits per-feature
//!   visibility against each branch's sharing settings.
//! - [`Reconciler`] reassigns or deletes another branch's rows, with dry run.
//! - [`Sharer`] copies products and parent variants with zeroed stock.
//!
//! [`Engine`] is the entry point that wires them to a [`BranchContext`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use branchscope::{Engine, EngineConfig, StaticBranchContext, CleanupOptions};
//! use std::sync::Arc;
//!
//! let ctx = Arc::new(StaticBranchContext::active(branch_id));
//! let engine = Engine::open(EngineConfig::load()?, ctx).await?;
//! let report = engine.run_full_analysis().await?;
//! if report.has_violation {
//!     let preview = engine.cleanup_branch_data(&CleanupOptions::default()).await?;
//! }
//! ```

pub mod analyzer;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod reconciler;
pub mod registry;
pub mod scanner;
pub mod sharer;

pub use analyzer::{
    AnalysisReport, Analyzer, BranchDebugInfo, Caution, DataCount, IsolationTestResult,
    ScanFailure, SharingMode, TestSummary,
};
pub use config::EngineConfig;
pub use context::{BranchContext, StaticBranchContext};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use reconciler::{CleanupAction, CleanupFailure, CleanupOptions, CleanupSummary, Reconciler, TableOutcome};
pub use registry::{FeatureKey, ScopedTable, TableRegistry};
pub use scanner::{Scanner, TableReport};
pub use sharer::{ShareFailure, ShareOptions, ShareResult, Sharer};

pub use branchscope_logging::LogLevel;
