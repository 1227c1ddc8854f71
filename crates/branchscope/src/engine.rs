//! Engine facade tying the branch context, registry and the three services
//! together. This is the API the CLI (or any other front end) calls.

use crate::analyzer::{AnalysisReport, Analyzer, BranchDebugInfo};
use crate::config::EngineConfig;
use crate::context::{active_branch, resolve_branch, BranchContext};
use crate::error::{EngineError, Result};
use crate::reconciler::{CleanupOptions, CleanupSummary, Reconciler};
use crate::registry::{FeatureKey, TableRegistry};
use crate::sharer::{ShareOptions, ShareResult, Sharer};
use branchscope_db::{Branch, BranchDb, ProductSummary};
use branchscope_ids::{BranchId, ProductId};
use branchscope_logging::LogLevel;
use std::sync::Arc;
use tracing::info;

pub struct Engine {
    db: BranchDb,
    config: EngineConfig,
    registry: Arc<TableRegistry>,
    context: Arc<dyn BranchContext>,
    analyzer: Analyzer,
    reconciler: Reconciler,
    sharer: Sharer,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("db", &self.db)
            .field("tables", &self.registry.len())
            .field("debug_mode", &self.config.debug_mode)
            .finish()
    }
}

impl Engine {
    /// Build an engine over an open database. Validates `config`.
    pub fn new(db: BranchDb, config: EngineConfig, context: Arc<dyn BranchContext>) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(config.registry()?);
        Ok(Self {
            analyzer: Analyzer::new(db.clone(), registry.clone(), config.scan_concurrency),
            reconciler: Reconciler::new(db.clone(), registry.clone(), config.lock_ttl()),
            sharer: Sharer::new(db.clone()),
            db,
            config,
            registry,
            context,
        })
    }

    /// Open the configured database and check the registry against it.
    pub async fn open(config: EngineConfig, context: Arc<dyn BranchContext>) -> Result<Self> {
        let path = config.database_path()?;
        let db = BranchDb::open(&path).await?;
        let engine = Self::new(db, config, context)?;
        engine.verify_scope().await?;
        info!(path = %path.display(), tables = engine.registry.len(), "Engine ready");
        Ok(engine)
    }

    pub async fn verify_scope(&self) -> Result<()> {
        self.registry.verify_scope(&self.db).await
    }

    pub fn db(&self) -> &BranchDb {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    // ========================================================================
    // Debug mode
    // ========================================================================

    pub fn is_debug_mode(&self) -> bool {
        self.config.debug_mode
    }

    pub fn enable_debug_mode(&mut self) {
        self.config.debug_mode = true;
    }

    pub fn disable_debug_mode(&mut self) {
        self.config.debug_mode = false;
    }

    fn log_level(&self) -> LogLevel {
        self.config.log_level()
    }

    // ========================================================================
    // Branches
    // ========================================================================

    pub async fn active_branch(&self) -> Result<Branch> {
        active_branch(&self.db, self.context.as_ref()).await
    }

    pub async fn list_branches(&self, include_inactive: bool) -> Result<Vec<Branch>> {
        Ok(self.db.list_branches(include_inactive).await?)
    }

    pub async fn upsert_branch(&self, branch: &Branch) -> Result<()> {
        Ok(self.db.upsert_branch(branch).await?)
    }

    pub async fn set_feature_sharing(
        &self,
        branch: &BranchId,
        feature: FeatureKey,
        shared: bool,
    ) -> Result<()> {
        resolve_branch(&self.db, branch).await?;
        Ok(self
            .db
            .set_feature_sharing(branch, feature.as_str(), shared)
            .await?)
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    /// Ownership report of every registered table for the active branch.
    pub async fn run_full_analysis(&self) -> Result<AnalysisReport> {
        let branch = self.active_branch().await?;
        self.analyzer.analyze(&branch.id, self.log_level()).await
    }

    /// Like [`Engine::run_full_analysis`] with an explicit log level.
    pub async fn run_full_analysis_with(&self, level: LogLevel) -> Result<AnalysisReport> {
        let branch = self.active_branch().await?;
        self.analyzer.analyze(&branch.id, level).await
    }

    pub async fn run_full_isolation_test(&self, branch_id: &BranchId) -> Result<BranchDebugInfo> {
        let branch = resolve_branch(&self.db, branch_id).await?;
        self.analyzer
            .isolation_test(&branch, self.config.features(), self.log_level())
            .await
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Repair the active branch's foreign rows.
    pub async fn cleanup_branch_data(&self, options: &CleanupOptions) -> Result<CleanupSummary> {
        let branch = self.active_branch().await?;
        self.reconciler
            .cleanup(&branch.id, options, self.log_level())
            .await
    }

    // ========================================================================
    // Sharing
    // ========================================================================

    pub async fn share_products(
        &self,
        source: &BranchId,
        target: &BranchId,
        product_ids: &[ProductId],
    ) -> Result<ShareResult> {
        self.share_products_with(source, target, product_ids, ShareOptions::default())
            .await
    }

    pub async fn share_products_with(
        &self,
        source: &BranchId,
        target: &BranchId,
        product_ids: &[ProductId],
        options: ShareOptions,
    ) -> Result<ShareResult> {
        self.sharer
            .share_products(source, target, product_ids, options, self.log_level())
            .await
    }

    pub async fn shareable_products(&self, source: &BranchId) -> Result<Vec<ProductSummary>> {
        resolve_branch(&self.db, source).await?;
        self.sharer.shareable_products(source).await
    }

    pub async fn missing_in_target(
        &self,
        source: &BranchId,
        target: &BranchId,
    ) -> Result<Vec<ProductSummary>> {
        if source == target {
            return Err(EngineError::validation("Source and target branch must differ"));
        }
        resolve_branch(&self.db, source).await?;
        resolve_branch(&self.db, target).await?;
        self.sharer.missing_in_target(source, target).await
    }
}
