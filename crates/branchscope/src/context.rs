//! Branch context and per-feature sharing resolution.

use crate::error::{EngineError, Result};
use crate::registry::FeatureKey;
use branchscope_db::{Branch, BranchDb, IsolationMode};
use branchscope_ids::BranchId;
use std::collections::BTreeMap;

/// Supplies the branch the calling session operates on.
///
/// `None` means no branch is active and no operation is possible; the engine
/// never substitutes a default.
pub trait BranchContext: Send + Sync {
    fn current_branch_id(&self) -> Option<BranchId>;
}

/// Fixed context for the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticBranchContext {
    branch: Option<BranchId>,
}

impl StaticBranchContext {
    pub fn new(branch: Option<BranchId>) -> Self {
        Self { branch }
    }

    pub fn active(branch: BranchId) -> Self {
        Self {
            branch: Some(branch),
        }
    }
}

impl BranchContext for StaticBranchContext {
    fn current_branch_id(&self) -> Option<BranchId> {
        self.branch.clone()
    }
}

/// Load a branch, failing validation when it does not exist.
pub async fn resolve_branch(db: &BranchDb, id: &BranchId) -> Result<Branch> {
    db.get_branch(id)
        .await?
        .ok_or_else(|| EngineError::validation(format!("Branch {} not found", id)))
}

/// The context's active branch.
pub async fn active_branch(db: &BranchDb, ctx: &dyn BranchContext) -> Result<Branch> {
    let id = ctx
        .current_branch_id()
        .ok_or_else(|| EngineError::validation("No active branch selected"))?;
    resolve_branch(db, &id).await
}

/// Whether each feature is shared for a branch in `mode`.
///
/// Shared and isolated modes fix every feature; hybrid mode reads the stored
/// flag and treats a missing flag as isolated.
pub fn effective_settings(
    mode: IsolationMode,
    stored: &BTreeMap<String, bool>,
    features: &[FeatureKey],
) -> BTreeMap<FeatureKey, bool> {
    features
        .iter()
        .map(|feature| {
            let shared = match mode {
                IsolationMode::Shared => true,
                IsolationMode::Isolated => false,
                IsolationMode::Hybrid => stored.get(feature.as_str()).copied().unwrap_or(false),
            };
            (*feature, shared)
        })
        .collect()
}

/// [`effective_settings`] with the branch's stored flags.
pub async fn load_effective_settings(
    db: &BranchDb,
    branch: &Branch,
    features: &[FeatureKey],
) -> Result<BTreeMap<FeatureKey, bool>> {
    let stored = db.feature_sharing(&branch.id).await?;
    Ok(effective_settings(branch.isolation_mode, &stored, features))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(pairs: &[(&str, bool)]) -> BTreeMap<String, bool> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn modes_fix_or_defer_settings() {
        let flags = stored(&[("customers", true)]);
        let features = FeatureKey::DEFAULT_SET;

        let shared = effective_settings(IsolationMode::Shared, &flags, &features);
        assert!(shared.values().all(|v| *v));

        let isolated = effective_settings(IsolationMode::Isolated, &flags, &features);
        assert!(isolated.values().all(|v| !*v));

        let hybrid = effective_settings(IsolationMode::Hybrid, &flags, &features);
        assert!(hybrid[&FeatureKey::Customers]);
        assert!(!hybrid[&FeatureKey::Products]);
        assert_eq!(hybrid.len(), 5);
    }

    #[tokio::test]
    async fn missing_context_is_validation_error() {
        let db = BranchDb::open_in_memory().await.unwrap();
        let err = active_branch(&db, &StaticBranchContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let ghost = StaticBranchContext::active(BranchId::parse("ghost").unwrap());
        assert!(matches!(
            active_branch(&db, &ghost).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn active_branch_resolves_stored_row() {
        let db = BranchDb::open_in_memory().await.unwrap();
        let branch = Branch {
            id: BranchId::parse("A").unwrap(),
            name: "Main Street".to_string(),
            code: Some("MS".to_string()),
            isolation_mode: IsolationMode::Hybrid,
            is_active: true,
        };
        db.upsert_branch(&branch).await.unwrap();
        db.set_feature_sharing(&branch.id, "suppliers", true)
            .await
            .unwrap();

        let ctx = StaticBranchContext::active(branch.id.clone());
        let resolved = active_branch(&db, &ctx).await.unwrap();
        assert_eq!(resolved, branch);

        let settings = load_effective_settings(&db, &resolved, &FeatureKey::DEFAULT_SET)
            .await
            .unwrap();
        assert!(settings[&FeatureKey::Suppliers]);
        assert!(!settings[&FeatureKey::Inventory]);
    }
}
