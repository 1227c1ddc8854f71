//! Catalog sharer: copies products and their parent variants between
//! branches.
//!
//! Copies are independent rows owned by the target branch: stock starts at
//! zero, SKUs carry the target branch's tag, and nothing links back to the
//! source. The source branch is never written.

use crate::error::{EngineError, Result};
use branchscope_db::{Branch, BranchDb, Product, ProductSummary, Variant, VariantKey};
use branchscope_ids::{BranchId, ProductId, VariantId};
use branchscope_logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

const COPY_SHARING_MODE: &str = "isolated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareOptions {
    /// Skip variants already present under the target product (matched by
    /// suffixed SKU, or by name when the SKU is absent).
    pub skip_existing_variants: bool,
}

impl Default for ShareOptions {
    fn default() -> Self {
        Self {
            skip_existing_variants: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareFailure {
    pub product_id: ProductId,
    pub cause: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResult {
    pub success: bool,
    /// Products newly created in the target.
    pub products_shared: u64,
    /// Variant rows inserted, for new and pre-existing target products.
    pub variants_shared: u64,
    pub source_branch_name: String,
    pub target_branch_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Selected products already present in the target.
    pub skipped_existing: u64,
    pub failures: Vec<ShareFailure>,
}

impl ShareResult {
    fn aborted(source: String, target: String, error: impl Into<String>) -> Self {
        Self {
            success: false,
            source_branch_name: source,
            target_branch_name: target,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// `"{sku}-{tag}"` where tag is the first 8 characters of the target id.
pub fn suffixed_sku(sku: &str, target: &BranchId) -> String {
    format!("{}-{}", sku, target.sku_tag())
}

/// SKU with `target`'s tag suffix removed, if it has one.
pub fn base_sku<'a>(sku: &'a str, target: &BranchId) -> &'a str {
    sku.strip_suffix(target.sku_tag())
        .and_then(|rest| rest.strip_suffix('-'))
        .filter(|base| !base.is_empty())
        .unwrap_or(sku)
}

fn copy_product(product: &Product, target: &BranchId) -> Product {
    Product {
        id: ProductId::new(),
        name: product.name.clone(),
        sku: suffixed_sku(&product.sku, target),
        description: product.description.clone(),
        category_id: product.category_id.clone(),
        supplier_id: product.supplier_id.clone(),
        cost_price: product.cost_price,
        selling_price: product.selling_price,
        stock_quantity: 0,
        branch_id: Some(target.clone()),
        image_url: product.image_url.clone(),
        is_active: true,
        is_shared: false,
        sharing_mode: Some(COPY_SHARING_MODE.to_string()),
    }
}

fn copy_variant(variant: &Variant, product: &ProductId, target: &BranchId) -> Variant {
    Variant {
        id: VariantId::new(),
        product_id: product.clone(),
        name: variant.name.clone(),
        sku: variant.sku.as_deref().map(|s| suffixed_sku(s, target)),
        barcode: variant.barcode.clone(),
        cost_price: variant.cost_price,
        selling_price: variant.selling_price,
        unit_price: variant.unit_price,
        quantity: 0,
        min_quantity: variant.min_quantity,
        branch_id: Some(target.clone()),
        is_active: variant.is_active,
        attributes: variant.attributes.clone(),
        variant_attributes: variant.variant_attributes.clone(),
        variant_name: variant.variant_name.clone(),
        is_shared: false,
        sharing_mode: Some(COPY_SHARING_MODE.to_string()),
        is_parent: variant.is_parent,
        parent_variant_id: None,
    }
}

fn already_present(existing: &[VariantKey], copy: &Variant) -> bool {
    existing.iter().any(|key| match &copy.sku {
        Some(sku) => key.sku.as_deref() == Some(sku.as_str()),
        None => key.sku.is_none() && key.name == copy.name,
    })
}

/// What happened to one selected product.
struct ProductOutcome {
    created: bool,
    variants: u64,
}

/// A product that could not be fully shared. `created` is set when the
/// target product row exists and only the variant copy failed.
struct ProductFailure {
    created: Option<bool>,
    error: EngineError,
}

impl ProductFailure {
    fn before_insert(error: impl Into<EngineError>) -> Self {
        Self {
            created: None,
            error: error.into(),
        }
    }

    fn after_insert(created: bool, error: impl Into<EngineError>) -> Self {
        Self {
            created: Some(created),
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sharer {
    db: BranchDb,
}

impl Sharer {
    pub fn new(db: BranchDb) -> Self {
        Self { db }
    }

    /// Copy `product_ids` from `source` to `target`, one product at a time.
    ///
    /// Identical branches or an empty selection are rejected before any
    /// write. Unresolvable branches give `success = false` with `error` set.
    /// A product that fails is listed in `failures` and the rest continue.
    pub async fn share_products(
        &self,
        source: &BranchId,
        target: &BranchId,
        product_ids: &[ProductId],
        options: ShareOptions,
        level: LogLevel,
    ) -> Result<ShareResult> {
        if product_ids.is_empty() {
            return Err(EngineError::validation("No products selected to share"));
        }
        if source == target {
            return Err(EngineError::validation(
                "Source and target branch must differ",
            ));
        }

        let (source_branch, target_branch) = match self.resolve_pair(source, target).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(source = %source, target = %target, error = %e, "Share aborted");
                return Ok(ShareResult::aborted(
                    source.to_string(),
                    target.to_string(),
                    e.to_string(),
                ));
            }
        };

        let mut result = ShareResult {
            success: true,
            source_branch_name: source_branch.name.clone(),
            target_branch_name: target_branch.name.clone(),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        for product_id in product_ids {
            if !seen.insert(product_id) {
                continue;
            }
            match self.share_one(product_id, source, target, options).await {
                Ok(outcome) => {
                    if outcome.created {
                        result.products_shared += 1;
                    } else {
                        result.skipped_existing += 1;
                    }
                    result.variants_shared += outcome.variants;
                    if level.is_verbose() {
                        info!(
                            product = %product_id,
                            created = outcome.created,
                            variants = outcome.variants,
                            "Product shared"
                        );
                    }
                }
                Err(failure) => {
                    match failure.created {
                        Some(true) => result.products_shared += 1,
                        Some(false) => result.skipped_existing += 1,
                        None => {}
                    }
                    warn!(product = %product_id, error = %failure.error, "Failed to share product");
                    result.failures.push(ShareFailure {
                        product_id: product_id.clone(),
                        cause: failure.error.to_string(),
                    });
                }
            }
        }

        info!(
            source = %source_branch.name,
            target = %target_branch.name,
            products = result.products_shared,
            variants = result.variants_shared,
            skipped = result.skipped_existing,
            failed = result.failures.len(),
            "Share complete"
        );
        Ok(result)
    }

    async fn resolve_pair(&self, source: &BranchId, target: &BranchId) -> Result<(Branch, Branch)> {
        let source_branch = crate::context::resolve_branch(&self.db, source).await?;
        let target_branch = crate::context::resolve_branch(&self.db, target).await?;
        Ok((source_branch, target_branch))
    }

    async fn share_one(
        &self,
        product_id: &ProductId,
        source: &BranchId,
        target: &BranchId,
        options: ShareOptions,
    ) -> std::result::Result<ProductOutcome, ProductFailure> {
        let product = self
            .db
            .get_product_in_branch(product_id, source)
            .await
            .map_err(ProductFailure::before_insert)?
            .ok_or_else(|| {
                ProductFailure::before_insert(EngineError::validation(format!(
                    "Product {} does not belong to the source branch",
                    product_id
                )))
            })?;

        let suffixed = suffixed_sku(&product.sku, target);
        let existing = self
            .db
            .find_product_by_sku(target, &[product.sku.as_str(), suffixed.as_str()])
            .await
            .map_err(ProductFailure::before_insert)?;

        let (target_product, created) = match existing {
            Some(id) => {
                debug!(product = %product_id, existing = %id, "Product already in target");
                (id, false)
            }
            None => {
                let copy = copy_product(&product, target);
                self.db.insert_product(&copy).await.map_err(|e| {
                    ProductFailure::before_insert(EngineError::write("products", e))
                })?;
                (copy.id, true)
            }
        };

        let parents = self
            .db
            .parent_variants(&product.id, source)
            .await
            .map_err(|e| ProductFailure::after_insert(created, e))?;

        let existing_keys = if options.skip_existing_variants && !created {
            self.db
                .variant_keys(&target_product)
                .await
                .map_err(|e| ProductFailure::after_insert(created, e))?
        } else {
            Vec::new()
        };

        let copies: Vec<Variant> = parents
            .iter()
            .filter(|v| v.is_parent_variant())
            .map(|v| copy_variant(v, &target_product, target))
            .filter(|copy| !already_present(&existing_keys, copy))
            .collect();

        let variants = self.db.insert_variants(&copies).await.map_err(|e| {
            ProductFailure::after_insert(created, EngineError::write("product_variants", e))
        })?;

        Ok(ProductOutcome { created, variants })
    }

    /// Active products of `source` with their parent-variant counts.
    pub async fn shareable_products(&self, source: &BranchId) -> Result<Vec<ProductSummary>> {
        Ok(self.db.list_active_products(source).await?)
    }

    /// Active products of `source` whose SKU is absent from `target`,
    /// ignoring the target's tag suffix on copied SKUs.
    pub async fn missing_in_target(
        &self,
        source: &BranchId,
        target: &BranchId,
    ) -> Result<Vec<ProductSummary>> {
        let present: BTreeSet<String> = self
            .db
            .active_product_skus(target)
            .await?
            .iter()
            .map(|sku| base_sku(sku, target).to_string())
            .collect();

        let products = self.db.list_active_products(source).await?;
        Ok(products
            .into_iter()
            .filter(|p| !present.contains(&p.sku))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_suffix_uses_target_tag() {
        let target = BranchId::parse("tgt5678").unwrap();
        assert_eq!(suffixed_sku("ABC-1", &target), "ABC-1-tgt5678");

        let uuid_target = BranchId::parse("a1b2c3d4-0000-0000-0000-000000000000").unwrap();
        assert_eq!(suffixed_sku("ABC-1", &uuid_target), "ABC-1-a1b2c3d4");
    }

    #[test]
    fn base_sku_strips_only_target_tag() {
        let target = BranchId::parse("a1b2c3d4-ffff").unwrap();
        assert_eq!(base_sku("SKU-123-a1b2c3d4", &target), "SKU-123");
        assert_eq!(base_sku("SKU-123", &target), "SKU-123");
        assert_eq!(base_sku("SKU-12345678", &target), "SKU-12345678");
        assert_eq!(base_sku("-a1b2c3d4", &target), "-a1b2c3d4");
    }

    #[test]
    fn variant_guard_matches_sku_then_name() {
        let keys = vec![
            VariantKey {
                sku: Some("V1-t".to_string()),
                name: "Red".to_string(),
            },
            VariantKey {
                sku: None,
                name: "Blue".to_string(),
            },
        ];
        let target = BranchId::parse("t").unwrap();
        let mut v = copy_variant(
            &Variant {
                id: VariantId::new(),
                product_id: ProductId::new(),
                name: "Red".to_string(),
                sku: Some("V1".to_string()),
                barcode: None,
                cost_price: 1.0,
                selling_price: 2.0,
                unit_price: None,
                quantity: 9,
                min_quantity: 0,
                branch_id: None,
                is_active: true,
                attributes: None,
                variant_attributes: None,
                variant_name: None,
                is_shared: true,
                sharing_mode: None,
                is_parent: true,
                parent_variant_id: None,
            },
            &ProductId::new(),
            &target,
        );
        assert_eq!(v.quantity, 0);
        assert!(!v.is_shared);
        assert!(already_present(&keys, &v));

        v.sku = None;
        v.name = "Blue".to_string();
        assert!(already_present(&keys, &v));
        v.name = "Green".to_string();
        assert!(!already_present(&keys, &v));
    }
}
