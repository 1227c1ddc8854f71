//! Row types for branches and the catalog tables.

use branchscope_ids::{BranchId, ProductId, VariantId};
use serde::{Deserialize, Serialize};

// ============================================================================
// Branch Types
// ============================================================================

/// Default visibility policy of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// Every feature visible across branches
    Shared,
    /// Every feature visible only to the owner branch
    Isolated,
    /// Decided per feature by the branch's sharing flags
    Hybrid,
}

impl IsolationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationMode::Shared => "shared",
            IsolationMode::Isolated => "isolated",
            IsolationMode::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "shared" => Some(IsolationMode::Shared),
            "isolated" => Some(IsolationMode::Isolated),
            "hybrid" => Some(IsolationMode::Hybrid),
            _ => None,
        }
    }
}

impl std::fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant/location partition of the catalog and operational data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub code: Option<String>,
    pub isolation_mode: IsolationMode,
    pub is_active: bool,
}

// ============================================================================
// Scan Types
// ============================================================================

/// Row counts of one table split by owner relative to a branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipCounts {
    pub total: u64,
    pub current: u64,
    pub other: u64,
    pub unassigned: u64,
}

/// Which rows of a table a branch can see through the application path.
#[derive(Debug, Clone)]
pub struct VisibilityQuery<'a> {
    pub table: &'a str,
    pub owner_column: &'a str,
    /// Column marking a row as explicitly shared, if the table has one.
    pub shared_flag_column: Option<&'a str>,
    /// Extra predicate narrowing the feature (trusted, code-defined SQL).
    pub filter: Option<&'a str>,
    pub branch: &'a BranchId,
    /// When true the branch sees every row (feature shared).
    pub include_foreign: bool,
}

// ============================================================================
// Catalog Types
// ============================================================================

/// Active product with its parent-variant count, for selection lists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub stock_quantity: i64,
    pub selling_price: f64,
    pub variant_count: u64,
}

/// A product row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub supplier_id: Option<String>,
    pub cost_price: f64,
    pub selling_price: f64,
    pub stock_quantity: i64,
    pub branch_id: Option<BranchId>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub is_shared: bool,
    pub sharing_mode: Option<String>,
}

/// A product variant row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub cost_price: f64,
    pub selling_price: f64,
    pub unit_price: Option<f64>,
    pub quantity: i64,
    pub min_quantity: i64,
    pub branch_id: Option<BranchId>,
    pub is_active: bool,
    pub attributes: Option<String>,
    pub variant_attributes: Option<String>,
    pub variant_name: Option<String>,
    pub is_shared: bool,
    pub sharing_mode: Option<String>,
    pub is_parent: bool,
    pub parent_variant_id: Option<VariantId>,
}

impl Variant {
    /// Parent variants are the canonical, shareable variants of a product.
    pub fn is_parent_variant(&self) -> bool {
        self.is_parent || self.parent_variant_id.is_none()
    }
}

/// Identity of a variant already present under a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantKey {
    pub sku: Option<String>,
    pub name: String,
}
