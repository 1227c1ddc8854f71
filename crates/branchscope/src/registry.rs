//! Registry of branch-scoped tables and the features audited over them.
//!
//! Every table the engine scans or cleans must be listed here. Names are
//! checked when the registry is built (identifier shape, duplicates) and again
//! against the live schema by [`TableRegistry::verify_scope`], so a typo in
//! configuration fails at startup instead of in the middle of a cleanup.

use crate::error::{EngineError, Result};
use branchscope_db::sql::is_valid_identifier;
use branchscope_db::BranchDb;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const DEFAULT_OWNER_COLUMN: &str = "branch_id";
const DEFAULT_SHARED_FLAG: &str = "is_shared";

/// Feature whose visibility policy can be shared or isolated per branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKey {
    Products,
    Customers,
    Inventory,
    Suppliers,
    Categories,
    GiftCards,
    Employees,
}

impl FeatureKey {
    /// Features audited by a default isolation test.
    pub const DEFAULT_SET: [FeatureKey; 5] = [
        FeatureKey::Products,
        FeatureKey::Customers,
        FeatureKey::Inventory,
        FeatureKey::Suppliers,
        FeatureKey::Categories,
    ];

    /// Default set plus gift cards and employees.
    pub const EXTENDED_SET: [FeatureKey; 7] = [
        FeatureKey::Products,
        FeatureKey::Customers,
        FeatureKey::Inventory,
        FeatureKey::Suppliers,
        FeatureKey::Categories,
        FeatureKey::GiftCards,
        FeatureKey::Employees,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKey::Products => "products",
            FeatureKey::Customers => "customers",
            FeatureKey::Inventory => "inventory",
            FeatureKey::Suppliers => "suppliers",
            FeatureKey::Categories => "categories",
            FeatureKey::GiftCards => "gift_cards",
            FeatureKey::Employees => "employees",
        }
    }

    /// Human-readable plural used in test details.
    pub fn label(&self) -> &'static str {
        match self {
            FeatureKey::Products => "products",
            FeatureKey::Customers => "customers",
            FeatureKey::Inventory => "inventory items",
            FeatureKey::Suppliers => "suppliers",
            FeatureKey::Categories => "categories",
            FeatureKey::GiftCards => "gift cards",
            FeatureKey::Employees => "employees",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::EXTENDED_SET
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Inventory has no table of its own: it is the stocked subset of
    /// products.
    fn fallback(&self) -> Option<(FeatureKey, &'static str)> {
        match self {
            FeatureKey::Inventory => Some((FeatureKey::Products, "stock_quantity > 0")),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            EngineError::configuration(format!(
                "Unknown feature key '{}' (expected one of: {})",
                s,
                Self::EXTENDED_SET.map(|f| f.as_str()).join(", ")
            ))
        })
    }
}

/// One branch-scoped table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedTable {
    pub name: String,
    #[serde(default = "default_owner_column")]
    pub owner_column: String,
    /// Feature this table backs in isolation tests.
    #[serde(default)]
    pub feature_key: Option<FeatureKey>,
    /// Column marking a row as explicitly shared across branches.
    #[serde(default)]
    pub shared_flag_column: Option<String>,
}

fn default_owner_column() -> String {
    DEFAULT_OWNER_COLUMN.to_string()
}

impl ScopedTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner_column: default_owner_column(),
            feature_key: None,
            shared_flag_column: None,
        }
    }

    pub fn feature(mut self, feature: FeatureKey) -> Self {
        self.feature_key = Some(feature);
        self
    }

    pub fn shared_flag(mut self, column: impl Into<String>) -> Self {
        self.shared_flag_column = Some(column.into());
        self
    }
}

/// Where an isolation test for one feature reads its rows.
#[derive(Debug, Clone)]
pub struct FeatureCheck<'a> {
    pub feature: FeatureKey,
    pub table: &'a ScopedTable,
    pub filter: Option<&'static str>,
}

/// Validated, ordered list of scoped tables.
#[derive(Debug, Clone)]
pub struct TableRegistry {
    tables: Vec<ScopedTable>,
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self {
            tables: Self::default_tables(),
        }
    }
}

impl TableRegistry {
    /// Build a registry, rejecting malformed or duplicate entries.
    pub fn new(tables: Vec<ScopedTable>) -> Result<Self> {
        if tables.is_empty() {
            return Err(EngineError::configuration("Table registry is empty"));
        }

        let mut names = HashSet::new();
        let mut features = HashSet::new();
        for table in &tables {
            for ident in [Some(&table.name), Some(&table.owner_column), table.shared_flag_column.as_ref()]
                .into_iter()
                .flatten()
            {
                if !is_valid_identifier(ident) {
                    return Err(EngineError::configuration(format!(
                        "Invalid identifier '{}' in registry entry '{}'",
                        ident, table.name
                    )));
                }
            }
            if !names.insert(table.name.as_str()) {
                return Err(EngineError::configuration(format!(
                    "Table '{}' is registered twice",
                    table.name
                )));
            }
            if let Some(feature) = table.feature_key {
                if !features.insert(feature) {
                    return Err(EngineError::configuration(format!(
                        "Feature '{}' is backed by more than one table",
                        feature
                    )));
                }
            }
        }

        Ok(Self { tables })
    }

    /// The tables created by the bundled schema.
    pub fn default_tables() -> Vec<ScopedTable> {
        vec![
            ScopedTable::new("products")
                .feature(FeatureKey::Products)
                .shared_flag(DEFAULT_SHARED_FLAG),
            ScopedTable::new("product_variants").shared_flag(DEFAULT_SHARED_FLAG),
            ScopedTable::new("customers")
                .feature(FeatureKey::Customers)
                .shared_flag(DEFAULT_SHARED_FLAG),
            ScopedTable::new("suppliers")
                .feature(FeatureKey::Suppliers)
                .shared_flag(DEFAULT_SHARED_FLAG),
            ScopedTable::new("categories")
                .feature(FeatureKey::Categories)
                .shared_flag(DEFAULT_SHARED_FLAG),
            ScopedTable::new("orders"),
            ScopedTable::new("stock_movements"),
            ScopedTable::new("gift_cards")
                .feature(FeatureKey::GiftCards)
                .shared_flag(DEFAULT_SHARED_FLAG),
            ScopedTable::new("employees").feature(FeatureKey::Employees),
        ]
    }

    pub fn tables(&self) -> &[ScopedTable] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Look up a registered table; unknown names are a configuration error.
    pub fn get(&self, name: &str) -> Result<&ScopedTable> {
        self.tables.iter().find(|t| t.name == name).ok_or_else(|| {
            EngineError::configuration(format!("Table '{}' is not in the scope registry", name))
        })
    }

    /// Registered tables restricted to `names`, in registry order.
    pub fn select(&self, names: Option<&[String]>) -> Result<Vec<&ScopedTable>> {
        let Some(names) = names else {
            return Ok(self.tables.iter().collect());
        };
        for name in names {
            self.get(name)?;
        }
        Ok(self
            .tables
            .iter()
            .filter(|t| names.iter().any(|n| n == &t.name))
            .collect())
    }

    /// Table and filter used to test `feature`, if any table backs it.
    pub fn feature_check(&self, feature: FeatureKey) -> Option<FeatureCheck<'_>> {
        if let Some(table) = self.tables.iter().find(|t| t.feature_key == Some(feature)) {
            return Some(FeatureCheck {
                feature,
                table,
                filter: None,
            });
        }
        let (base, filter) = feature.fallback()?;
        self.tables
            .iter()
            .find(|t| t.feature_key == Some(base))
            .map(|table| FeatureCheck {
                feature,
                table,
                filter: Some(filter),
            })
    }

    /// Check every registered table and column against the live schema.
    pub async fn verify_scope(&self, db: &BranchDb) -> Result<()> {
        for table in &self.tables {
            let columns = db.table_columns(&table.name).await?;
            if columns.is_empty() {
                return Err(EngineError::configuration(format!(
                    "Registered table '{}' does not exist",
                    table.name
                )));
            }
            let required = std::iter::once(&table.owner_column).chain(table.shared_flag_column.as_ref());
            for column in required {
                if !columns.iter().any(|c| c == column) {
                    return Err(EngineError::configuration(format!(
                        "Table '{}' has no column '{}'",
                        table.name, column
                    )));
                }
            }
            debug!(table = %table.name, "Scope verified");
        }
        Ok(())
    }
}
