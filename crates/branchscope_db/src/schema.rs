//! Database schema creation for branches and the branch-scoped tables.
//!
//! All CREATE TABLE statements live here. Every scoped table carries a
//! nullable `branch_id`; NULL means the row was never assigned to a branch.

use crate::error::Result;
use crate::sql::Ident;
use crate::BranchDb;
use sqlx::Row;
use tracing::info;

/// Tables created by [`BranchDb::ensure_schema`] that carry a `branch_id`.
pub const SCOPED_TABLES: &[&str] = &[
    "products",
    "product_variants",
    "customers",
    "suppliers",
    "categories",
    "orders",
    "stock_movements",
    "gift_cards",
    "employees",
];

impl BranchDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        self.create_branch_tables().await?;
        self.create_catalog_tables().await?;
        self.create_operational_tables().await?;
        self.create_scope_indexes().await?;

        info!("Database schema verified");
        Ok(())
    }

    /// Column names of `table`, empty when the table does not exist.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let ident = Ident::new(table)?;
        let rows = sqlx::query(&format!("PRAGMA table_info({})", ident))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(Into::into))
            .collect()
    }

    async fn create_branch_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS branches (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                code TEXT,
                isolation_mode TEXT NOT NULL DEFAULT 'isolated',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // Per-feature sharing flags, consulted in hybrid mode
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS branch_feature_settings (
                branch_id TEXT NOT NULL REFERENCES branches(id),
                feature_key TEXT NOT NULL,
                shared INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (branch_id, feature_key)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // One row per branch while a live cleanup runs
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS branch_maintenance_locks (
                branch_id TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                acquired_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_catalog_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                sku TEXT NOT NULL,
                description TEXT,
                category_id TEXT,
                supplier_id TEXT,
                cost_price REAL NOT NULL DEFAULT 0,
                selling_price REAL NOT NULL DEFAULT 0,
                stock_quantity INTEGER NOT NULL DEFAULT 0,
                branch_id TEXT,
                image_url TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_shared INTEGER NOT NULL DEFAULT 0,
                sharing_mode TEXT,
                created_at INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS product_variants (
                id TEXT PRIMARY KEY,
                product_id TEXT NOT NULL,
                name TEXT NOT NULL,
                sku TEXT,
                barcode TEXT,
                cost_price REAL NOT NULL DEFAULT 0,
                selling_price REAL NOT NULL DEFAULT 0,
                unit_price REAL,
                quantity INTEGER NOT NULL DEFAULT 0,
                min_quantity INTEGER NOT NULL DEFAULT 0,
                branch_id TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                attributes TEXT,
                variant_attributes TEXT,
                variant_name TEXT,
                is_shared INTEGER NOT NULL DEFAULT 0,
                sharing_mode TEXT,
                is_parent INTEGER NOT NULL DEFAULT 0,
                parent_variant_id TEXT,
                created_at INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_branch_sku ON products(branch_id, sku)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_variants_product ON product_variants(product_id, branch_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_operational_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS customers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT,
                branch_id TEXT,
                is_shared INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS suppliers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                branch_id TEXT,
                is_shared INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                branch_id TEXT,
                is_shared INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                customer_id TEXT,
                total_amount REAL NOT NULL DEFAULT 0,
                branch_id TEXT,
                created_at INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS stock_movements (
                id TEXT PRIMARY KEY,
                product_id TEXT,
                variant_id TEXT,
                quantity INTEGER NOT NULL DEFAULT 0,
                movement_type TEXT NOT NULL DEFAULT 'adjustment',
                branch_id TEXT,
                created_at INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS gift_cards (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                balance REAL NOT NULL DEFAULT 0,
                branch_id TEXT,
                is_shared INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS employees (
                id TEXT PRIMARY KEY,
                full_name TEXT NOT NULL,
                branch_id TEXT,
                created_at INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_scope_indexes(&self) -> Result<()> {
        for table in SCOPED_TABLES {
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_branch ON {table}(branch_id)"
            );
            sqlx::query(&sql).execute(&self.pool).await?;
        }
        Ok(())
    }
}
