//! Catalog reads and writes (products and their variants).

use crate::error::{DbError, Result};
use crate::types::*;
use crate::BranchDb;
use branchscope_ids::{BranchId, ProductId, VariantId};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

/// SQLite's historical bound-parameter limit.
const MAX_BIND_PARAMS: usize = 999;

const VARIANT_COLUMNS: &[&str] = &[
    "id",
    "product_id",
    "name",
    "sku",
    "barcode",
    "cost_price",
    "selling_price",
    "unit_price",
    "quantity",
    "min_quantity",
    "branch_id",
    "is_active",
    "attributes",
    "variant_attributes",
    "variant_name",
    "is_shared",
    "sharing_mode",
    "is_parent",
    "parent_variant_id",
    "created_at",
];

impl BranchDb {
    // ========================================================================
    // Products
    // ========================================================================

    /// Get a product by ID, only if it belongs to `branch`.
    pub async fn get_product_in_branch(
        &self,
        id: &ProductId,
        branch: &BranchId,
    ) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE id = ? AND branch_id = ?")
            .bind(id.as_str())
            .bind(branch.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row_to_product(&row)).transpose()
    }

    /// First product in `branch` whose SKU equals one of `skus`, tried in
    /// order.
    pub async fn find_product_by_sku(
        &self,
        branch: &BranchId,
        skus: &[&str],
    ) -> Result<Option<ProductId>> {
        for sku in skus {
            let id: Option<String> = sqlx::query_scalar(
                "SELECT id FROM products WHERE branch_id = ? AND sku = ? ORDER BY created_at LIMIT 1",
            )
            .bind(branch.as_str())
            .bind(*sku)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(id) = id {
                return parse_id(&id, ProductId::parse).map(Some);
            }
        }
        Ok(None)
    }

    /// Insert a product row as given.
    pub async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, sku, description, category_id, supplier_id,
                cost_price, selling_price, stock_quantity, branch_id, image_url,
                is_active, is_shared, sharing_mode, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.description.as_deref())
        .bind(product.category_id.as_deref())
        .bind(product.supplier_id.as_deref())
        .bind(product.cost_price)
        .bind(product.selling_price)
        .bind(product.stock_quantity)
        .bind(product.branch_id.as_ref().map(|b| b.as_str()))
        .bind(product.image_url.as_deref())
        .bind(product.is_active)
        .bind(product.is_shared)
        .bind(product.sharing_mode.as_deref())
        .bind(Self::now_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Active products of a branch with their parent-variant counts.
    pub async fn list_active_products(&self, branch: &BranchId) -> Result<Vec<ProductSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT
                p.id, p.name, p.sku, p.stock_quantity, p.selling_price,
                (SELECT COUNT(*) FROM product_variants v
                 WHERE v.product_id = p.id
                   AND v.branch_id = p.branch_id
                   AND (v.is_parent = 1 OR v.parent_variant_id IS NULL)) AS variant_count
            FROM products p
            WHERE p.branch_id = ? AND p.is_active = 1
            ORDER BY p.name
            "#,
        )
        .bind(branch.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let variant_count: i64 = row.try_get("variant_count")?;
                Ok(ProductSummary {
                    id: parse_id(&id, ProductId::parse)?,
                    name: row.try_get("name")?,
                    sku: row.try_get("sku")?,
                    stock_quantity: row.try_get("stock_quantity")?,
                    selling_price: row.try_get("selling_price")?,
                    variant_count: variant_count.max(0) as u64,
                })
            })
            .collect()
    }

    /// SKUs of every active product in a branch.
    pub async fn active_product_skus(&self, branch: &BranchId) -> Result<Vec<String>> {
        let skus = sqlx::query_scalar(
            "SELECT sku FROM products WHERE branch_id = ? AND is_active = 1",
        )
        .bind(branch.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(skus)
    }

    // ========================================================================
    // Variants
    // ========================================================================

    /// Parent variants (`is_parent` or no parent) of a product in a branch.
    pub async fn parent_variants(
        &self,
        product: &ProductId,
        branch: &BranchId,
    ) -> Result<Vec<Variant>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM product_variants
            WHERE product_id = ? AND branch_id = ?
              AND (is_parent = 1 OR parent_variant_id IS NULL)
            ORDER BY created_at, id
            "#,
        )
        .bind(product.as_str())
        .bind(branch.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_variant).collect()
    }

    /// SKU/name pairs of the variants already under a product.
    pub async fn variant_keys(&self, product: &ProductId) -> Result<Vec<VariantKey>> {
        let rows = sqlx::query("SELECT sku, name FROM product_variants WHERE product_id = ?")
            .bind(product.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(VariantKey {
                    sku: row.try_get("sku")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    /// Insert variant rows in one transaction; all or none.
    pub async fn insert_variants(&self, variants: &[Variant]) -> Result<u64> {
        if variants.is_empty() {
            return Ok(0);
        }

        let rows_per_chunk = MAX_BIND_PARAMS / VARIANT_COLUMNS.len();
        let now = Self::now_millis();
        let mut tx = self.pool.begin().await?;
        let mut total = 0;

        for chunk in variants.chunks(rows_per_chunk) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO product_variants ({}) ",
                VARIANT_COLUMNS.join(", ")
            ));
            builder.push_values(chunk, |mut b, v| {
                b.push_bind(v.id.to_string())
                    .push_bind(v.product_id.to_string())
                    .push_bind(v.name.clone())
                    .push_bind(v.sku.clone())
                    .push_bind(v.barcode.clone())
                    .push_bind(v.cost_price)
                    .push_bind(v.selling_price)
                    .push_bind(v.unit_price)
                    .push_bind(v.quantity)
                    .push_bind(v.min_quantity)
                    .push_bind(v.branch_id.as_ref().map(|b| b.to_string()))
                    .push_bind(v.is_active)
                    .push_bind(v.attributes.clone())
                    .push_bind(v.variant_attributes.clone())
                    .push_bind(v.variant_name.clone())
                    .push_bind(v.is_shared)
                    .push_bind(v.sharing_mode.clone())
                    .push_bind(v.is_parent)
                    .push_bind(v.parent_variant_id.as_ref().map(|p| p.to_string()))
                    .push_bind(now);
            });

            total += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        debug!(rows = total, "Inserted variants");
        Ok(total)
    }
}

fn parse_id<T, E: std::fmt::Display>(raw: &str, parse: impl Fn(&str) -> std::result::Result<T, E>) -> Result<T> {
    parse(raw).map_err(|e| DbError::invalid_state(e.to_string()))
}

fn parse_branch(raw: Option<String>) -> Result<Option<BranchId>> {
    raw.map(|b| parse_id(&b, BranchId::parse)).transpose()
}

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<Product> {
    let id: String = row.try_get("id")?;
    Ok(Product {
        id: parse_id(&id, ProductId::parse)?,
        name: row.try_get("name")?,
        sku: row.try_get("sku")?,
        description: row.try_get("description")?,
        category_id: row.try_get("category_id")?,
        supplier_id: row.try_get("supplier_id")?,
        cost_price: row.try_get("cost_price")?,
        selling_price: row.try_get("selling_price")?,
        stock_quantity: row.try_get("stock_quantity")?,
        branch_id: parse_branch(row.try_get("branch_id")?)?,
        image_url: row.try_get("image_url")?,
        is_active: row.try_get("is_active")?,
        is_shared: row.try_get("is_shared")?,
        sharing_mode: row.try_get("sharing_mode")?,
    })
}

fn row_to_variant(row: &sqlx::sqlite::SqliteRow) -> Result<Variant> {
    let id: String = row.try_get("id")?;
    let product_id: String = row.try_get("product_id")?;
    let parent: Option<String> = row.try_get("parent_variant_id")?;
    Ok(Variant {
        id: parse_id(&id, VariantId::parse)?,
        product_id: parse_id(&product_id, ProductId::parse)?,
        name: row.try_get("name")?,
        sku: row.try_get("sku")?,
        barcode: row.try_get("barcode")?,
        cost_price: row.try_get("cost_price")?,
        selling_price: row.try_get("selling_price")?,
        unit_price: row.try_get("unit_price")?,
        quantity: row.try_get("quantity")?,
        min_quantity: row.try_get("min_quantity")?,
        branch_id: parse_branch(row.try_get("branch_id")?)?,
        is_active: row.try_get("is_active")?,
        attributes: row.try_get("attributes")?,
        variant_attributes: row.try_get("variant_attributes")?,
        variant_name: row.try_get("variant_name")?,
        is_shared: row.try_get("is_shared")?,
        sharing_mode: row.try_get("sharing_mode")?,
        is_parent: row.try_get("is_parent")?,
        parent_variant_id: parent.map(|p| parse_id(&p, VariantId::parse)).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, sku: &str, branch: &str) -> Product {
        Product {
            id: ProductId::parse(id).unwrap(),
            name: format!("Product {id}"),
            sku: sku.to_string(),
            description: Some("desc".to_string()),
            category_id: None,
            supplier_id: None,
            cost_price: 10.0,
            selling_price: 15.5,
            stock_quantity: 7,
            branch_id: Some(BranchId::parse(branch).unwrap()),
            image_url: None,
            is_active: true,
            is_shared: false,
            sharing_mode: None,
        }
    }

    fn variant(id: &str, product: &str, branch: &str, parent: Option<&str>) -> Variant {
        Variant {
            id: VariantId::parse(id).unwrap(),
            product_id: ProductId::parse(product).unwrap(),
            name: format!("Variant {id}"),
            sku: Some(format!("SKU-{id}")),
            barcode: None,
            cost_price: 1.0,
            selling_price: 2.0,
            unit_price: None,
            quantity: 4,
            min_quantity: 1,
            branch_id: Some(BranchId::parse(branch).unwrap()),
            is_active: true,
            attributes: Some(r#"{"color":"red"}"#.to_string()),
            variant_attributes: None,
            variant_name: None,
            is_shared: false,
            sharing_mode: None,
            is_parent: parent.is_none(),
            parent_variant_id: parent.map(|p| VariantId::parse(p).unwrap()),
        }
    }

    #[tokio::test]
    async fn product_lookup_is_branch_scoped() {
        let db = BranchDb::open_in_memory().await.unwrap();
        let p = product("p1", "ABC-1", "A");
        db.insert_product(&p).await.unwrap();

        let a = BranchId::parse("A").unwrap();
        let b = BranchId::parse("B").unwrap();
        assert_eq!(db.get_product_in_branch(&p.id, &a).await.unwrap(), Some(p.clone()));
        assert_eq!(db.get_product_in_branch(&p.id, &b).await.unwrap(), None);

        let found = db.find_product_by_sku(&a, &["nope", "ABC-1"]).await.unwrap();
        assert_eq!(found, Some(p.id));
        assert_eq!(db.find_product_by_sku(&b, &["ABC-1"]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn parent_variants_exclude_children() {
        let db = BranchDb::open_in_memory().await.unwrap();
        db.insert_product(&product("p1", "ABC-1", "A")).await.unwrap();
        let rows = vec![
            variant("v1", "p1", "A", None),
            variant("v2", "p1", "A", Some("v1")),
            variant("v3", "p1", "A", None),
        ];
        assert_eq!(db.insert_variants(&rows).await.unwrap(), 3);

        let parents = db
            .parent_variants(&ProductId::parse("p1").unwrap(), &BranchId::parse("A").unwrap())
            .await
            .unwrap();
        let ids: Vec<&str> = parents.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v3"]);
        assert!(parents.iter().all(Variant::is_parent_variant));
        assert_eq!(parents[0].attributes.as_deref(), Some(r#"{"color":"red"}"#));
    }

    #[tokio::test]
    async fn summaries_count_parent_variants() {
        let db = BranchDb::open_in_memory().await.unwrap();
        db.insert_product(&product("p1", "ABC-1", "A")).await.unwrap();
        db.insert_variants(&[
            variant("v1", "p1", "A", None),
            variant("v2", "p1", "A", Some("v1")),
        ])
        .await
        .unwrap();

        let summaries = db
            .list_active_products(&BranchId::parse("A").unwrap())
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].variant_count, 1);
    }

    #[tokio::test]
    async fn variant_insert_is_all_or_nothing() {
        let db = BranchDb::open_in_memory().await.unwrap();
        let rows = vec![
            variant("v1", "p1", "A", None),
            variant("v1", "p1", "A", None),
        ];
        assert!(db.insert_variants(&rows).await.is_err());
        assert!(db
            .variant_keys(&ProductId::parse("p1").unwrap())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn large_batches_are_chunked() {
        let db = BranchDb::open_in_memory().await.unwrap();
        let rows: Vec<Variant> = (0..120)
            .map(|i| variant(&format!("v{i}"), "p1", "A", None))
            .collect();
        assert_eq!(db.insert_variants(&rows).await.unwrap(), 120);
    }
}
