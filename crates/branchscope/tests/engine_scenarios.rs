//! End-to-end engine scenarios against an in-memory database.
//!
//! Every test builds a fresh schema, seeds rows through plain SQL or the
//! typed catalog methods, and drives the public `Engine` API only.

use branchscope::{
    Caution, CleanupAction, CleanupOptions, Engine, EngineConfig, EngineError, FeatureKey,
    ShareOptions, SharingMode, StaticBranchContext,
};
use branchscope_db::{Branch, BranchDb, IsolationMode, Product, Variant};
use branchscope_ids::{BranchId, ProductId, VariantId};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Fixtures
// =============================================================================

fn bid(id: &str) -> BranchId {
    BranchId::parse(id).unwrap()
}

async fn add_branch(db: &BranchDb, id: &str, mode: IsolationMode) {
    db.upsert_branch(&Branch {
        id: bid(id),
        name: format!("Branch {id}"),
        code: None,
        isolation_mode: mode,
        is_active: true,
    })
    .await
    .unwrap();
}

fn engine(db: &BranchDb, active: &str) -> Engine {
    Engine::new(
        db.clone(),
        EngineConfig::default(),
        Arc::new(StaticBranchContext::active(bid(active))),
    )
    .unwrap()
}

/// Insert `count` rows per owner into a table whose only required column is `id`.
async fn seed(db: &BranchDb, table: &str, owners: &[(Option<&str>, usize)]) {
    let sql = format!("INSERT INTO {table} (id, branch_id) VALUES (?, ?)");
    let mut n = 0;
    for (owner, count) in owners {
        for _ in 0..*count {
            n += 1;
            sqlx::query(&sql)
                .bind(format!("{table}-{n}"))
                .bind(*owner)
                .execute(db.pool())
                .await
                .unwrap();
        }
    }
}

async fn seed_customer(db: &BranchDb, id: &str, owner: Option<&str>, shared: bool) {
    sqlx::query("INSERT INTO customers (id, name, branch_id, is_shared) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(format!("Customer {id}"))
        .bind(owner)
        .bind(shared)
        .execute(db.pool())
        .await
        .unwrap();
}

async fn owners(db: &BranchDb, table: &str, branch: &str) -> (u64, u64, u64) {
    let c = db
        .ownership_counts(table, "branch_id", &bid(branch), None)
        .await
        .unwrap();
    (c.current, c.other, c.unassigned)
}

fn product(sku: &str, branch: &str, stock: i64) -> Product {
    Product {
        id: ProductId::new(),
        name: format!("Product {sku}"),
        sku: sku.to_string(),
        description: Some("cotton".to_string()),
        category_id: None,
        supplier_id: None,
        cost_price: 4.0,
        selling_price: 9.5,
        stock_quantity: stock,
        branch_id: Some(bid(branch)),
        image_url: None,
        is_active: true,
        is_shared: false,
        sharing_mode: None,
    }
}

fn variant(product: &Product, name: &str, quantity: i64, parent: Option<&VariantId>) -> Variant {
    Variant {
        id: VariantId::new(),
        product_id: product.id.clone(),
        name: name.to_string(),
        sku: Some(format!("{}-{}", product.sku, name)),
        barcode: None,
        cost_price: 4.0,
        selling_price: 9.5,
        unit_price: None,
        quantity,
        min_quantity: 1,
        branch_id: product.branch_id.clone(),
        is_active: true,
        attributes: None,
        variant_attributes: None,
        variant_name: Some(name.to_string()),
        is_shared: false,
        sharing_mode: None,
        is_parent: parent.is_none(),
        parent_variant_id: parent.cloned(),
    }
}

/// Source product with two parent variants and one child variant.
async fn seed_catalog(db: &BranchDb, branch: &str, sku: &str) -> Product {
    let p = product(sku, branch, 40);
    db.insert_product(&p).await.unwrap();
    let small = variant(&p, "S", 10, None);
    let large = variant(&p, "L", 12, None);
    let child = variant(&p, "S-red", 3, Some(&small.id));
    db.insert_variants(&[small, large, child]).await.unwrap();
    p
}

// =============================================================================
// Analysis
// =============================================================================

#[tokio::test]
async fn test_orders_report_splits_by_owner() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Isolated).await;
    seed(&db, "orders", &[(Some("A"), 10), (Some("B"), 3), (None, 2)]).await;

    let report = engine(&db, "A").run_full_analysis().await.unwrap();
    let orders = report.report("orders").unwrap();

    assert_eq!(orders.total_records, 15);
    assert_eq!(orders.current_branch_records, 10);
    assert_eq!(orders.other_branch_records, 3);
    assert_eq!(orders.unassigned_records, 2);
    assert!(report.has_violation);
    assert!(report.has_unassigned);
    assert!(report.scan_errors.is_empty());
}

#[tokio::test]
async fn test_every_report_partitions_its_total() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Isolated).await;
    seed(&db, "orders", &[(Some("A"), 4), (Some("B"), 1)]).await;
    seed(&db, "stock_movements", &[(Some("C"), 6), (None, 3)]).await;
    seed_catalog(&db, "B", "TEE").await;

    let report = engine(&db, "A").run_full_analysis().await.unwrap();

    assert_eq!(report.reports.len(), 9);
    for r in &report.reports {
        assert!(r.is_consistent(), "{} does not partition: {:?}", r.table, r);
    }
    assert_eq!(report.report("product_variants").unwrap().other_branch_records, 3);
}

#[tokio::test]
async fn test_failing_table_is_reported_without_aborting() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Isolated).await;
    seed(&db, "orders", &[(Some("B"), 2)]).await;
    sqlx::query("DROP TABLE stock_movements")
        .execute(db.pool())
        .await
        .unwrap();

    let report = engine(&db, "A").run_full_analysis().await.unwrap();

    assert_eq!(report.scan_errors.len(), 1);
    assert_eq!(report.scan_errors[0].table, "stock_movements");
    assert_eq!(report.reports.len(), 8);
    assert_eq!(report.report("orders").unwrap().other_branch_records, 2);
}

#[tokio::test]
async fn test_debug_mode_is_per_engine() {
    let db = BranchDb::open_in_memory().await.unwrap();
    let mut first = engine(&db, "A");
    let second = engine(&db, "A");

    first.enable_debug_mode();
    assert!(first.is_debug_mode());
    assert!(!second.is_debug_mode());

    first.disable_debug_mode();
    assert!(!first.is_debug_mode());
}

#[tokio::test]
async fn test_analysis_without_active_branch_is_rejected() {
    let db = BranchDb::open_in_memory().await.unwrap();
    let engine = Engine::new(
        db,
        EngineConfig::default(),
        Arc::new(StaticBranchContext::default()),
    )
    .unwrap();

    let err = engine.run_full_analysis().await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

// =============================================================================
// Cleanup
// =============================================================================

#[tokio::test]
async fn test_dry_run_counts_exactly_what_live_run_changes() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Isolated).await;
    seed(&db, "orders", &[(Some("A"), 10), (Some("B"), 3), (None, 2)]).await;
    let engine = engine(&db, "A");

    let preview = engine
        .cleanup_branch_data(&CleanupOptions::preview(CleanupAction::Delete))
        .await
        .unwrap();
    assert_eq!(preview.affected("orders"), Some(3));
    assert_eq!(owners(&db, "orders", "A").await, (10, 3, 2));

    let live = engine
        .cleanup_branch_data(&CleanupOptions::confirmed(CleanupAction::Reassign))
        .await
        .unwrap();
    assert_eq!(live.affected("orders"), preview.affected("orders"));
    assert_eq!(owners(&db, "orders", "A").await, (13, 0, 2));
}

#[tokio::test]
async fn test_reassign_is_idempotent() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Isolated).await;
    seed(&db, "orders", &[(Some("B"), 3)]).await;
    seed(&db, "stock_movements", &[(Some("C"), 2)]).await;
    let engine = engine(&db, "A");
    let options = CleanupOptions::confirmed(CleanupAction::Reassign);

    let first = engine.cleanup_branch_data(&options).await.unwrap();
    assert_eq!(first.total_affected(), 5);

    let second = engine.cleanup_branch_data(&options).await.unwrap();
    assert_eq!(second.total_affected(), 0);
    assert!(second.errors.is_empty());
}

#[tokio::test]
async fn test_delete_limited_to_selected_tables() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Isolated).await;
    seed(&db, "orders", &[(Some("A"), 1), (Some("B"), 3)]).await;
    seed(&db, "stock_movements", &[(Some("B"), 4)]).await;

    let options =
        CleanupOptions::confirmed(CleanupAction::Delete).only(vec!["orders".to_string()]);
    let summary = engine(&db, "A").cleanup_branch_data(&options).await.unwrap();

    assert_eq!(summary.per_table.len(), 1);
    assert_eq!(summary.affected("orders"), Some(3));
    assert_eq!(owners(&db, "orders", "A").await, (1, 0, 0));
    assert_eq!(owners(&db, "stock_movements", "A").await, (0, 4, 0));
}

#[tokio::test]
async fn test_unassigned_rows_survive_every_action() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Isolated).await;
    seed(&db, "orders", &[(Some("B"), 2), (None, 5)]).await;
    let engine = engine(&db, "A");

    for action in [CleanupAction::Reassign, CleanupAction::Delete] {
        engine
            .cleanup_branch_data(&CleanupOptions::confirmed(action))
            .await
            .unwrap();
        assert_eq!(owners(&db, "orders", "A").await.2, 5);
    }
}

#[tokio::test]
async fn test_unconfirmed_live_cleanup_changes_nothing() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Isolated).await;
    seed(&db, "orders", &[(Some("B"), 3)]).await;

    let options = CleanupOptions {
        dry_run: false,
        ..CleanupOptions::preview(CleanupAction::Delete)
    };
    let err = engine(&db, "A")
        .cleanup_branch_data(&options)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(owners(&db, "orders", "A").await, (0, 3, 0));
}

#[tokio::test]
async fn test_held_lock_blocks_second_live_cleanup() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Isolated).await;
    seed(&db, "orders", &[(Some("B"), 3)]).await;
    db.try_acquire_branch_lock(&bid("A"), "cleanup-first", Duration::from_secs(900))
        .await
        .unwrap()
        .unwrap();

    let err = engine(&db, "A")
        .cleanup_branch_data(&CleanupOptions::confirmed(CleanupAction::Delete))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Busy { .. }));
    assert_eq!(owners(&db, "orders", "A").await, (0, 3, 0));

    // Previews never take the lock
    let preview = engine(&db, "A")
        .cleanup_branch_data(&CleanupOptions::preview(CleanupAction::Delete))
        .await
        .unwrap();
    assert_eq!(preview.affected("orders"), Some(3));
}

#[tokio::test]
async fn test_stale_lock_is_reclaimed_and_released() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Isolated).await;
    seed(&db, "orders", &[(Some("B"), 1)]).await;
    sqlx::query(
        "INSERT INTO branch_maintenance_locks (branch_id, holder, acquired_at) VALUES (?, ?, ?)",
    )
    .bind("A")
    .bind("cleanup-crashed")
    .bind(0_i64)
    .execute(db.pool())
    .await
    .unwrap();

    let summary = engine(&db, "A")
        .cleanup_branch_data(&CleanupOptions::confirmed(CleanupAction::Reassign))
        .await
        .unwrap();

    assert_eq!(summary.affected("orders"), Some(1));
    assert!(db.branch_lock(&bid("A")).await.unwrap().is_none());
}

// =============================================================================
// Sharing
// =============================================================================

async fn share_fixture() -> (BranchDb, Engine, Product) {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "src1234abcd", IsolationMode::Isolated).await;
    add_branch(&db, "tgt5678", IsolationMode::Isolated).await;
    let p = seed_catalog(&db, "src1234abcd", "ABC-1").await;
    let engine = engine(&db, "src1234abcd");
    (db, engine, p)
}

#[tokio::test]
async fn test_share_copies_product_with_zero_stock_and_suffixed_sku() {
    let (db, engine, p) = share_fixture().await;
    let (src, tgt) = (bid("src1234abcd"), bid("tgt5678"));

    let result = engine
        .share_products(&src, &tgt, &[p.id.clone()])
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.products_shared, 1);
    assert_eq!(result.variants_shared, 2);
    assert_eq!(result.source_branch_name, "Branch src1234abcd");
    assert_eq!(result.target_branch_name, "Branch tgt5678");

    let copy_id = db
        .find_product_by_sku(&tgt, &["ABC-1-tgt5678"])
        .await
        .unwrap()
        .expect("copied product");
    let copy = db.get_product_in_branch(&copy_id, &tgt).await.unwrap().unwrap();
    assert_eq!(copy.stock_quantity, 0);
    assert_eq!(copy.selling_price, p.selling_price);
    assert!(copy.is_active);
    assert!(!copy.is_shared);

    let variants = db.parent_variants(&copy_id, &tgt).await.unwrap();
    assert_eq!(variants.len(), 2);
    assert!(variants.iter().all(|v| v.quantity == 0));
    assert!(variants.iter().all(|v| v.parent_variant_id.is_none()));
    assert!(variants
        .iter()
        .all(|v| v.sku.as_deref().is_some_and(|s| s.ends_with("-tgt5678"))));

    // Source untouched
    let source = db.get_product_in_branch(&p.id, &src).await.unwrap().unwrap();
    assert_eq!(source.stock_quantity, 40);
}

#[tokio::test]
async fn test_repeated_share_reuses_product_and_skips_variants() {
    let (_db, engine, p) = share_fixture().await;
    let (src, tgt) = (bid("src1234abcd"), bid("tgt5678"));
    let ids = [p.id.clone()];

    engine.share_products(&src, &tgt, &ids).await.unwrap();
    let again = engine.share_products(&src, &tgt, &ids).await.unwrap();

    assert!(again.success);
    assert_eq!(again.products_shared, 0);
    assert_eq!(again.skipped_existing, 1);
    assert_eq!(again.variants_shared, 0);
}

#[tokio::test]
async fn test_repeated_share_without_guard_duplicates_variants() {
    let (db, engine, p) = share_fixture().await;
    let (src, tgt) = (bid("src1234abcd"), bid("tgt5678"));
    let ids = [p.id.clone()];
    let unguarded = ShareOptions {
        skip_existing_variants: false,
    };

    engine.share_products(&src, &tgt, &ids).await.unwrap();
    let again = engine
        .share_products_with(&src, &tgt, &ids, unguarded)
        .await
        .unwrap();

    assert_eq!(again.products_shared, 0);
    assert_eq!(again.variants_shared, 2);
    let copy_id = db
        .find_product_by_sku(&tgt, &["ABC-1-tgt5678"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(db.parent_variants(&copy_id, &tgt).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_share_rejects_same_branch_and_empty_selection() {
    let (_db, engine, p) = share_fixture().await;
    let src = bid("src1234abcd");

    let same = engine.share_products(&src, &src, &[p.id.clone()]).await;
    assert!(matches!(same, Err(EngineError::Validation(_))));

    let empty = engine.share_products(&src, &bid("tgt5678"), &[]).await;
    assert!(matches!(empty, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn test_share_to_unknown_branch_reports_failure() {
    let (_db, engine, p) = share_fixture().await;

    let result = engine
        .share_products(&bid("src1234abcd"), &bid("nowhere"), &[p.id.clone()])
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.error.is_some());
    assert_eq!(result.products_shared, 0);
}

#[tokio::test]
async fn test_foreign_product_fails_alone() {
    let (db, engine, p) = share_fixture().await;
    let stranger = seed_catalog(&db, "tgt5678", "XYZ").await;

    let result = engine
        .share_products(
            &bid("src1234abcd"),
            &bid("tgt5678"),
            &[stranger.id.clone(), p.id.clone()],
        )
        .await
        .unwrap();

    assert_eq!(result.products_shared, 1);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].product_id, stranger.id);
}

#[tokio::test]
async fn test_missing_in_target_shrinks_after_share() {
    let (db, engine, p) = share_fixture().await;
    let (src, tgt) = (bid("src1234abcd"), bid("tgt5678"));
    seed_catalog(&db, "src1234abcd", "DEF-2").await;

    let shareable = engine.shareable_products(&src).await.unwrap();
    assert_eq!(shareable.len(), 2);
    assert!(shareable.iter().all(|p| p.variant_count == 2));

    let before = engine.missing_in_target(&src, &tgt).await.unwrap();
    assert_eq!(before.len(), 2);

    engine.share_products(&src, &tgt, &[p.id.clone()]).await.unwrap();

    let after = engine.missing_in_target(&src, &tgt).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].sku, "DEF-2");
    assert_eq!(after[0].variant_count, 2);
}

// =============================================================================
// Isolation test
// =============================================================================

#[tokio::test]
async fn test_isolated_branch_passes_when_foreign_rows_hidden() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Isolated).await;
    seed_customer(&db, "c1", Some("A"), false).await;
    seed_customer(&db, "c2", Some("A"), false).await;
    seed_customer(&db, "c3", Some("B"), false).await;

    let info = engine(&db, "A")
        .run_full_isolation_test(&bid("A"))
        .await
        .unwrap();

    assert_eq!(info.test_results.len(), FeatureKey::DEFAULT_SET.len());
    let customers = info
        .test_results
        .iter()
        .find(|r| r.feature == FeatureKey::Customers)
        .unwrap();
    assert!(customers.passed);
    assert_eq!(customers.actual, Some(SharingMode::Isolated));
    assert_eq!(customers.caution, None);
    assert_eq!(customers.data_count.current_branch, 2);

    let products = info
        .test_results
        .iter()
        .find(|r| r.feature == FeatureKey::Products)
        .unwrap();
    assert!(products.passed);
    assert_eq!(products.caution, Some(Caution::NoLocalRecords));
}

#[tokio::test]
async fn test_shared_flag_leak_fails_isolated_branch() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Isolated).await;
    seed_customer(&db, "c1", Some("A"), false).await;
    seed_customer(&db, "c2", Some("B"), true).await;

    let info = engine(&db, "A")
        .run_full_isolation_test(&bid("A"))
        .await
        .unwrap();

    let customers = info
        .test_results
        .iter()
        .find(|r| r.feature == FeatureKey::Customers)
        .unwrap();
    assert!(!customers.passed);
    assert_eq!(customers.expected, SharingMode::Isolated);
    assert_eq!(customers.actual, Some(SharingMode::Shared));
    assert!(info.summary.failed >= 1);
}

#[tokio::test]
async fn test_hybrid_branch_uses_feature_flags() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "H", IsolationMode::Hybrid).await;
    seed_customer(&db, "c1", Some("H"), false).await;
    seed_customer(&db, "c2", Some("B"), false).await;
    let engine = engine(&db, "H");
    engine
        .set_feature_sharing(&bid("H"), FeatureKey::Customers, true)
        .await
        .unwrap();

    let info = engine.run_full_isolation_test(&bid("H")).await.unwrap();

    assert_eq!(info.settings.get(&FeatureKey::Customers), Some(&true));
    assert_eq!(info.settings.get(&FeatureKey::Suppliers), Some(&false));
    let customers = info
        .test_results
        .iter()
        .find(|r| r.feature == FeatureKey::Customers)
        .unwrap();
    assert!(customers.passed);
    assert_eq!(customers.caution, Some(Caution::ForeignRecordsVisible));
    assert_eq!(info.summary.total_tests, 5);
}

#[tokio::test]
async fn test_extended_features_cover_employees() {
    let db = BranchDb::open_in_memory().await.unwrap();
    add_branch(&db, "A", IsolationMode::Shared).await;
    let config = EngineConfig {
        extended_features: true,
        ..EngineConfig::default()
    };
    let engine = Engine::new(
        db,
        config,
        Arc::new(StaticBranchContext::active(bid("A"))),
    )
    .unwrap();

    let info = engine.run_full_isolation_test(&bid("A")).await.unwrap();

    assert_eq!(info.test_results.len(), 7);
    assert!(info
        .test_results
        .iter()
        .any(|r| r.feature == FeatureKey::Employees));
    // Shared mode with no rows anywhere observes isolation
    assert!(info.test_results.iter().all(|r| !r.passed));
}

#[tokio::test]
async fn test_isolation_test_for_unknown_branch() {
    let db = BranchDb::open_in_memory().await.unwrap();
    let err = engine(&db, "A")
        .run_full_isolation_test(&bid("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
