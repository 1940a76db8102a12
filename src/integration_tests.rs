#[cfg(test)]
mod tests {
    use crate::commands::boxes::create_box_internal;
    use crate::commands::product::{
        apply_upload, classify, delete_product_internal, load_catalog, UploadRow,
    };
    use crate::db::{self, DbPool};
    use crate::error::AppError;

    async fn setup_test_db() -> DbPool {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = db::init_pool(&database_url)
            .await
            .expect("Failed to create pool");
        db::init_database(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    fn test_branch(label: &str) -> String {
        format!("test-{}-{}", label, uuid::Uuid::new_v4())
    }

    fn row(sku: &str, price: f64, stock: i32) -> UploadRow {
        UploadRow {
            sku: sku.to_string(),
            name: format!("Item {}", sku),
            price,
            rack_number: "R1".to_string(),
            stock_new: stock,
        }
    }

    async fn cleanup_branch(pool: &DbPool, branch: &str) {
        let _ = sqlx::query("DELETE FROM boxes WHERE branch = $1")
            .bind(branch)
            .execute(pool)
            .await;
        let _ = sqlx::query("DELETE FROM products WHERE branch = $1")
            .bind(branch)
            .execute(pool)
            .await;
    }

    #[tokio::test]
    async fn test_upload_then_identical_reapply_is_idempotent() {
        let pool = setup_test_db().await;
        let branch = test_branch("upload");

        let rows = vec![row("A", 10.0, 5), row("B", 20.0, 3), row("C", 30.0, 0)];

        let first = apply_upload(&pool, &branch, &rows)
            .await
            .expect("first upload failed");
        assert_eq!(first.added, 3);
        assert_eq!(first.updated, 0);

        let comparison = classify(load_catalog(&pool, &branch).await.unwrap(), &rows);
        assert_eq!(comparison.matched.len(), 3);
        assert!(comparison.missing.is_empty());
        assert!(comparison.surplus.is_empty());

        let second = apply_upload(&pool, &branch, &rows)
            .await
            .expect("second upload failed");
        assert_eq!(second.added, 0);
        assert_eq!(second.updated, 3);

        cleanup_branch(&pool, &branch).await;
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing_fields() {
        let pool = setup_test_db().await;
        let branch = test_branch("overwrite");

        apply_upload(&pool, &branch, &[row("A", 10.0, 5)])
            .await
            .unwrap();
        apply_upload(&pool, &branch, &[row("A", 25.5, 9)])
            .await
            .unwrap();

        let catalog = load_catalog(&pool, &branch).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].price, 25.5);
        assert_eq!(catalog[0].stock_new, 9);

        cleanup_branch(&pool, &branch).await;
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back_completely() {
        let pool = setup_test_db().await;
        let branch = test_branch("rollback");

        // Postgres rejects NUL bytes in TEXT, so the third row fails inside
        // the transaction after two rows already went through.
        let rows = vec![
            row("A", 10.0, 1),
            row("B", 10.0, 1),
            UploadRow {
                sku: "C".to_string(),
                name: "bad\0name".to_string(),
                price: 10.0,
                rack_number: "R1".to_string(),
                stock_new: 1,
            },
            row("D", 10.0, 1),
            row("E", 10.0, 1),
        ];

        let result = apply_upload(&pool, &branch, &rows).await;
        assert!(result.is_err());

        let catalog = load_catalog(&pool, &branch).await.unwrap();
        assert!(catalog.is_empty(), "rollback left partial rows behind");

        cleanup_branch(&pool, &branch).await;
    }

    #[tokio::test]
    async fn test_compare_against_live_catalog() {
        let pool = setup_test_db().await;
        let branch = test_branch("compare");

        apply_upload(&pool, &branch, &[row("A", 10.0, 1), row("B", 10.0, 1)])
            .await
            .unwrap();

        let batch = [row("B", 10.0, 1), row("C", 10.0, 1)];
        let comparison = classify(load_catalog(&pool, &branch).await.unwrap(), &batch);

        let matched: Vec<&str> = comparison.matched.iter().map(|p| p.sku.as_str()).collect();
        let missing: Vec<&str> = comparison.missing.iter().map(|p| p.sku.as_str()).collect();
        let surplus: Vec<&str> = comparison.surplus.iter().map(|r| r.sku.as_str()).collect();
        assert_eq!(matched, vec!["B"]);
        assert_eq!(missing, vec!["A"]);
        assert_eq!(surplus, vec!["C"]);

        cleanup_branch(&pool, &branch).await;
    }

    #[tokio::test]
    async fn test_delete_blocked_while_referenced_by_box() {
        let pool = setup_test_db().await;
        let branch = test_branch("refdel");

        apply_upload(&pool, &branch, &[row("A", 10.0, 5), row("B", 20.0, 5)])
            .await
            .unwrap();

        let packed = create_box_internal(&pool, "A", &branch)
            .await
            .expect("box create failed");
        sqlx::query(
            "INSERT INTO box_items (box_id, sku, name, quantity, price)
             VALUES ($1, 'A', 'Item A', 2, 10.0)",
        )
        .bind(&packed.id)
        .execute(&pool)
        .await
        .unwrap();

        let blocked = delete_product_internal(&pool, "A", &branch).await;
        assert!(matches!(blocked, Err(AppError::Referential(_))));

        // Unreferenced products delete normally.
        delete_product_internal(&pool, "B", &branch)
            .await
            .expect("unreferenced delete failed");

        let catalog = load_catalog(&pool, &branch).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].sku, "A");

        cleanup_branch(&pool, &branch).await;
    }

    #[tokio::test]
    async fn test_box_numbers_are_monotonic_per_category() {
        let pool = setup_test_db().await;
        let branch = test_branch("boxseq");

        let first = create_box_internal(&pool, "A", &branch).await.unwrap();
        let second = create_box_internal(&pool, "A", &branch).await.unwrap();
        let other_category = create_box_internal(&pool, "B", &branch).await.unwrap();

        assert_eq!(first.number, "A001");
        assert_eq!(second.number, "A002");
        // Sequences are independent per category.
        assert_eq!(other_category.number, "B001");
        assert!(first.id.starts_with("A001-"));

        cleanup_branch(&pool, &branch).await;
    }
}
