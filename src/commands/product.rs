use crate::commands::activity::{self, ActivityDetail};
use crate::db::{DbPool, Product};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{ensure_branch_access, require_role, Claims};
use crate::state::AppState;
use axum::extract::{Extension, Json, Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

/// One row of an upload batch, as parsed from the client's CSV.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadRow {
    pub sku: String,
    pub name: String,
    pub price: f64,
    pub rack_number: String,
    #[serde(default)]
    pub stock_new: i32,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub branch: String,
    pub products: Vec<UploadRow>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct UploadSummary {
    pub added: i64,
    pub updated: i64,
}

/// Batch-level validation. All-or-nothing: a single bad row rejects the
/// whole batch before anything is written.
pub fn validate_batch(branch: &str, rows: &[UploadRow]) -> AppResult<()> {
    if branch.trim().is_empty() {
        return Err(AppError::Validation("Branch is required".to_string()));
    }
    if rows.is_empty() {
        return Err(AppError::Validation("Products array is required".to_string()));
    }

    for row in rows {
        if row.sku.trim().is_empty() || row.name.trim().is_empty() || row.rack_number.trim().is_empty() {
            return Err(AppError::Validation(
                "Each product must have SKU, name, price, and rack number".to_string(),
            ));
        }
        if !row.price.is_finite() || row.price <= 0.0 {
            return Err(AppError::Validation(
                "Price must be a positive number".to_string(),
            ));
        }
        if row.stock_new < 0 {
            return Err(AppError::Validation(
                "Stock must be a non-negative number".to_string(),
            ));
        }
    }

    Ok(())
}

/// Applies an upload batch to the catalog of one branch inside a single
/// transaction. Rows are processed in input order: an existing (sku, branch)
/// row is overwritten, anything else is inserted. Any failure rolls back the
/// whole batch.
///
/// Concurrent uploads to the same branch are not coordinated beyond the
/// database's default isolation; the last committed batch wins per SKU.
pub async fn apply_upload(pool: &DbPool, branch: &str, rows: &[UploadRow]) -> AppResult<UploadSummary> {
    let mut tx = pool.begin().await?;
    let mut added: i64 = 0;
    let mut updated: i64 = 0;

    for row in rows {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT sku FROM products WHERE sku = $1 AND branch = $2")
                .bind(&row.sku)
                .bind(branch)
                .fetch_optional(&mut *tx)
                .await?;

        if existing.is_some() {
            sqlx::query(
                "UPDATE products
                 SET name = $1, price = $2, rack_number = $3, stock_new = $4, updated_at = CURRENT_TIMESTAMP
                 WHERE sku = $5 AND branch = $6",
            )
            .bind(&row.name)
            .bind(row.price)
            .bind(&row.rack_number)
            .bind(row.stock_new)
            .bind(&row.sku)
            .bind(branch)
            .execute(&mut *tx)
            .await?;
            updated += 1;
        } else {
            sqlx::query(
                "INSERT INTO products (sku, branch, name, price, rack_number, stock_new)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&row.sku)
            .bind(branch)
            .bind(&row.name)
            .bind(row.price)
            .bind(&row.rack_number)
            .bind(row.stock_new)
            .execute(&mut *tx)
            .await?;
            added += 1;
        }
    }

    tx.commit().await?;
    Ok(UploadSummary { added, updated })
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Comparison {
    pub matched: Vec<Product>,
    pub missing: Vec<Product>,
    pub surplus: Vec<UploadRow>,
}

/// Partitions catalog and batch into three disjoint sets keyed by SKU:
/// matched (both), missing (catalog only), surplus (batch only). Each list
/// is sorted by SKU so the result is deterministic.
pub fn classify(catalog: Vec<Product>, batch: &[UploadRow]) -> Comparison {
    let batch_skus: HashSet<&str> = batch.iter().map(|r| r.sku.as_str()).collect();
    let catalog_skus: HashSet<String> = catalog.iter().map(|p| p.sku.clone()).collect();

    let mut matched = Vec::new();
    let mut missing = Vec::new();
    for product in catalog {
        if batch_skus.contains(product.sku.as_str()) {
            matched.push(product);
        } else {
            missing.push(product);
        }
    }

    let mut surplus: Vec<UploadRow> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for row in batch {
        if !catalog_skus.contains(row.sku.as_str()) && seen.insert(row.sku.as_str()) {
            surplus.push(row.clone());
        }
    }

    matched.sort_by(|a, b| a.sku.cmp(&b.sku));
    missing.sort_by(|a, b| a.sku.cmp(&b.sku));
    surplus.sort_by(|a, b| a.sku.cmp(&b.sku));

    Comparison {
        matched,
        missing,
        surplus,
    }
}

pub async fn load_catalog(pool: &DbPool, branch: &str) -> AppResult<Vec<Product>> {
    Ok(sqlx::query_as::<_, Product>(
        "SELECT sku, branch, name, price, rack_number, stock_new, updated_at
         FROM products WHERE branch = $1 ORDER BY sku",
    )
    .bind(branch)
    .fetch_all(pool)
    .await?)
}

// ---- HTTP handlers ----

#[derive(Debug, Deserialize)]
pub struct BranchQuery {
    pub branch: Option<String>,
}

pub async fn get_products(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<BranchQuery>,
) -> AppResult<Json<Vec<Product>>> {
    let branch = if claims.role == "store" {
        claims.branch.clone()
    } else {
        params.branch
    };

    let products = sqlx::query_as::<_, Product>(
        "SELECT sku, branch, name, price, rack_number, stock_new, updated_at
         FROM products WHERE ($1::text IS NULL OR branch = $1) ORDER BY sku",
    )
    .bind(branch)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(products))
}

pub async fn get_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(sku): Path<String>,
    Query(params): Query<BranchQuery>,
) -> AppResult<Json<Product>> {
    let branch = params
        .branch
        .ok_or_else(|| AppError::Validation("Branch is required".to_string()))?;
    ensure_branch_access(&claims, &branch)?;

    let product = sqlx::query_as::<_, Product>(
        "SELECT sku, branch, name, price, rack_number, stock_new, updated_at
         FROM products WHERE sku = $1 AND branch = $2",
    )
    .bind(&sku)
    .bind(&branch)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    Ok(Json(product))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub price: f64,
    pub rack_number: String,
    pub branch: String,
    #[serde(default)]
    pub stock_new: i32,
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateProductRequest>,
) -> AppResult<Json<Value>> {
    require_role(&claims, &["admin"])?;

    let row = UploadRow {
        sku: payload.sku.clone(),
        name: payload.name.clone(),
        price: payload.price,
        rack_number: payload.rack_number.clone(),
        stock_new: payload.stock_new,
    };
    validate_batch(&payload.branch, std::slice::from_ref(&row))?;

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT sku FROM products WHERE sku = $1 AND branch = $2")
            .bind(&payload.sku)
            .bind(&payload.branch)
            .fetch_optional(&state.pool)
            .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(
            "SKU already exists in this branch".to_string(),
        ));
    }

    sqlx::query(
        "INSERT INTO products (sku, branch, name, price, rack_number, stock_new)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&payload.sku)
    .bind(&payload.branch)
    .bind(&payload.name)
    .bind(payload.price)
    .bind(&payload.rack_number)
    .bind(payload.stock_new)
    .execute(&state.pool)
    .await?;

    activity::record(
        &state.pool,
        &claims.username,
        &payload.branch,
        &ActivityDetail::ProductCreated { sku: payload.sku },
    )
    .await;

    Ok(Json(json!({ "message": "Product created successfully" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: String,
    pub price: f64,
    pub rack_number: String,
    pub branch: String,
    #[serde(default)]
    pub stock_new: i32,
}

pub async fn update_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(sku): Path<String>,
    Json(payload): Json<UpdateProductRequest>,
) -> AppResult<Json<Value>> {
    require_role(&claims, &["admin"])?;

    let row = UploadRow {
        sku: sku.clone(),
        name: payload.name.clone(),
        price: payload.price,
        rack_number: payload.rack_number.clone(),
        stock_new: payload.stock_new,
    };
    validate_batch(&payload.branch, std::slice::from_ref(&row))?;

    let result = sqlx::query(
        "UPDATE products
         SET name = $1, price = $2, rack_number = $3, stock_new = $4, updated_at = CURRENT_TIMESTAMP
         WHERE sku = $5 AND branch = $6",
    )
    .bind(&payload.name)
    .bind(payload.price)
    .bind(&payload.rack_number)
    .bind(payload.stock_new)
    .bind(&sku)
    .bind(&payload.branch)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    activity::record(
        &state.pool,
        &claims.username,
        &payload.branch,
        &ActivityDetail::ProductUpdated { sku },
    )
    .await;

    Ok(Json(json!({ "message": "Product updated successfully" })))
}

/// Deletes a product unless any box item in the branch still references its
/// SKU; referenced products are soft-blocked from deletion so box items keep
/// pointing at a live catalog row.
pub async fn delete_product_internal(pool: &DbPool, sku: &str, branch: &str) -> AppResult<()> {
    let (referenced,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM box_items bi
         JOIN boxes b ON b.id = bi.box_id
         WHERE bi.sku = $1 AND b.branch = $2",
    )
    .bind(sku)
    .bind(branch)
    .fetch_one(pool)
    .await?;

    if referenced > 0 {
        return Err(AppError::Referential(
            "Cannot delete product that is referenced in boxes".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM products WHERE sku = $1 AND branch = $2")
        .bind(sku)
        .bind(branch)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    Ok(())
}

pub async fn delete_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(sku): Path<String>,
    Query(params): Query<BranchQuery>,
) -> AppResult<Json<Value>> {
    require_role(&claims, &["admin"])?;

    let branch = params
        .branch
        .ok_or_else(|| AppError::Validation("Branch is required".to_string()))?;

    delete_product_internal(&state.pool, &sku, &branch).await?;

    activity::record(
        &state.pool,
        &claims.username,
        &branch,
        &ActivityDetail::ProductDeleted { sku },
    )
    .await;

    Ok(Json(json!({ "message": "Product deleted successfully" })))
}

pub async fn upload_products(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UploadRequest>,
) -> AppResult<Json<UploadSummary>> {
    require_role(&claims, &["admin"])?;
    ensure_branch_access(&claims, &payload.branch)?;
    validate_batch(&payload.branch, &payload.products)?;

    let summary = apply_upload(&state.pool, &payload.branch, &payload.products).await?;

    tracing::info!(
        branch = %payload.branch,
        added = summary.added,
        updated = summary.updated,
        "Applied upload batch"
    );

    activity::record(
        &state.pool,
        &claims.username,
        &payload.branch,
        &ActivityDetail::CsvUpload {
            added: summary.added,
            updated: summary.updated,
        },
    )
    .await;

    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub branch: String,
    pub products: Vec<UploadRow>,
}

/// Read-only comparison of an upload batch against the current catalog.
/// The batch travels in the request body rather than being remembered from
/// the previous upload, so the result depends only on its inputs.
pub async fn compare_inventory(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CompareRequest>,
) -> AppResult<Json<Comparison>> {
    if payload.branch.trim().is_empty() {
        return Err(AppError::Validation("Branch is required".to_string()));
    }
    ensure_branch_access(&claims, &payload.branch)?;

    let catalog = load_catalog(&state.pool, &payload.branch).await?;
    Ok(Json(classify(catalog, &payload.products)))
}
