use crate::commands::activity::{self, ActivityDetail};
use crate::db::{BoxItem, DbPool, StorageBox, BOX_CATEGORIES};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{ensure_branch_access, Claims};
use crate::state::AppState;
use axum::extract::{Extension, Json, Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

#[derive(Debug, Serialize)]
pub struct BoxView {
    pub id: String,
    pub category: String,
    pub number: String,
    pub branch: String,
    pub items: Vec<BoxItem>,
}

#[derive(Debug, FromRow)]
struct BoxJoinRow {
    id: String,
    category: String,
    number: String,
    branch: String,
    sku: Option<String>,
    name: Option<String>,
    quantity: Option<i32>,
    price: Option<f64>,
}

fn group_boxes(rows: Vec<BoxJoinRow>) -> Vec<BoxView> {
    let mut boxes: Vec<BoxView> = Vec::new();
    for row in rows {
        let idx = match boxes.iter().position(|b| b.id == row.id) {
            Some(i) => i,
            None => {
                boxes.push(BoxView {
                    id: row.id.clone(),
                    category: row.category,
                    number: row.number,
                    branch: row.branch,
                    items: Vec::new(),
                });
                boxes.len() - 1
            }
        };

        if let Some(sku) = row.sku {
            boxes[idx].items.push(BoxItem {
                sku,
                name: row.name.unwrap_or_default(),
                quantity: row.quantity.unwrap_or(0),
                price: row.price.unwrap_or(0.0),
            });
        }
    }
    boxes
}

/// Computes the next box number within (branch, category): "A001", "A002", ...
/// Falls back to 1 when the latest number does not parse.
pub fn next_box_number(category: &str, last_number: Option<&str>) -> String {
    let next = match last_number {
        Some(last) => parse_box_sequence(last).map(|n| n + 1).unwrap_or(1),
        None => 1,
    };
    format!("{}{:03}", category, next)
}

pub fn parse_box_sequence(number: &str) -> Option<u32> {
    number
        .strip_prefix(|c: char| c.is_ascii_uppercase())
        .and_then(|digits| digits.parse::<u32>().ok())
}

pub fn make_box_id(number: &str, branch: &str) -> String {
    format!("{}-{}", number, branch.split_whitespace().collect::<String>())
}

#[derive(Debug, Deserialize)]
pub struct BranchQuery {
    pub branch: Option<String>,
}

pub async fn get_boxes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<BranchQuery>,
) -> AppResult<Json<Vec<BoxView>>> {
    let branch = if claims.role == "store" {
        claims.branch.clone()
    } else {
        params.branch
    };

    let rows = sqlx::query_as::<_, BoxJoinRow>(
        "SELECT b.id, b.category, b.number, b.branch, bi.sku, bi.name, bi.quantity, bi.price
         FROM boxes b
         LEFT JOIN box_items bi ON b.id = bi.box_id
         WHERE ($1::text IS NULL OR b.branch = $1)
         ORDER BY b.id, bi.sku",
    )
    .bind(branch)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(group_boxes(rows)))
}

pub async fn get_box(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> AppResult<Json<BoxView>> {
    let rows = sqlx::query_as::<_, BoxJoinRow>(
        "SELECT b.id, b.category, b.number, b.branch, bi.sku, bi.name, bi.quantity, bi.price
         FROM boxes b
         LEFT JOIN box_items bi ON b.id = bi.box_id
         WHERE b.id = $1
         ORDER BY bi.sku",
    )
    .bind(&id)
    .fetch_all(&state.pool)
    .await?;

    let boxes = group_boxes(rows);
    let found = boxes
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound("Box not found".to_string()))?;
    ensure_branch_access(&claims, &found.branch)?;

    Ok(Json(found))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub sku: String,
    pub branch: Option<String>,
}

pub async fn search_boxes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<Vec<BoxView>>> {
    let branch = if claims.role == "store" {
        claims.branch.clone()
    } else {
        params.branch
    };

    let rows = sqlx::query_as::<_, BoxJoinRow>(
        "SELECT b.id, b.category, b.number, b.branch, bi.sku, bi.name, bi.quantity, bi.price
         FROM boxes b
         JOIN box_items bi ON b.id = bi.box_id
         WHERE bi.sku LIKE $1 AND ($2::text IS NULL OR b.branch = $2)
         ORDER BY b.id, bi.sku",
    )
    .bind(format!("%{}%", params.sku))
    .bind(branch)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(group_boxes(rows)))
}

#[derive(Debug, Deserialize)]
pub struct CreateBoxRequest {
    pub category: String,
    pub branch: String,
}

/// Creates a box with the next sequence number for (branch, category). The
/// number is derived from the latest row inside the same transaction as the
/// insert; the unique index on (branch, category, number) catches a
/// concurrent create of the same number.
pub async fn create_box_internal(
    pool: &DbPool,
    category: &str,
    branch: &str,
) -> AppResult<StorageBox> {
    if !BOX_CATEGORIES.contains(&category) {
        return Err(AppError::Validation("Invalid box category".to_string()));
    }
    if branch.trim().is_empty() {
        return Err(AppError::Validation("Branch is required".to_string()));
    }

    let mut tx = pool.begin().await?;

    let last: Option<(String,)> = sqlx::query_as(
        "SELECT number FROM boxes WHERE branch = $1 AND category = $2
         ORDER BY number DESC LIMIT 1",
    )
    .bind(branch)
    .bind(category)
    .fetch_optional(&mut *tx)
    .await?;

    let number = next_box_number(category, last.as_ref().map(|(n,)| n.as_str()));
    let id = make_box_id(&number, branch);

    sqlx::query("INSERT INTO boxes (id, category, number, branch) VALUES ($1, $2, $3, $4)")
        .bind(&id)
        .bind(category)
        .bind(&number)
        .bind(branch)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(StorageBox {
        id,
        category: category.to_string(),
        number,
        branch: branch.to_string(),
        created_at: None,
    })
}

pub async fn create_box(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateBoxRequest>,
) -> AppResult<Json<StorageBox>> {
    ensure_branch_access(&claims, &payload.branch)?;

    let created = create_box_internal(&state.pool, &payload.category, &payload.branch).await?;

    activity::record(
        &state.pool,
        &claims.username,
        &payload.branch,
        &ActivityDetail::BoxCreated {
            box_id: created.id.clone(),
        },
    )
    .await;

    Ok(Json(created))
}

pub async fn delete_box(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let branch = box_branch(&state.pool, &id).await?;
    ensure_branch_access(&claims, &branch)?;

    // Items cascade with the box row.
    sqlx::query("DELETE FROM boxes WHERE id = $1")
        .bind(&id)
        .execute(&state.pool)
        .await?;

    Ok(Json(json!({ "message": "Box deleted successfully" })))
}

async fn box_branch(pool: &DbPool, box_id: &str) -> AppResult<String> {
    let row: Option<(String,)> = sqlx::query_as("SELECT branch FROM boxes WHERE id = $1")
        .bind(box_id)
        .fetch_optional(pool)
        .await?;
    row.map(|(b,)| b)
        .ok_or_else(|| AppError::NotFound("Box not found".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub sku: String,
    pub quantity: i32,
}

/// Packs a product into a box. The product must exist in the box's branch;
/// its name and price are snapshotted at packing time. Re-adding the same
/// SKU accumulates quantity on the existing item.
pub async fn add_item_to_box(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<AddItemRequest>,
) -> AppResult<Json<Value>> {
    if payload.quantity <= 0 {
        return Err(AppError::Validation(
            "Quantity must be a positive number".to_string(),
        ));
    }

    let branch = box_branch(&state.pool, &id).await?;
    ensure_branch_access(&claims, &branch)?;

    let mut tx = state.pool.begin().await?;

    let product: Option<(String, f64)> =
        sqlx::query_as("SELECT name, price FROM products WHERE sku = $1 AND branch = $2")
            .bind(&payload.sku)
            .bind(&branch)
            .fetch_optional(&mut *tx)
            .await?;

    let (name, price) = product.ok_or_else(|| {
        AppError::Validation(format!("Unknown SKU {} in branch {}", payload.sku, branch))
    })?;

    let existing: Option<(i32,)> =
        sqlx::query_as("SELECT quantity FROM box_items WHERE box_id = $1 AND sku = $2")
            .bind(&id)
            .bind(&payload.sku)
            .fetch_optional(&mut *tx)
            .await?;

    if existing.is_some() {
        sqlx::query(
            "UPDATE box_items SET quantity = quantity + $1 WHERE box_id = $2 AND sku = $3",
        )
        .bind(payload.quantity)
        .bind(&id)
        .bind(&payload.sku)
        .execute(&mut *tx)
        .await?;
    } else {
        sqlx::query(
            "INSERT INTO box_items (box_id, sku, name, quantity, price)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&id)
        .bind(&payload.sku)
        .bind(&name)
        .bind(payload.quantity)
        .bind(price)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    activity::record(
        &state.pool,
        &claims.username,
        &branch,
        &ActivityDetail::Refill {
            box_id: id,
            sku: payload.sku,
            quantity: payload.quantity,
        },
    )
    .await;

    Ok(Json(json!({ "message": "Item added to box" })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

/// Sets an item's quantity. A quantity of zero or below removes the row;
/// box items never linger at zero.
pub async fn update_item_quantity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, sku)): Path<(String, String)>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> AppResult<Json<Value>> {
    let branch = box_branch(&state.pool, &id).await?;
    ensure_branch_access(&claims, &branch)?;

    if payload.quantity > 0 {
        let result = sqlx::query(
            "UPDATE box_items SET quantity = $1 WHERE box_id = $2 AND sku = $3",
        )
        .bind(payload.quantity)
        .bind(&id)
        .bind(&sku)
        .execute(&state.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Box item not found".to_string()));
        }
    } else {
        sqlx::query("DELETE FROM box_items WHERE box_id = $1 AND sku = $2")
            .bind(&id)
            .bind(&sku)
            .execute(&state.pool)
            .await?;
    }

    Ok(Json(json!({ "message": "Item quantity updated" })))
}

pub async fn remove_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, sku)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let branch = box_branch(&state.pool, &id).await?;
    ensure_branch_access(&claims, &branch)?;

    sqlx::query("DELETE FROM box_items WHERE box_id = $1 AND sku = $2")
        .bind(&id)
        .bind(&sku)
        .execute(&state.pool)
        .await?;

    Ok(Json(json!({ "message": "Item removed from box" })))
}
