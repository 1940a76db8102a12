use crate::db::{ActivityLog, DbPool};
use crate::error::AppResult;
use crate::middleware::auth::Claims;
use crate::state::AppState;
use axum::extract::{Extension, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Structured payload for an activity log entry, keyed by action kind.
/// Serialized into the JSONB `details` column so consumers never have to
/// parse free-form text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityDetail {
    Login,
    CsvUpload {
        added: i64,
        updated: i64,
    },
    ProductCreated {
        sku: String,
    },
    ProductUpdated {
        sku: String,
    },
    ProductDeleted {
        sku: String,
    },
    BoxCreated {
        box_id: String,
    },
    Refill {
        box_id: String,
        sku: String,
        quantity: i32,
    },
}

impl ActivityDetail {
    pub fn action(&self) -> &'static str {
        match self {
            ActivityDetail::Login => "login",
            ActivityDetail::CsvUpload { .. } => "csv_upload",
            ActivityDetail::ProductCreated { .. } => "input",
            ActivityDetail::ProductUpdated { .. } => "update",
            ActivityDetail::ProductDeleted { .. } => "delete",
            ActivityDetail::BoxCreated { .. } => "box_created",
            ActivityDetail::Refill { .. } => "refill",
        }
    }

    pub fn sku(&self) -> Option<&str> {
        match self {
            ActivityDetail::ProductCreated { sku }
            | ActivityDetail::ProductUpdated { sku }
            | ActivityDetail::ProductDeleted { sku }
            | ActivityDetail::Refill { sku, .. } => Some(sku),
            _ => None,
        }
    }
}

/// Appends one entry to the activity log. Best-effort: the log write is not
/// atomic with the operation it describes, and a failure here must never
/// fail the request.
pub async fn record(pool: &DbPool, username: &str, branch: &str, detail: &ActivityDetail) {
    let details = serde_json::to_value(detail).unwrap_or(serde_json::Value::Null);

    let result = sqlx::query(
        "INSERT INTO activity_logs (id, username, branch, action, details, sku)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(username)
    .bind(branch)
    .bind(detail.action())
    .bind(details)
    .bind(detail.sku())
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!("Failed to record activity ({}): {}", detail.action(), e);
    }
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub branch: Option<String>,
    pub action: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_activities(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ActivityQuery>,
) -> AppResult<Json<Vec<ActivityLog>>> {
    // Store users only ever see their own branch.
    let branch = if claims.role == "store" {
        claims.branch.clone()
    } else {
        params.branch
    };

    let limit = params.limit.unwrap_or(100).clamp(1, 500);

    let logs = sqlx::query_as::<_, ActivityLog>(
        "SELECT id, username, branch, action, details, sku, created_at
         FROM activity_logs
         WHERE ($1::text IS NULL OR branch = $1)
           AND ($2::text IS NULL OR action = $2)
         ORDER BY created_at DESC
         LIMIT $3",
    )
    .bind(branch)
    .bind(params.action)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(logs))
}
