use crate::db::{User, ROLES};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{require_role, Claims};
use crate::state::AppState;
use axum::extract::{Extension, Json, Path, State};
use bcrypt::{hash, DEFAULT_COST};
use serde::Deserialize;
use serde_json::{json, Value};

pub async fn get_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<User>>> {
    require_role(&claims, &["admin"])?;

    let users = sqlx::query_as::<_, User>(
        "SELECT id, username, NULL as password_hash, name, role, branch, active, created_at
         FROM users ORDER BY username ASC",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
    pub role: String,
    pub branch: Option<String>,
    pub password: Option<String>,
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<Value>> {
    require_role(&claims, &["admin"])?;

    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("Name and role are required".to_string()));
    }
    if !ROLES.contains(&payload.role.as_str()) {
        return Err(AppError::Validation("Invalid role".to_string()));
    }
    if payload.role == "store" && payload.branch.as_deref().map_or(true, |b| b.trim().is_empty()) {
        return Err(AppError::Validation(
            "Branch is required for store users".to_string(),
        ));
    }

    let result = if let Some(password) = payload.password.filter(|p| !p.trim().is_empty()) {
        let hashed = hash(&password, DEFAULT_COST)?;
        sqlx::query(
            "UPDATE users SET name = $1, role = $2, branch = $3, password_hash = $4 WHERE id = $5",
        )
        .bind(&payload.name)
        .bind(&payload.role)
        .bind(&payload.branch)
        .bind(hashed)
        .bind(&id)
        .execute(&state.pool)
        .await?
    } else {
        sqlx::query("UPDATE users SET name = $1, role = $2, branch = $3 WHERE id = $4")
            .bind(&payload.name)
            .bind(&payload.role)
            .bind(&payload.branch)
            .bind(&id)
            .execute(&state.pool)
            .await?
    };

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(Json(json!({ "message": "User updated successfully" })))
}

/// Soft delete: users are never removed, only marked inactive, so activity
/// log entries keep a valid actor.
pub async fn deactivate_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    require_role(&claims, &["admin"])?;

    let result = sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
        .bind(&id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(Json(json!({ "message": "User deactivated successfully" })))
}
