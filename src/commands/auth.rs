use crate::commands::activity::{self, ActivityDetail};
use crate::db::{User, ROLES};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::issue_token;
use crate::state::AppState;
use axum::extract::{Json, State};
use bcrypt::{hash, verify, DEFAULT_COST};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub name: String,
    pub role: String,
    pub branch: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::Validation(
            "Username and password are required".to_string(),
        ));
    }

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, name, role, branch, active, created_at
         FROM users WHERE username = $1 AND active = TRUE",
    )
    .bind(&payload.username)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::Auth("Invalid credentials".to_string()))?;

    let password_hash = user
        .password_hash
        .as_deref()
        .ok_or_else(|| AppError::Auth("Invalid credentials".to_string()))?;

    if !verify(&payload.password, password_hash)? {
        return Err(AppError::Auth("Invalid credentials".to_string()));
    }

    let token = issue_token(&user.id, &user.username, &user.role, user.branch.as_deref())?;

    activity::record(
        &state.pool,
        &user.username,
        user.branch.as_deref().unwrap_or(""),
        &ActivityDetail::Login,
    )
    .await;

    Ok(Json(LoginResponse {
        token,
        user: PublicUser {
            id: user.id,
            username: user.username,
            name: user.name,
            role: user.role,
            branch: user.branch,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub name: String,
    pub role: String,
    pub branch: Option<String>,
}

pub fn validate_register(payload: &RegisterRequest) -> AppResult<()> {
    if payload.username.trim().is_empty()
        || payload.password.is_empty()
        || payload.name.trim().is_empty()
    {
        return Err(AppError::Validation("All fields are required".to_string()));
    }

    if payload.password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters long".to_string(),
        ));
    }

    if !ROLES.contains(&payload.role.as_str()) {
        return Err(AppError::Validation("Invalid role".to_string()));
    }

    if payload.role == "store" && payload.branch.as_deref().map_or(true, |b| b.trim().is_empty()) {
        return Err(AppError::Validation(
            "Branch is required for store users".to_string(),
        ));
    }

    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<Value>> {
    validate_register(&payload)?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE username = $1")
        .bind(&payload.username)
        .fetch_optional(&state.pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict("Username already exists".to_string()));
    }

    let hashed = hash(&payload.password, DEFAULT_COST)?;

    sqlx::query(
        "INSERT INTO users (id, username, password_hash, name, role, branch, active)
         VALUES ($1, $2, $3, $4, $5, $6, TRUE)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&payload.username)
    .bind(hashed)
    .bind(&payload.name)
    .bind(&payload.role)
    .bind(&payload.branch)
    .execute(&state.pool)
    .await?;

    Ok(Json(json!({ "message": "User registered successfully" })))
}
