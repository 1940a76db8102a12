use bcrypt::{hash, DEFAULT_COST};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{FromRow, Pool, Postgres};
use std::str::FromStr;

use crate::error::{AppError, AppResult};

pub type DbPool = Pool<Postgres>;

pub async fn init_pool_with_options(opts: PgConnectOptions) -> AppResult<DbPool> {
    // connect_lazy_with returns immediately; connections are validated on first use.
    Ok(PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .idle_timeout(std::time::Duration::from_secs(120))
        .connect_lazy_with(opts))
}

pub async fn init_pool(database_url: &str) -> AppResult<DbPool> {
    let opts = PgConnectOptions::from_str(database_url)
        .map_err(|e| AppError::Internal(format!("Invalid DB URL: {}", e)))?
        .ssl_mode(PgSslMode::Prefer);

    init_pool_with_options(opts).await
}

pub async fn init_database(pool: &DbPool) -> AppResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;

    if let Err(e) = ensure_seeds(pool).await {
        tracing::warn!("Seeding skipped: {}", e);
    }

    tracing::info!("Database ready");
    Ok(())
}

/// Seeds a default admin account on an empty users table so a fresh install
/// is reachable. The password must be changed after first login.
async fn ensure_seeds(pool: &DbPool) -> AppResult<()> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if count == 0 {
        let hashed = hash("admin12345", DEFAULT_COST)?;
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, name, role, branch, active)
             VALUES ($1, 'admin', $2, 'Administrator', 'admin', NULL, TRUE)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(hashed)
        .execute(pool)
        .await?;
        tracing::info!("Seeded default admin user");
    }

    Ok(())
}

pub const ROLES: [&str; 3] = ["store", "manager", "admin"];
pub const BOX_CATEGORIES: [&str; 3] = ["A", "B", "C"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub name: String,
    pub role: String,
    pub branch: Option<String>,
    pub active: bool,
    #[sqlx(default)]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub sku: String,
    pub branch: String,
    pub name: String,
    pub price: f64,
    pub rack_number: String,
    pub stock_new: i32,
    #[sqlx(default)]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StorageBox {
    pub id: String,
    pub category: String,
    pub number: String,
    pub branch: String,
    #[sqlx(default)]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BoxItem {
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityLog {
    pub id: String,
    pub username: String,
    pub branch: String,
    pub action: String,
    pub details: serde_json::Value,
    pub sku: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}
