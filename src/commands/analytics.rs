use crate::error::{AppError, AppResult};
use crate::middleware::auth::Claims;
use crate::state::AppState;
use axum::extract::{Extension, Query, State};
use axum::Json;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodBounds {
    pub current_start: NaiveDateTime,
    pub previous_start: NaiveDateTime,
    pub previous_end: NaiveDateTime,
}

/// Period boundaries for the trend comparison. All boundaries are derived
/// from the one `now` passed in; `now` itself is never mutated, so the
/// current and previous windows always line up back to back.
pub fn period_bounds(now: NaiveDateTime, timeframe: &str) -> AppResult<PeriodBounds> {
    let span = match timeframe {
        "day" => Duration::days(1),
        "week" => Duration::days(7),
        "month" => Duration::days(30),
        other => {
            return Err(AppError::Validation(format!(
                "Invalid timeframe: {}",
                other
            )))
        }
    };

    let current_start = now - span;
    Ok(PeriodBounds {
        current_start,
        previous_start: current_start - span,
        previous_end: current_start,
    })
}

/// Percentage change of refill activity against the previous period.
/// None when the previous period had no refills: there is no baseline to
/// compare against.
pub fn refill_trend(current: i64, previous: i64) -> Option<f64> {
    if previous == 0 {
        return None;
    }
    Some((current - previous) as f64 / previous as f64 * 100.0)
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct DailyActivity {
    pub date: String,
    pub refills: i64,
    pub new_items: i64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub total_boxes: i64,
    pub total_items: i64,
    pub refills_today: i64,
    pub refill_trend: Option<f64>,
    pub weekly: Vec<DailyActivity>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub branch: Option<String>,
    pub timeframe: Option<String>,
}

pub async fn get_summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<SummaryQuery>,
) -> AppResult<Json<AnalyticsSummary>> {
    let branch = if claims.role == "store" {
        claims.branch.clone()
    } else {
        params.branch
    };

    let timeframe = params.timeframe.as_deref().unwrap_or("week");
    let now = chrono::Local::now().naive_local();
    let bounds = period_bounds(now, timeframe)?;
    let today_start = now.date().and_hms_opt(0, 0, 0).unwrap_or(now);

    let (total_boxes, total_items): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(DISTINCT b.id), CAST(COALESCE(SUM(bi.quantity), 0) AS BIGINT)
         FROM boxes b
         LEFT JOIN box_items bi ON b.id = bi.box_id
         WHERE ($1::text IS NULL OR b.branch = $1)",
    )
    .bind(&branch)
    .fetch_one(&state.pool)
    .await?;

    let (refills_today, current_refills, previous_refills): (i64, i64, i64) = sqlx::query_as(
        "SELECT
            COUNT(*) FILTER (WHERE created_at >= $2),
            COUNT(*) FILTER (WHERE created_at >= $3),
            COUNT(*) FILTER (WHERE created_at >= $4 AND created_at < $5)
         FROM activity_logs
         WHERE action = 'refill' AND ($1::text IS NULL OR branch = $1)",
    )
    .bind(&branch)
    .bind(today_start)
    .bind(bounds.current_start)
    .bind(bounds.previous_start)
    .bind(bounds.previous_end)
    .fetch_one(&state.pool)
    .await?;

    let weekly = sqlx::query_as::<_, DailyActivity>(
        "SELECT
            to_char(created_at::date, 'YYYY-MM-DD') as date,
            COUNT(*) FILTER (WHERE action = 'refill') as refills,
            COUNT(*) FILTER (WHERE action = 'input') as new_items
         FROM activity_logs
         WHERE created_at >= $2 AND ($1::text IS NULL OR branch = $1)
         GROUP BY created_at::date
         ORDER BY created_at::date",
    )
    .bind(&branch)
    .bind(now - Duration::days(7))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(AnalyticsSummary {
        total_boxes,
        total_items,
        refills_today,
        refill_trend: refill_trend(current_refills, previous_refills),
        weekly,
    }))
}
