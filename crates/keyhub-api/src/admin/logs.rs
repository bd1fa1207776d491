use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde_json::json;

use keyhub_db::AuditLogFilter;
use keyhub_types::api::{Claims, LogQuery};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

use super::audit;

const MAX_PAGE_SIZE: u32 = 100;

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn build_filter(query: LogQuery) -> Result<AuditLogFilter, ApiError> {
    let date = non_empty(query.date)
        .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
        .transpose()
        .map_err(|_| ApiError::bad_request("Date must be formatted as YYYY-MM-DD"))?;

    let defaults = AuditLogFilter::default();
    Ok(AuditLogFilter {
        search: non_empty(query.search),
        date,
        admin: non_empty(query.admin),
        page: query.page.unwrap_or(defaults.page).max(1),
        limit: query.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
    })
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = build_filter(query)?;
    let (page, limit) = (filter.page, filter.limit);
    let result = run_db(&state, move |db| db.query_audit_logs(&filter)).await?;

    let total_pages = (result.total + i64::from(limit) - 1) / i64::from(limit);
    Ok(Json(json!({
        "success": true,
        "logs": result.logs,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": result.total,
            "totalPages": total_pages,
        }
    })))
}

/// Wipe the log. The purge itself is recorded as the first entry of the new log.
pub async fn clear(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let cleared = run_db(&state, |db| db.clear_audit_logs()).await?;
    audit(&state, &claims, format!("Cleared {cleared} audit log entries")).await;

    Ok(Json(json!({
        "success": true,
        "message": format!("Cleared {cleared} log entries"),
        "cleared": cleared,
    })))
}
