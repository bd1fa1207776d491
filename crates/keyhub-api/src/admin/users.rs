use axum::{
    Extension, Json,
    extract::State,
    http::header,
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;

use keyhub_types::api::{BanUserRequest, Claims, DeleteUserRequest};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

use super::audit;

pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let users = run_db(&state, |db| db.list_users()).await?;
    Ok(Json(json!({ "success": true, "users": users })))
}

/// Ban or unban. A ban voids the user's claimed key; unbanning does not restore it.
pub async fn ban(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BanUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user_id, banned) = (req.user_id, req.ban);
    let voided = run_db(&state, move |db| db.set_user_banned(user_id, banned))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let (action, message) = if banned {
        (format!("Banned user {user_id} ({voided} keys voided)"), "User banned")
    } else {
        (format!("Unbanned user {user_id}"), "User unbanned")
    };
    audit(&state, &claims, action).await;

    Ok(Json(json!({
        "success": true,
        "message": message,
        "voidedKeys": voided,
    })))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeleteUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = req.user_id;
    let voided = run_db(&state, move |db| db.delete_user(user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    info!("User {} deleted, {} keys voided", user_id, voided);
    audit(&state, &claims, format!("Deleted user {user_id} ({voided} keys voided)")).await;

    Ok(Json(json!({
        "success": true,
        "message": "User deleted",
        "voidedKeys": voided,
    })))
}

fn credentials_csv(rows: &[(i64, String)]) -> String {
    let mut csv = String::from("qq_number,password\n");
    for (id, hash) in rows {
        csv.push_str(&format!("{id},{hash}\n"));
    }
    csv
}

pub async fn export(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = run_db(&state, |db| db.user_credentials()).await?;
    audit(&state, &claims, format!("Exported {} users", rows.len())).await;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"users_export.csv\""),
        ],
        credentials_csv(&rows),
    ))
}
