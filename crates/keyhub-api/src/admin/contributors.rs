use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use keyhub_db::ContributorUpdate;
use keyhub_types::api::{AdjustPointsRequest, Claims, ContributorRequest, EditContributorRequest};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

use super::audit;

/// Trimmed nickname and avatar. Negative starting points are floored to zero.
fn validate_profile(nickname: &str, avatar_url: &str, points: i64) -> Result<(String, String, i64), ApiError> {
    let nickname = nickname.trim();
    let avatar_url = avatar_url.trim();
    if nickname.is_empty() {
        return Err(ApiError::bad_request("Nickname is required"));
    }
    if avatar_url.is_empty() {
        return Err(ApiError::bad_request("Avatar URL is required"));
    }
    Ok((nickname.to_string(), avatar_url.to_string(), points.max(0)))
}

pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let contributors = run_db(&state, |db| db.list_contributors()).await?;
    Ok(Json(json!({ "success": true, "contributors": contributors })))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ContributorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (nickname, avatar_url, points) = validate_profile(&req.nickname, &req.avatar_url, req.points)?;

    let contributor = run_db(&state, move |db| db.create_contributor(&nickname, &avatar_url, points))
        .await?
        .ok_or_else(|| ApiError::conflict("A contributor with this nickname already exists"))?;
    audit(&state, &claims, format!("Added contributor {}", contributor.nickname)).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Contributor added",
            "contributor": contributor,
        })),
    ))
}

pub async fn edit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditContributorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (nickname, avatar_url, points) = validate_profile(&req.nickname, &req.avatar_url, req.points)?;
    let id = req.id;

    let outcome = run_db(&state, move |db| db.update_contributor(id, &nickname, &avatar_url, points)).await?;
    match outcome {
        ContributorUpdate::Updated {
            previous_nickname,
            contributor,
        } => {
            let action = if previous_nickname == contributor.nickname {
                format!("Edited contributor {}", contributor.nickname)
            } else {
                format!("Edited contributor {} (renamed to {})", previous_nickname, contributor.nickname)
            };
            audit(&state, &claims, action).await;
            Ok(Json(json!({
                "success": true,
                "message": "Contributor updated",
                "contributor": contributor,
            })))
        }
        ContributorUpdate::NotFound => Err(ApiError::not_found("Contributor not found")),
        ContributorUpdate::NicknameTaken => Err(ApiError::conflict("A contributor with this nickname already exists")),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = run_db(&state, move |db| db.delete_contributor(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Contributor not found"))?;
    audit(&state, &claims, format!("Deleted contributor {}", removed.nickname)).await;

    Ok(Json(json!({ "success": true, "message": "Contributor deleted" })))
}

/// Add or subtract points. The balance never drops below zero.
pub async fn adjust_points(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<AdjustPointsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.adjustment == 0 {
        return Err(ApiError::bad_request("Adjustment cannot be zero"));
    }
    let delta = req.adjustment;

    let change = run_db(&state, move |db| db.adjust_points(id, delta))
        .await?
        .ok_or_else(|| ApiError::not_found("Contributor not found"))?;
    audit(
        &state,
        &claims,
        format!(
            "Adjusted points of {} by {:+} ({} -> {})",
            change.nickname, delta, change.old_points, change.new_points
        ),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Points updated",
        "oldPoints": change.old_points,
        "newPoints": change.new_points,
    })))
}

pub async fn reset_likes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = run_db(&state, |db| db.reset_likes()).await?;
    audit(&state, &claims, format!("Reset all likes ({removed} removed)")).await;

    Ok(Json(json!({
        "success": true,
        "message": "All likes have been reset",
        "removed": removed,
    })))
}
