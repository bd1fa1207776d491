use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use keyhub_db::{LikeOutcome, MAX_FAN_BADGE};
use keyhub_types::api::{Claims, LikeResponse, ToggleLikeRequest};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

/// Like a contributor. Likes are one-way: a repeat is reported, never undone.
pub async fn toggle(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleLikeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let contributor_id = req.contributor_id;
    let outcome = run_db(&state, move |db| db.like_contributor(user_id, contributor_id)).await?;

    match outcome {
        LikeOutcome::Liked { fan_badge_number } => Ok((
            StatusCode::OK,
            Json(LikeResponse {
                success: true,
                message: "Liked!".into(),
                liked: true,
                fan_badge_number: Some(fan_badge_number),
            }),
        )),
        LikeOutcome::AlreadyLiked => Ok((
            StatusCode::CONFLICT,
            Json(LikeResponse {
                success: false,
                message: "You have already liked this contributor".into(),
                liked: true,
                fan_badge_number: None,
            }),
        )),
        LikeOutcome::BadgesExhausted => Err(ApiError::conflict(format!(
            "All fan badges for this contributor have been handed out (max {MAX_FAN_BADGE})"
        ))),
        LikeOutcome::UserNotFound => Err(ApiError::not_found("User not found")),
        LikeOutcome::Banned => Err(ApiError::forbidden("Your account is banned and cannot like contributors")),
        LikeOutcome::ContributorNotFound => Err(ApiError::not_found("Contributor not found")),
    }
}

pub async fn user_likes(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let likes = run_db(&state, move |db| db.user_likes(user_id)).await?;
    Ok(Json(likes))
}
