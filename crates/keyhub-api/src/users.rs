use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use keyhub_types::api::{Claims, ValidateUserResponse};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

/// Refresh the signed-in user's profile. A deleted account is reported as
/// `userDeleted` so the client can drop its session.
pub async fn validate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let user = run_db(&state, move |db| {
        let Some(row) = db.get_user(user_id)? else {
            return Ok(None);
        };
        let key = db.claimed_key_for(user_id)?;
        Ok(Some(row.into_user(key)))
    })
    .await?;

    let response = match user {
        Some(user) => (
            StatusCode::OK,
            Json(ValidateUserResponse {
                success: true,
                user: Some(user),
                user_deleted: false,
                message: None,
            }),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(ValidateUserResponse {
                success: false,
                user: None,
                user_deleted: true,
                message: Some("This account has been deleted".into()),
            }),
        ),
    };
    Ok(response)
}
