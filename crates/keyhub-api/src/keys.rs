use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::info;

use keyhub_db::ClaimOutcome;
use keyhub_types::api::{ClaimKeyResponse, Claims};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

pub async fn claim(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let outcome = run_db(&state, move |db| db.claim_key(user_id)).await?;

    match outcome {
        ClaimOutcome::Claimed(key) => {
            info!("User {} claimed a key", user_id);
            Ok(Json(ClaimKeyResponse {
                success: true,
                message: "Key claimed successfully".into(),
                key,
            }))
        }
        ClaimOutcome::UserNotFound => Err(ApiError::not_found("User not found")),
        ClaimOutcome::Banned => Err(ApiError::forbidden("Your account is banned and cannot claim a key")),
        ClaimOutcome::NotWhitelisted => Err(ApiError::forbidden(
            "Your QQ number is not on the whitelist. Please ask an administrator to add it.",
        )),
        ClaimOutcome::AlreadyClaimed(_) => Err(ApiError::bad_request("You have already claimed a key")),
        ClaimOutcome::NoKeysAvailable => Err(ApiError::not_found(
            "No keys are available right now, please contact an administrator",
        )),
    }
}
