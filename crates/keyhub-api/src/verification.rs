use axum::{Json, extract::State, response::IntoResponse};
use rand::Rng;
use serde_json::json;
use tracing::info;

use keyhub_mail::CODE_TTL_MINUTES;
use keyhub_types::api::SendVerificationRequest;

use crate::error::ApiError;
use crate::state::{AppState, run_db};
use crate::validate::{parse_qq, qq_email};

fn generate_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

pub async fn send_verification(
    State(state): State<AppState>,
    Json(req): Json<SendVerificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let qq = parse_qq(&req.qq).ok_or_else(|| ApiError::bad_request("Please enter a valid QQ number"))?;
    let email = qq_email(qq);
    let code = generate_code();
    let max_per_hour = state.settings.max_codes_per_hour;

    let addr = email.clone();
    let stored = code.clone();
    run_db(&state, move |db| {
        if db.get_user(qq)?.is_some() {
            return Ok(Err(ApiError::conflict("This QQ number is already registered")));
        }
        let issued = db.issue_verification_code(
            &addr,
            &stored,
            chrono::Duration::minutes(CODE_TTL_MINUTES),
            chrono::Duration::hours(1),
            max_per_hour,
        )?;
        if !issued {
            return Ok(Err(ApiError::TooManyRequests(
                "Too many verification codes requested, please try again later".into(),
            )));
        }
        Ok(Ok(()))
    })
    .await??;

    state.mail.send_verification_code(&email, &code).await?;
    info!("Verification code issued for {}", email);

    Ok(Json(json!({
        "success": true,
        "message": "The verification code has been sent to your QQ mailbox",
    })))
}
