use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use keyhub_types::api::{AuthResponse, LoginRequest, RegisterRequest, Role};

use crate::error::ApiError;
use crate::middleware::create_token;
use crate::password::{hash_password, verify_password};
use crate::state::{AppState, run_db};
use crate::validate::{is_valid_password, parse_qq, qq_email};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let nickname = req.nickname.trim().to_string();
    if nickname.is_empty() || req.password.is_empty() || req.verification_code.trim().is_empty() {
        return Err(ApiError::bad_request("Please fill in all required fields"));
    }
    let qq = parse_qq(&req.qq).ok_or_else(|| ApiError::bad_request("Please enter a valid QQ number"))?;
    if !is_valid_password(&req.password) {
        return Err(ApiError::bad_request("Password must be at least 6 characters"));
    }

    let email = qq_email(qq);
    let code = req.verification_code.trim().to_string();
    let password = req.password;

    let user = run_db(&state, move |db| {
        // Duplicates are rejected before the code is spent.
        if db.get_user(qq)?.is_some() {
            return Ok(Err(ApiError::conflict("This QQ number is already registered")));
        }
        if db.email_taken(&email)? {
            return Ok(Err(ApiError::conflict("This email is already registered")));
        }
        if !db.consume_verification_code(&email, &code)? {
            return Ok(Err(ApiError::bad_request("Verification code is wrong or has expired")));
        }

        let hash = hash_password(&password)?;
        db.create_user(qq, &nickname, &email, &hash)?;
        let row = db
            .get_user(qq)?
            .ok_or_else(|| anyhow::anyhow!("user {} missing right after insert", qq))?;
        let key = db.claimed_key_for(qq)?;
        Ok(Ok(row.into_user(key)))
    })
    .await??;

    let token = create_token(&state.jwt_secret, user.id, &user.nickname, Role::User, 0, state.settings.token_ttl)?;
    info!("User {} registered", user.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            message: "Registration successful".into(),
            user,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("Wrong QQ number or password".into());
    let qq = parse_qq(&req.qq).ok_or_else(invalid)?;
    let password = req.password;

    let user = run_db(&state, move |db| {
        let Some(row) = db.get_user(qq)? else {
            return Ok(None);
        };
        if !verify_password(&password, &row.password_hash) {
            return Ok(None);
        }
        let key = db.claimed_key_for(qq)?;
        Ok(Some(row.into_user(key)))
    })
    .await?
    .ok_or_else(invalid)?;

    let token = create_token(&state.jwt_secret, user.id, &user.nickname, Role::User, 0, state.settings.token_ttl)?;

    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful".into(),
        user,
        token,
    }))
}
