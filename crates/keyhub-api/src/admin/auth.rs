use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use tracing::info;

use keyhub_types::api::{AdminLoginRequest, AdminLoginResponse, Claims, Role, SetupAdminRequest};
use keyhub_types::models::Admin;

use crate::error::ApiError;
use crate::middleware::create_token;
use crate::password::{hash_password, verify_password};
use crate::state::{AppState, run_db};
use crate::validate::is_valid_password;

use super::audit;

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<AdminLoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Please enter a username and password"));
    }

    let password = req.password;
    let (version, admin) = run_db(&state, move |db| {
        let Some(row) = db.get_admin_by_username(&username)? else {
            return Ok(None);
        };
        if !verify_password(&password, &row.password_hash) {
            return Ok(None);
        }
        Ok(Some((row.token_version, Admin::from(row))))
    })
    .await?
    .ok_or_else(|| ApiError::Unauthorized("Wrong username or password".into()))?;

    let token = create_token(
        &state.jwt_secret,
        admin.id,
        &admin.username,
        Role::Admin,
        version,
        state.settings.token_ttl,
    )?;
    info!("Admin '{}' signed in", admin.username);

    Ok(Json(AdminLoginResponse {
        success: true,
        message: "Login successful".into(),
        admin,
        token,
    }))
}

/// Create the first administrator. Refused once any admin exists.
pub async fn setup(
    State(state): State<AppState>,
    body: Option<Json<SetupAdminRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let username = req
        .username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| state.settings.default_admin_username.clone());
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| state.settings.default_admin_password.clone());
    if !is_valid_password(&password) {
        return Err(ApiError::bad_request("Password must be at least 6 characters"));
    }

    let created = run_db(&state, move |db| {
        let hash = hash_password(&password)?;
        db.bootstrap_admin(&username, &hash)
    })
    .await?
    .ok_or_else(|| ApiError::conflict("An administrator account already exists"))?;

    let claims = Claims {
        sub: created.id,
        name: created.username.clone(),
        role: Role::Admin,
        exp: 0,
        ver: 0,
    };
    audit(&state, &claims, format!("Initialized administrator account {}", created.username)).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Administrator account created",
            "admin": created,
        })),
    ))
}
