use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use keyhub_db::AdminDeletion;
use keyhub_types::api::{AddAdminRequest, ApiUrlRequest, ChangePasswordRequest, Claims, DeleteAdminRequest, Role};

use crate::error::ApiError;
use crate::middleware::create_token;
use crate::password::{hash_password, verify_password};
use crate::state::{AppState, run_db};
use crate::validate::{is_http_url, is_valid_password};

use super::audit;

pub const API_BASE_URL_KEY: &str = "api_base_url";

pub async fn list_admins(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let admins = run_db(&state, |db| db.list_admins()).await?;
    Ok(Json(json!({ "success": true, "admins": admins })))
}

pub async fn add_admin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddAdminRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }
    if !is_valid_password(&req.password) {
        return Err(ApiError::bad_request("Password must be at least 6 characters"));
    }

    let password = req.password;
    let admin = run_db(&state, move |db| {
        let hash = hash_password(&password)?;
        db.create_admin(&username, &hash)
    })
    .await?
    .ok_or_else(|| ApiError::conflict("This username is already taken"))?;
    audit(&state, &claims, format!("Added administrator {}", admin.username)).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Administrator added",
            "admin": admin,
        })),
    ))
}

pub async fn delete_admin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeleteAdminRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = req.id;
    let outcome = run_db(&state, move |db| db.delete_admin(id)).await?;

    match outcome {
        AdminDeletion::Deleted(admin) => {
            audit(&state, &claims, format!("Deleted administrator {}", admin.username)).await;
            Ok(Json(json!({ "success": true, "message": "Administrator deleted" })))
        }
        AdminDeletion::NotFound => Err(ApiError::not_found("Administrator not found")),
        AdminDeletion::LastAdmin => Err(ApiError::bad_request("The last administrator cannot be deleted")),
    }
}

/// Change the signed-in admin's own password.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.current_password.is_empty() {
        return Err(ApiError::bad_request("Please enter your current password"));
    }
    if !is_valid_password(&req.new_password) {
        return Err(ApiError::bad_request("New password must be at least 6 characters"));
    }

    let admin_id = claims.sub;
    let (current, new) = (req.current_password, req.new_password);
    let version = run_db(&state, move |db| {
        let Some(admin) = db.get_admin(admin_id)? else {
            return Ok(Err(ApiError::not_found("Administrator not found")));
        };
        if !verify_password(&current, &admin.password_hash) {
            return Ok(Err(ApiError::bad_request("Current password is incorrect")));
        }
        match db.update_admin_password(admin_id, &hash_password(&new)?)? {
            Some(version) => Ok(Ok(version)),
            None => Ok(Err(ApiError::not_found("Administrator not found"))),
        }
    })
    .await??;
    audit(&state, &claims, "Changed own password").await;

    // Earlier tokens are now void; hand the caller a fresh one.
    let token = create_token(
        &state.jwt_secret,
        admin_id,
        &claims.name,
        Role::Admin,
        version,
        state.settings.token_ttl,
    )?;
    Ok(Json(json!({ "success": true, "message": "Password changed", "token": token })))
}

/// Public: clients read the API base URL they should call.
pub async fn get_api_url(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stored = run_db(&state, |db| db.get_setting(API_BASE_URL_KEY)).await?;
    let api_base_url = stored
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| state.settings.default_api_base_url.clone());
    Ok(Json(json!({ "success": true, "apiBaseUrl": api_base_url })))
}

pub async fn set_api_url(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ApiUrlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let url = req.api_base_url.trim().to_string();
    if url.is_empty() {
        return Err(ApiError::bad_request("API base URL is required"));
    }
    if !is_http_url(&url) {
        return Err(ApiError::bad_request("Please enter a valid http(s) URL"));
    }

    let value = url.clone();
    run_db(&state, move |db| db.set_setting(API_BASE_URL_KEY, &value)).await?;
    audit(&state, &claims, format!("Changed API base URL to {url}")).await;

    Ok(Json(json!({
        "success": true,
        "message": "API base URL updated",
        "apiBaseUrl": url,
    })))
}
