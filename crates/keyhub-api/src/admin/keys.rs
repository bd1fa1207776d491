use axum::{Extension, Json, extract::State, response::IntoResponse};
use rand::{Rng, distr::Alphanumeric};
use serde_json::json;
use tracing::info;

use keyhub_types::api::{AddKeysRequest, Claims, DeleteKeysRequest, GenerateKeysRequest};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

use super::audit;

const MAX_GENERATE: usize = 1000;
const DEFAULT_KEY_LENGTH: usize = 32;
const KEY_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 8..=128;

fn random_key(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let keys = run_db(&state, |db| db.list_keys()).await?;
    Ok(Json(json!({ "success": true, "keys": keys })))
}

/// Bulk import. Blank lines are dropped; values already stored are counted as duplicates.
pub async fn add(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddKeysRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.keys.iter().all(|k| k.trim().is_empty()) {
        return Err(ApiError::bad_request("Please provide at least one key"));
    }

    let keys = req.keys;
    let import = run_db(&state, move |db| db.add_keys(&keys)).await?;
    audit(&state, &claims, format!("Imported {} keys ({} duplicates skipped)", import.added, import.duplicates)).await;

    Ok(Json(json!({
        "success": true,
        "message": format!("Added {} keys", import.added),
        "added": import.added,
        "duplicates": import.duplicates,
    })))
}

pub async fn generate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GenerateKeysRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.count == 0 || req.count > MAX_GENERATE {
        return Err(ApiError::bad_request(format!(
            "Count must be between 1 and {MAX_GENERATE}"
        )));
    }
    let length = req.length.unwrap_or(DEFAULT_KEY_LENGTH);
    if !KEY_LENGTH_RANGE.contains(&length) {
        return Err(ApiError::bad_request(format!(
            "Key length must be between {} and {}",
            KEY_LENGTH_RANGE.start(),
            KEY_LENGTH_RANGE.end()
        )));
    }

    let keys: Vec<String> = (0..req.count).map(|_| random_key(length)).collect();
    let import = run_db(&state, move |db| db.add_keys(&keys)).await?;
    info!("Generated {} keys of length {}", import.added, length);
    audit(&state, &claims, format!("Generated {} keys", import.added)).await;

    Ok(Json(json!({
        "success": true,
        "message": format!("Generated {} keys", import.added),
        "added": import.added,
    })))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeleteKeysRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.key_ids.is_empty() {
        return Err(ApiError::bad_request("Please select keys to delete"));
    }

    let ids = req.key_ids;
    let deleted = run_db(&state, move |db| db.delete_keys(&ids)).await?;
    audit(&state, &claims, format!("Deleted {deleted} keys")).await;

    Ok(Json(json!({
        "success": true,
        "message": format!("Deleted {deleted} keys"),
        "deleted": deleted,
    })))
}
