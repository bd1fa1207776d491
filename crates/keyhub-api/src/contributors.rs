use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::error::ApiError;
use crate::state::{AppState, run_db};

/// Public leaderboard.
pub async fn leaderboard(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let contributors = run_db(&state, |db| db.list_contributors()).await?;
    Ok(Json(json!({ "success": true, "contributors": contributors })))
}
