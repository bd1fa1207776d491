use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::error::ApiError;
use crate::state::{AppState, run_db};

pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = run_db(&state, |db| db.dashboard_stats()).await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}
