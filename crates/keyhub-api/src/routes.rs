use axum::{
    Json, Router,
    http::{HeaderValue, header},
    middleware,
    routing::{delete, get, post, put},
};
use serde_json::json;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::admin;
use crate::middleware::{require_admin, require_user};
use crate::state::AppState;
use crate::{auth, contributors, keys, likes, users, verification};

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// The full HTTP surface. CORS and request tracing are layered on by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/send-verification", post(verification::send_verification))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/contributors", get(contributors::leaderboard))
        .route("/api/users/{id}/likes", get(likes::user_likes))
        .route("/api/settings/api-url", get(admin::settings::get_api_url))
        .route("/api/admin/auth/login", post(admin::auth::login))
        .route("/api/admin/setup", post(admin::auth::setup));

    let user_routes = Router::new()
        .route("/api/users/validate", post(users::validate))
        .route("/api/keys/claim", post(keys::claim))
        .route("/api/likes/toggle", post(likes::toggle))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    let admin_routes = Router::new()
        .route("/dashboard/stats", get(admin::dashboard::stats))
        .route(
            "/email-health",
            get(admin::email_health::check).post(admin::email_health::recheck),
        )
        .route("/keys", get(admin::keys::list).delete(admin::keys::delete))
        .route("/keys/add", post(admin::keys::add))
        .route("/keys/generate", post(admin::keys::generate))
        .route("/logs", get(admin::logs::list))
        .route("/logs/clear", delete(admin::logs::clear))
        .route(
            "/contributors",
            get(admin::contributors::list).post(admin::contributors::create),
        )
        .route("/contributors/edit", put(admin::contributors::edit))
        .route("/contributors/{id}", delete(admin::contributors::delete))
        .route("/contributors/{id}/points", post(admin::contributors::adjust_points))
        .route("/likes/reset", post(admin::contributors::reset_likes))
        .route("/settings/admins", get(admin::settings::list_admins))
        .route("/settings/admins/add", post(admin::settings::add_admin))
        .route("/settings/admins/delete", delete(admin::settings::delete_admin))
        .route("/settings/change-password", post(admin::settings::change_password))
        .route(
            "/settings/api-url",
            get(admin::settings::get_api_url).put(admin::settings::set_api_url),
        )
        .route("/users", get(admin::users::list))
        .route("/users/ban", post(admin::users::ban))
        .route("/users/delete", delete(admin::users::delete))
        .route("/users/export", get(admin::users::export))
        .route("/whitelist", get(admin::whitelist::list))
        .route("/whitelist/add", post(admin::whitelist::add))
        .route("/whitelist/batch-add", post(admin::whitelist::batch_add))
        .route("/whitelist/delete", delete(admin::whitelist::delete))
        .route("/whitelist/batch-delete", delete(admin::whitelist::batch_delete))
        .route("/whitelist/compare", post(admin::whitelist::compare))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .nest("/api/admin", admin_routes)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}
