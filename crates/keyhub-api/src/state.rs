use std::sync::Arc;

use tracing::error;

use keyhub_db::Database;
use keyhub_mail::MailService;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub mail: MailService,
    pub settings: PortalSettings,
}

/// Portal behaviour resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub token_ttl: chrono::Duration,
    pub default_api_base_url: String,
    /// Verification codes one address may request per hour.
    pub max_codes_per_hour: i64,
    pub default_admin_username: String,
    pub default_admin_password: String,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            token_ttl: chrono::Duration::days(7),
            default_api_base_url: "https://key.laopobao.online/v1".to_string(),
            max_codes_per_hour: 5,
            default_admin_username: "admin".to_string(),
            default_admin_password: "admin123".to_string(),
        }
    }
}

/// Run blocking store work off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
        .map_err(ApiError::Internal)
}
