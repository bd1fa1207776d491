//! Back-office handlers. Everything except `auth::login` and `auth::setup`
//! sits behind `require_admin`, and every mutation is recorded in the audit log.

pub mod auth;
pub mod contributors;
pub mod dashboard;
pub mod email_health;
pub mod keys;
pub mod logs;
pub mod settings;
pub mod users;
pub mod whitelist;

use tracing::warn;

use keyhub_types::api::Claims;

use crate::state::{AppState, run_db};

/// Append an audit entry for the acting admin. Failures are logged, never returned.
pub(crate) async fn audit(state: &AppState, claims: &Claims, action: impl Into<String>) {
    let admin_id = claims.sub;
    let action = action.into();
    if let Err(e) = run_db(state, move |db| db.append_audit_log(admin_id, &action)).await {
        warn!("Failed to record audit log for admin {}: {}", admin_id, e);
    }
}
