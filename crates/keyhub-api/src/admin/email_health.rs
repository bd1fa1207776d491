use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use keyhub_db::VerificationStats;

use crate::error::ApiError;
use crate::state::{AppState, run_db};

const RECOMMENDATIONS: &[&str] = &[
    "Check the SMTP server configuration",
    "Verify the mailbox account and password",
    "Make sure the network connection is up",
    "Check the provider's sending limits",
];

fn status_label(healthy: bool) -> &'static str {
    if healthy { "healthy" } else { "unhealthy" }
}

fn usage_rate(stats: &VerificationStats) -> String {
    if stats.total == 0 {
        return "N/A".to_string();
    }
    format!("{:.2}%", stats.success_rate())
}

/// Verify the transport and report the last day of verification traffic.
pub async fn check(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let health = state.mail.check_health().await;
    if let Some(err) = &health.error {
        warn!("Mail transport '{}' failed verification: {}", health.transport, err);
    }

    let stats = run_db(&state, |db| db.verification_stats(chrono::Duration::hours(24))).await?;
    let recommendations: &[&str] = if health.healthy { &[] } else { RECOMMENDATIONS };

    Ok(Json(json!({
        "success": true,
        "data": {
            "emailService": {
                "status": status_label(health.healthy),
                "transport": health.transport,
                "error": health.error,
                "lastCheck": Utc::now(),
            },
            "queue": {
                "active": health.active_jobs,
                "pending": health.pending_jobs,
            },
            "statistics": {
                "last24Hours": {
                    "total": stats.total,
                    "used": stats.used,
                    "unused": stats.total - stats.used,
                    "usageRate": usage_rate(&stats),
                }
            },
            "recommendations": recommendations,
        }
    })))
}

pub async fn recheck(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let health = state.mail.check_health().await;
    Ok(Json(json!({
        "success": true,
        "message": "Mail service check complete",
        "status": status_label(health.healthy),
    })))
}
