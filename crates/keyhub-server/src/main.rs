mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use keyhub_api::password::hash_password;
use keyhub_api::{AppState, AppStateInner, router};
use keyhub_mail::{LogMailer, MailService, Mailer, RetryQueue, SmtpMailer};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyhub=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = keyhub_db::Database::open(&PathBuf::from(&config.db_path))?;
    let admin_hash = hash_password(&config.portal.default_admin_password)?;
    if db.bootstrap_admin(&config.portal.default_admin_username, &admin_hash)?.is_some() {
        warn!(
            "Created bootstrap admin '{}'; change its password after first login",
            config.portal.default_admin_username
        );
    }

    // Mail
    let mailer: Arc<dyn Mailer> = if config.mail.has_credentials() {
        info!(
            "SMTP mail via {}:{} ({})",
            config.mail.host, config.mail.port, config.mail.security
        );
        Arc::new(SmtpMailer::new(&config.mail)?)
    } else {
        warn!("KEYHUB_SMTP_USER/KEYHUB_SMTP_PASS not set, verification mail will only be logged");
        Arc::new(LogMailer)
    };
    let queue = RetryQueue::new(config.queue.clone());
    let mail = MailService::new(mailer, queue, config.app_name.clone());

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        mail,
        settings: config.portal.clone(),
    });

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Keyhub server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
