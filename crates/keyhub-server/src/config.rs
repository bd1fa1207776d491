use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use keyhub_api::PortalSettings;
use keyhub_mail::{MailConfig, QueueConfig, SmtpSecurity};

/// Placeholder JWT secrets that must not be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub jwt_secret: String,
    pub app_name: String,
    pub portal: PortalSettings,
    pub mail: MailConfig,
    pub queue: QueueConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let parsed = |key: &str, default: &str| -> anyhow::Result<u64> {
            var(key, default)
                .trim()
                .parse()
                .with_context(|| format!("{key} must be a non-negative integer"))
        };

        let jwt_secret = get("KEYHUB_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("KEYHUB_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let app_name = var("KEYHUB_APP_NAME", "Keyhub");
        let defaults = PortalSettings::default();
        let portal = PortalSettings {
            token_ttl: chrono::Duration::days(parsed("KEYHUB_TOKEN_TTL_DAYS", "7")? as i64),
            default_api_base_url: var("KEYHUB_DEFAULT_API_BASE_URL", &defaults.default_api_base_url),
            max_codes_per_hour: parsed("KEYHUB_MAX_CODES_PER_HOUR", "5")? as i64,
            default_admin_username: var("KEYHUB_ADMIN_USERNAME", &defaults.default_admin_username),
            default_admin_password: var("KEYHUB_ADMIN_PASSWORD", &defaults.default_admin_password),
        };

        let smtp_port = u16::try_from(parsed("KEYHUB_SMTP_PORT", "587")?).context("KEYHUB_SMTP_PORT is out of range")?;
        let security = match get("KEYHUB_SMTP_SECURITY").filter(|v| !v.trim().is_empty()) {
            Some(raw) => SmtpSecurity::from_str(&raw)?,
            None => SmtpSecurity::for_port(smtp_port),
        };
        let mail = MailConfig {
            host: var("KEYHUB_SMTP_HOST", "smtp.qq.com"),
            port: smtp_port,
            security,
            username: var("KEYHUB_SMTP_USER", ""),
            password: var("KEYHUB_SMTP_PASS", ""),
            from_name: app_name.clone(),
            max_connections: parsed("KEYHUB_SMTP_MAX_CONNECTIONS", "5")? as u32,
            timeout: Duration::from_millis(parsed("KEYHUB_SMTP_TIMEOUT_MS", "60000")?),
        };

        let queue = QueueConfig {
            concurrency_limit: parsed("KEYHUB_EMAIL_MAX_CONCURRENT", "5")? as usize,
            max_retries: parsed("KEYHUB_EMAIL_MAX_RETRIES", "3")? as u32,
            base_retry_delay: Duration::from_millis(parsed("KEYHUB_EMAIL_RETRY_DELAY_MS", "1000")?),
        };

        Ok(Self {
            host: var("KEYHUB_HOST", "0.0.0.0"),
            port: u16::try_from(parsed("KEYHUB_PORT", "3000")?).context("KEYHUB_PORT is out of range")?,
            db_path: var("KEYHUB_DB_PATH", "keyhub.db"),
            jwt_secret,
            app_name,
            portal,
            mail,
            queue,
        })
    }
}
