use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (port 587).
    StartTls,
    /// TLS from the first byte (port 465).
    Tls,
    /// Unencrypted. Only for local relays and testing.
    Plain,
}

impl SmtpSecurity {
    /// The conventional choice for a port.
    pub fn for_port(port: u16) -> Self {
        match port {
            465 => Self::Tls,
            _ => Self::StartTls,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown SMTP security mode '{0}' (expected starttls, tls or plain)")]
pub struct ParseSecurityError(String);

impl FromStr for SmtpSecurity {
    type Err = ParseSecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starttls" => Ok(Self::StartTls),
            "tls" | "ssl" => Ok(Self::Tls),
            "plain" | "none" => Ok(Self::Plain),
            _ => Err(ParseSecurityError(s.to_string())),
        }
    }
}

impl fmt::Display for SmtpSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StartTls => "starttls",
            Self::Tls => "tls",
            Self::Plain => "plain",
        })
    }
}

#[derive(Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
    pub username: String,
    pub password: String,
    /// Display name on the From header. The address is always `username`.
    pub from_name: String,
    pub max_connections: u32,
    pub timeout: Duration,
}

impl MailConfig {
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            host: "smtp.qq.com".to_string(),
            port: 587,
            security: SmtpSecurity::StartTls,
            username: String::new(),
            password: String::new(),
            from_name: "Keyhub".to_string(),
            max_connections: 5,
            timeout: Duration::from_secs(60),
        }
    }
}

// Password is redacted.
impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from_name", &self.from_name)
            .field("max_connections", &self.max_connections)
            .field("timeout", &self.timeout)
            .finish()
    }
}
