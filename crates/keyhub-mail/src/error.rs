use std::io;

/// Mail delivery failures, classified by what an operator has to fix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailError {
    #[error("SMTP connection timed out")]
    Timeout,

    #[error("SMTP authentication failed")]
    AuthFailed,

    #[error("SMTP server refused the connection")]
    ConnectionRefused,

    #[error("SMTP host could not be resolved")]
    HostNotFound,

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("mail queue is shut down")]
    QueueClosed,
}

impl MailError {
    /// Message safe to show to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout => "The mail server timed out. Please try again later.",
            Self::AuthFailed => "The mail service is misconfigured. Please contact an administrator.",
            Self::ConnectionRefused => "Could not connect to the mail server. Please try again later.",
            Self::HostNotFound => "The mail server could not be found. Please contact an administrator.",
            Self::InvalidAddress(_) => "The email address is invalid.",
            Self::Transport(_) => "Failed to send the verification email. Please try again later.",
            Self::QueueClosed => "The mail service is unavailable. Please try again later.",
        }
    }

    /// Whether another attempt could succeed. Bad credentials, unknown hosts
    /// and rejected addresses fail the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionRefused | Self::Transport(_))
    }

    /// Classify from an I/O error found in a transport's source chain.
    pub fn from_io(err: &io::Error) -> Option<Self> {
        match err.kind() {
            io::ErrorKind::TimedOut => Some(Self::Timeout),
            io::ErrorKind::ConnectionRefused => Some(Self::ConnectionRefused),
            _ => None,
        }
    }

    /// Last-resort classification from a rendered error message.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("timed out") || lower.contains("timeout") {
            Self::Timeout
        } else if lower.contains("535") || lower.contains("authentication") || lower.contains("auth failed") {
            Self::AuthFailed
        } else if lower.contains("connection refused") {
            Self::ConnectionRefused
        } else if lower.contains("lookup")
            || lower.contains("not known")
            || lower.contains("no such host")
            || lower.contains("name or service")
        {
            Self::HostNotFound
        } else {
            Self::Transport(message.to_string())
        }
    }
}
