use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::MailError;

/// A rendered message ready for delivery.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Something that can deliver mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;

    /// Check that the transport is reachable and accepts our credentials.
    async fn verify(&self) -> Result<(), MailError>;

    /// Short label for health reports.
    fn kind(&self) -> &'static str;
}

/// Logs messages instead of sending them. Used when no SMTP credentials are set.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, "Mail delivery disabled, message logged only");
        debug!("{}", mail.text);
        Ok(())
    }

    async fn verify(&self) -> Result<(), MailError> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "log"
    }
}
