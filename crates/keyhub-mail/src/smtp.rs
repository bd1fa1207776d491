use std::io;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::{self, PoolConfig};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::{MailConfig, SmtpSecurity};
use crate::error::MailError;
use crate::transport::{Mailer, OutgoingMail};

/// Pooled async SMTP delivery.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let address: Address = config
            .username
            .parse()
            .map_err(|_| MailError::InvalidAddress(config.username.clone()))?;
        let from = Mailbox::new(Some(config.from_name.clone()), address);

        let builder = match config.security {
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(|e| classify(&e))?
            }
            SmtpSecurity::Tls => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host).map_err(|e| classify(&e))?
            }
            SmtpSecurity::Plain => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .timeout(Some(config.timeout))
            .pool_config(PoolConfig::new().max_size(config.max_connections.max(1)))
            .build();

        info!(
            "SMTP transport ready: {}:{} ({}, pool {})",
            config.host, config.port, config.security, config.max_connections
        );
        Ok(Self { transport, from })
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message, MailError> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(mail.to.clone()))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.as_str())
            .multipart(MultiPart::alternative_plain_html(mail.text.clone(), mail.html.clone()))
            .map_err(|e| MailError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = self.build_message(mail)?;
        let response = self.transport.send(message).await.map_err(|e| classify(&e))?;
        debug!("SMTP accepted message for {}: {:?}", mail.to, response.code());
        Ok(())
    }

    async fn verify(&self) -> Result<(), MailError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(MailError::Transport("server did not answer NOOP".into())),
            Err(e) => Err(classify(&e)),
        }
    }

    fn kind(&self) -> &'static str {
        "smtp"
    }
}

fn classify(err: &smtp::Error) -> MailError {
    if err.is_timeout() {
        return MailError::Timeout;
    }
    if err.status().is_some_and(|code| code.to_string() == "535") {
        return MailError::AuthFailed;
    }

    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(classified) = cause.downcast_ref::<io::Error>().and_then(MailError::from_io) {
            return classified;
        }
        source = cause.source();
    }

    MailError::from_message(&err.to_string())
}
