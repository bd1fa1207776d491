pub mod config;
pub mod error;
pub mod queue;
pub mod service;
pub mod smtp;
pub mod template;
pub mod transport;

pub use config::{MailConfig, SmtpSecurity};
pub use error::MailError;
pub use queue::{JobError, JobHandle, QueueConfig, QueueStats, RetryQueue};
pub use service::{MailHealth, MailService};
pub use smtp::SmtpMailer;
pub use template::CODE_TTL_MINUTES;
pub use transport::{LogMailer, Mailer, OutgoingMail};
