use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::MailError;
use crate::queue::{JobError, QueueStats, RetryQueue};
use crate::template;
use crate::transport::Mailer;

/// Result of a transport check.
#[derive(Debug, Clone, Serialize)]
pub struct MailHealth {
    pub healthy: bool,
    pub transport: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub active_jobs: usize,
    pub pending_jobs: usize,
}

/// Verification mail delivery through the retry queue.
#[derive(Clone)]
pub struct MailService {
    mailer: Arc<dyn Mailer>,
    queue: RetryQueue,
    app_name: String,
}

impl MailService {
    pub fn new(mailer: Arc<dyn Mailer>, queue: RetryQueue, app_name: impl Into<String>) -> Self {
        Self {
            mailer,
            queue,
            app_name: app_name.into(),
        }
    }

    /// Render and send a verification code, retrying transient failures.
    pub async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), MailError> {
        let mail = template::verification_email(&self.app_name, to, code);
        let mailer = Arc::clone(&self.mailer);

        let handle = self.queue.submit(move || {
            let mailer = Arc::clone(&mailer);
            let mail = mail.clone();
            // Permanent failures resolve the job so the queue stops retrying.
            async move {
                match mailer.send(&mail).await {
                    Err(e) if !e.is_transient() => Ok(Err(e)),
                    other => other.map(Ok),
                }
            }
        });

        match handle.await {
            Ok(Ok(())) => {
                info!("Verification code sent to {}", to);
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Verification mail to {} failed permanently: {}", to, e);
                Err(e)
            }
            Err(JobError::Failed { attempts, last }) => {
                error!("Verification mail to {} failed after {} attempts: {}", to, attempts, last);
                Err(last)
            }
            Err(JobError::Panicked { attempts, message }) => {
                error!("Verification mail to {} panicked after {} attempts: {}", to, attempts, message);
                Err(MailError::Transport(message))
            }
            Err(JobError::Closed) => Err(MailError::QueueClosed),
        }
    }

    pub async fn check_health(&self) -> MailHealth {
        let result = self.mailer.verify().await;
        if let Err(e) = &result {
            warn!("Mail transport check failed: {}", e);
        }
        let stats = self.queue_stats();
        MailHealth {
            healthy: result.is_ok(),
            transport: self.mailer.kind(),
            error: result.err().map(|e| e.to_string()),
            active_jobs: stats.active,
            pending_jobs: stats.pending,
        }
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use crate::transport::OutgoingMail;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fails the first `failures` sends with the given error, then succeeds.
    struct Flaky {
        failures: Mutex<u32>,
        error: MailError,
        sent: Mutex<Vec<OutgoingMail>>,
    }

    impl Flaky {
        fn new(failures: u32, error: MailError) -> Arc<Self> {
            Arc::new(Self {
                failures: Mutex::new(failures),
                error,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Mailer for Flaky {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
            let mut left = self.failures.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(self.error.clone());
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }

        async fn verify(&self) -> Result<(), MailError> {
            if *self.failures.lock().unwrap() > 0 {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }

        fn kind(&self) -> &'static str {
            "flaky"
        }
    }

    fn service(mailer: Arc<Flaky>) -> MailService {
        let queue = RetryQueue::new(QueueConfig {
            concurrency_limit: 2,
            max_retries: 3,
            base_retry_delay: Duration::from_millis(1000),
        });
        MailService::new(mailer, queue, "Keyhub")
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let mailer = Flaky::new(2, MailError::Timeout);
        let svc = service(Arc::clone(&mailer));

        svc.send_verification_code("10001@qq.com", "123456").await.unwrap();
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("123456"));
    }

    #[tokio::test(start_paused = true)]
    async fn last_error_surfaces_after_exhaustion() {
        let mailer = Flaky::new(10, MailError::Timeout);
        let svc = service(Arc::clone(&mailer));

        let err = svc.send_verification_code("10001@qq.com", "123456").await.unwrap_err();
        assert_eq!(err, MailError::Timeout);
        assert!(mailer.sent.lock().unwrap().is_empty());
        assert_eq!(*mailer.failures.lock().unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_are_not_retried() {
        for error in [
            MailError::AuthFailed,
            MailError::HostNotFound,
            MailError::InvalidAddress("nobody@".into()),
        ] {
            let mailer = Flaky::new(10, error.clone());
            let svc = service(Arc::clone(&mailer));

            let err = svc.send_verification_code("10001@qq.com", "123456").await.unwrap_err();
            assert_eq!(err, error);
            assert_eq!(*mailer.failures.lock().unwrap(), 9);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn health_reports_transport_state() {
        let svc = service(Flaky::new(1, MailError::ConnectionRefused));
        let health = svc.check_health().await;
        assert!(!health.healthy);
        assert_eq!(health.transport, "flaky");
        assert!(health.error.unwrap().contains("refused"));

        let svc = service(Flaky::new(0, MailError::ConnectionRefused));
        assert!(svc.check_health().await.healthy);
    }
}
