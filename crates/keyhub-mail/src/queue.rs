//! Bounded concurrent job queue with retry.
//!
//! [`RetryQueue`] admits at most `concurrency_limit` jobs at once. Each job is a
//! re-invocable async closure; a failed attempt is retried after a linearly
//! growing delay until the attempt budget runs out, and the submitter's
//! [`JobHandle`] resolves with the first success or the last failure.
//!
//! All scheduling state lives in a single dispatcher task that is reached only
//! through a channel. It wakes on submissions and job completions and never polls.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const DEFAULT_CONCURRENCY_LIMIT: usize = 5;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Fixed at construction.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Jobs allowed to run at once. Zero is treated as one.
    pub concurrency_limit: usize,
    /// Total attempts per job, including the first. Zero is treated as one.
    pub max_retries: u32,
    /// Delay before retry `n` is `base_retry_delay * n`.
    pub base_retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_retry_delay: DEFAULT_BASE_RETRY_DELAY,
        }
    }
}

/// Point-in-time occupancy of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Jobs holding a slot, including those waiting out a retry delay.
    pub active: usize,
    /// Jobs submitted but not yet admitted.
    pub pending: usize,
}

/// Why a job did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum JobError<E> {
    #[error("job failed after {attempts} attempt(s): {last}")]
    Failed { attempts: u32, last: E },

    #[error("job panicked after {attempts} attempt(s): {message}")]
    Panicked { attempts: u32, message: String },

    #[error("retry queue shut down before the job completed")]
    Closed,
}

impl<E> JobError<E> {
    /// Number of attempts made before giving up. Zero for `Closed`.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Failed { attempts, .. } | Self::Panicked { attempts, .. } => *attempts,
            Self::Closed => 0,
        }
    }
}

/// Resolves once the job succeeds or exhausts its attempts.
///
/// Dropping the handle does not cancel the job.
#[must_use = "a JobHandle does nothing unless awaited"]
pub struct JobHandle<T, E> {
    rx: oneshot::Receiver<Result<T, JobError<E>>>,
}

impl<T, E> Future for JobHandle<T, E> {
    type Output = Result<T, JobError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(JobError::Closed),
        })
    }
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    pending: AtomicUsize,
}

type Runner = BoxFuture<'static, ()>;

/// Handle to a running queue. Cheap to clone; the dispatcher drains remaining
/// work and exits once every clone is dropped.
#[derive(Clone)]
pub struct RetryQueue {
    tx: mpsc::UnboundedSender<Runner>,
    config: QueueConfig,
    counters: Arc<Counters>,
}

impl RetryQueue {
    /// Start the dispatcher. Must be called inside a Tokio runtime.
    pub fn new(config: QueueConfig) -> Self {
        let config = QueueConfig {
            concurrency_limit: config.concurrency_limit.max(1),
            max_retries: config.max_retries.max(1),
            ..config
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        info!(
            concurrency_limit = config.concurrency_limit,
            max_retries = config.max_retries,
            base_retry_delay_ms = config.base_retry_delay.as_millis() as u64,
            "Retry queue started"
        );
        tokio::spawn(dispatch(rx, config.concurrency_limit, Arc::clone(&counters)));

        Self { tx, config, counters }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            active: self.counters.active.load(Ordering::SeqCst),
            pending: self.counters.pending.load(Ordering::SeqCst),
        }
    }

    /// Enqueue `job` and return immediately. `job` is called once per attempt.
    pub fn submit<F, Fut, T, E>(&self, job: F) -> JobHandle<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let attempts = self.config.max_retries;
        let base_delay = self.config.base_retry_delay;

        let runner = async move {
            let result = run_with_retry(job, attempts, base_delay).await;
            // The submitter may have dropped its handle.
            let _ = done_tx.send(result);
        }
        .boxed();

        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(runner).is_err() {
            // Dispatcher is gone; dropping the runner resolves the handle as Closed.
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("Retry queue dispatcher has stopped; job rejected");
        }

        JobHandle { rx: done_rx }
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<Runner>, limit: usize, counters: Arc<Counters>) {
    let mut pending: VecDeque<Runner> = VecDeque::new();
    let mut running: JoinSet<()> = JoinSet::new();
    let mut open = true;

    loop {
        while running.len() < limit {
            let Some(runner) = pending.pop_front() else {
                break;
            };
            counters.pending.fetch_sub(1, Ordering::SeqCst);
            counters.active.fetch_add(1, Ordering::SeqCst);
            running.spawn(runner);
        }

        // pending is empty whenever running is, so this is the drained state
        if !open && running.is_empty() {
            break;
        }

        tokio::select! {
            received = rx.recv(), if open => match received {
                Some(runner) => pending.push_back(runner),
                None => open = false,
            },
            Some(joined) = running.join_next(), if !running.is_empty() => {
                counters.active.fetch_sub(1, Ordering::SeqCst);
                if let Err(e) = joined {
                    warn!("Queued job aborted: {}", e);
                }
            }
        }
    }

    debug!("Retry queue dispatcher exiting");
}

async fn run_with_retry<F, Fut, T, E>(mut job: F, max_attempts: u32, base_delay: Duration) -> Result<T, JobError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt: u32 = 1;
    loop {
        // A panic while building the future counts the same as one while polling it.
        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| job())) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
            Err(payload) => Err(payload),
        };

        let failure = match outcome {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!(attempt, "Job succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(e)) => {
                warn!(attempt, max_attempts, "Job attempt failed: {}", e);
                JobError::Failed { attempts: attempt, last: e }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(attempt, max_attempts, "Job attempt panicked: {}", message);
                JobError::Panicked { attempts: attempt, message }
            }
        };

        if attempt >= max_attempts {
            return Err(failure);
        }

        tokio::time::sleep(base_delay * attempt).await;
        attempt += 1;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
