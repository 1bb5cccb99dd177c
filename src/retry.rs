use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::BatchConfig;
use crate::{AppError, Result};

/// Bounded retries with linear backoff (`base * n` before the n-th retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_base: Duration,
}

/// The final outcome of a retried operation and how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub outcome: Result<T>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.retry_delay_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let base = self.backoff_base;
        (1..=self.max_retries).map(move |n| base * n)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// the retry budget is spent. The operation receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Attempted<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Attempted {
                outcome: Err(AppError::Cancelled),
                attempts: 0,
            };
        }

        let attempts = AtomicU32::new(0);
        let max_attempts = self.max_attempts();

        let action = || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            metrics::counter!("listing_watcher_attempts_total").increment(1);
            if attempt > 1 {
                metrics::counter!("listing_watcher_retries_total").increment(1);
                warn!(task_id, attempt, max_attempts, "Retrying task");
            }
            operation(attempt)
        };

        let should_retry = |e: &AppError| {
            let retry = e.is_retryable() && !cancel.is_cancelled();
            debug!(task_id, retryable = retry, "Attempt failed: {}", e);
            retry
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            outcome = RetryIf::spawn(self.delays(), action, should_retry) => outcome,
        };

        // A retryable failure cut short by cancellation reports the cancellation.
        let outcome = match outcome {
            Err(e) if e.is_retryable() && cancel.is_cancelled() => Err(AppError::Cancelled),
            other => other,
        };

        Attempted {
            outcome,
            attempts: attempts.load(Ordering::SeqCst),
        }
    }
}
