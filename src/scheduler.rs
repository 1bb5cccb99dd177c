use futures::future::try_join_all;
use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BatchConfig;
use crate::models::{ProgressEvent, ScrapingResult, ScrapingTask};
use crate::{AppError, Result};

/// Randomized pause inserted between groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingWindow {
    min: Duration,
    max: Duration,
}

impl PacingWindow {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max,
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let millis = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(millis as u64)
    }
}

/// Results in input order plus whether the batch was cut short.
#[derive(Debug)]
pub struct ScheduleOutcome {
    pub results: Vec<ScrapingResult>,
    pub cancelled: bool,
}

/// Runs tasks in consecutive groups of `concurrency`, one group at a time.
pub struct BatchScheduler {
    concurrency: usize,
    pacing: PacingWindow,
}

impl BatchScheduler {
    pub fn new(concurrency: usize, pacing: PacingWindow) -> Self {
        Self {
            concurrency: concurrency.max(1),
            pacing,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            config.concurrency,
            PacingWindow::new(
                Duration::from_millis(config.pacing_min_ms),
                Duration::from_millis(config.pacing_max_ms),
            ),
        )
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// `run_task` folds every task-level failure into a result; an `Err` from it
    /// is systemic and aborts the whole batch.
    pub async fn run<'t, F, Fut>(
        &self,
        tasks: &'t [ScrapingTask],
        progress: Option<&UnboundedSender<ProgressEvent>>,
        cancel: &CancellationToken,
        run_task: F,
    ) -> Result<ScheduleOutcome>
    where
        F: Fn(&'t ScrapingTask) -> Fut,
        Fut: Future<Output = Result<ScrapingResult>>,
    {
        let total = tasks.len();
        let reporter = ProgressReporter::new(progress, cancel, total);
        let mut results = Vec::with_capacity(total);
        let group_count = total.div_ceil(self.concurrency);

        for (index, group) in tasks.chunks(self.concurrency).enumerate() {
            let offset = index * self.concurrency;

            if cancel.is_cancelled() {
                for (i, task) in group.iter().enumerate() {
                    let result = ScrapingResult::failed(task, AppError::Cancelled.to_string(), 0);
                    reporter.emit(offset + i + 1, &result);
                    results.push(result);
                }
                continue;
            }

            debug!(group = index + 1, groups = group_count, size = group.len(), "Starting group");

            let group_results = try_join_all(group.iter().enumerate().map(|(i, task)| {
                let reporter = &reporter;
                let pending = run_task(task);
                async move {
                    let result = pending.await?;
                    reporter.emit(offset + i + 1, &result);
                    Ok::<_, AppError>(result)
                }
            }))
            .await?;
            results.extend(group_results);

            let is_last = index + 1 == group_count;
            if !is_last && !cancel.is_cancelled() {
                let delay = self.pacing.sample();
                debug!(delay_ms = delay.as_millis() as u64, "Pacing before next group");
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let cancelled = cancel.is_cancelled();
        if cancelled {
            info!(total, "Batch cancelled before completion");
        }

        Ok(ScheduleOutcome { results, cancelled })
    }
}

/// Forwards per-task results to the caller. A dropped receiver cancels the batch.
struct ProgressReporter<'a> {
    sender: Option<&'a UnboundedSender<ProgressEvent>>,
    cancel: &'a CancellationToken,
    total: usize,
    disconnected: AtomicBool,
}

impl<'a> ProgressReporter<'a> {
    fn new(
        sender: Option<&'a UnboundedSender<ProgressEvent>>,
        cancel: &'a CancellationToken,
        total: usize,
    ) -> Self {
        Self {
            sender,
            cancel,
            total,
            disconnected: AtomicBool::new(false),
        }
    }

    fn emit(&self, position: usize, result: &ScrapingResult) {
        debug!(
            position,
            total = self.total,
            task_id = %result.product_id,
            status = result.status.as_str(),
            success = result.success,
            "Task finished"
        );

        let Some(sender) = self.sender else {
            return;
        };
        if self.disconnected.load(Ordering::SeqCst) {
            return;
        }

        let event = ProgressEvent {
            position,
            total: self.total,
            result: result.clone(),
        };
        if sender.send(event).is_err() && !self.disconnected.swap(true, Ordering::SeqCst) {
            warn!("Progress receiver dropped, cancelling batch");
            self.cancel.cancel();
        }
    }
}
