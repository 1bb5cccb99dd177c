use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::browser::{BrowserLauncher, ChromeLauncher, PageGuard, ResourceFilter, SessionManager};
use crate::config::{AppConfig, BatchConfig, ScraperConfig};
use crate::extractor::{AdapterRegistry, ExtractionOutcome, ListingExtractor};
use crate::models::{BatchReport, BatchStats, ProgressEvent, ScrapingResult, ScrapingTask};
use crate::retry::RetryPolicy;
use crate::scheduler::BatchScheduler;
use crate::{AppError, Result};

/// Per-call overrides for [`ScrapingEngine::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub concurrency: Option<usize>,
    /// Receives one event per task. Dropping the receiver cancels the batch.
    pub progress: Option<UnboundedSender<ProgressEvent>>,
    pub cancel: Option<CancellationToken>,
}

/// A batch running on a background task.
pub struct BatchHandle {
    pub progress: UnboundedReceiver<ProgressEvent>,
    pub cancel: CancellationToken,
    pub join: JoinHandle<Result<BatchReport>>,
}

impl BatchHandle {
    /// Wait for the report without consuming progress events.
    pub async fn wait(self) -> Result<BatchReport> {
        let _progress = self.progress;
        self.join.await?
    }
}

/// Re-checks batches of marketplace listings through one shared headless browser.
pub struct ScrapingEngine {
    sessions: SessionManager,
    extractor: ListingExtractor,
    retry: RetryPolicy,
    batch: BatchConfig,
    filter: ResourceFilter,
}

impl ScrapingEngine {
    pub fn new(scraper: ScraperConfig, batch: BatchConfig) -> Self {
        let launcher = Arc::new(ChromeLauncher::new(scraper.clone()));
        Self::with_launcher(launcher, &scraper, batch)
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.scraper.clone(), config.batch.clone())
    }

    pub fn with_launcher(
        launcher: Arc<dyn BrowserLauncher>,
        scraper: &ScraperConfig,
        batch: BatchConfig,
    ) -> Self {
        Self {
            sessions: SessionManager::new(launcher),
            extractor: ListingExtractor::new(AdapterRegistry::default(), scraper.navigation_timeout()),
            retry: RetryPolicy::from_config(&batch),
            filter: ResourceFilter::new(scraper.blocked_resource_types.iter().copied()),
            batch,
        }
    }

    pub fn with_adapters(mut self, registry: AdapterRegistry, scraper: &ScraperConfig) -> Self {
        self.extractor = ListingExtractor::new(registry, scraper.navigation_timeout());
        self
    }

    pub fn filter(&self) -> &ResourceFilter {
        &self.filter
    }

    pub fn open_pages(&self) -> usize {
        self.sessions.open_pages()
    }

    pub fn peak_open_pages(&self) -> usize {
        self.sessions.peak_open_pages()
    }

    /// Check every task and return exactly one result per task, in input order.
    ///
    /// Only systemic failures (the browser cannot be started) and invalid input
    /// surface as `Err`; everything else becomes a per-task result.
    pub async fn execute(&self, tasks: &[ScrapingTask], options: ExecuteOptions) -> Result<BatchReport> {
        for task in tasks {
            task.validate()?;
        }

        let mut scheduler = BatchScheduler::from_config(&self.batch);
        if let Some(concurrency) = options.concurrency {
            if concurrency == 0 {
                return Err(AppError::Validation("concurrency must be greater than 0".to_string()));
            }
            scheduler = scheduler.with_concurrency(concurrency);
        }

        let cancel = options.cancel.unwrap_or_default();
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(
            %batch_id,
            total = tasks.len(),
            concurrency = scheduler.concurrency(),
            "Starting scraping batch"
        );

        if !tasks.is_empty() {
            // a cancelled launch leaves every task to be reported as cancelled
            tokio::select! {
                biased;
                _ = cancel.cancelled() => info!(%batch_id, "Batch cancelled before browser launch"),
                launched = self.sessions.init() => launched?,
            }
        }

        let outcome = scheduler
            .run(tasks, options.progress.as_ref(), &cancel, |task| self.run_task(task, &cancel))
            .await
            .inspect_err(|e| warn!(%batch_id, "Batch aborted: {}", e))?;

        let stats = BatchStats::from_results(&outcome.results, started_at, Utc::now());
        info!(
            %batch_id,
            total = stats.total,
            success = stats.success,
            failed = stats.failed,
            duration_ms = stats.duration_ms,
            cancelled = outcome.cancelled,
            "Scraping batch finished"
        );
        metrics::counter!("listing_watcher_batches_total").increment(1);

        Ok(BatchReport {
            batch_id,
            results: outcome.results,
            stats,
            cancelled: outcome.cancelled,
        })
    }

    /// Run a batch in the background, streaming progress through the returned handle.
    pub fn spawn_batch(self: &Arc<Self>, tasks: Vec<ScrapingTask>, concurrency: Option<usize>) -> BatchHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let options = ExecuteOptions {
            concurrency,
            progress: Some(tx),
            cancel: Some(cancel.clone()),
        };

        let engine = Arc::clone(self);
        let join = tokio::spawn(async move { engine.execute(&tasks, options).await });

        BatchHandle {
            progress: rx,
            cancel,
            join,
        }
    }

    /// Shut the shared browser down. The next batch launches a new one.
    pub async fn close(&self) -> Result<()> {
        self.sessions.close().await
    }

    async fn run_task(&self, task: &ScrapingTask, cancel: &CancellationToken) -> Result<ScrapingResult> {
        let attempted = self
            .retry
            .run(&task.id, cancel, |_| self.attempt(task, cancel))
            .await;

        let result = match attempted.outcome {
            Ok(outcome) => outcome.into_result(task, attempted.attempts),
            Err(e) if e.is_systemic() => return Err(e),
            Err(AppError::Cancelled) => {
                ScrapingResult::failed(task, AppError::Cancelled.to_string(), attempted.attempts)
            }
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    url = %task.url,
                    attempts = attempted.attempts,
                    "Task failed: {}",
                    e
                );
                ScrapingResult::failed(task, e.to_string(), attempted.attempts)
            }
        };

        let status = if result.success { result.status.as_str() } else { "failed" };
        metrics::counter!("listing_watcher_results_total", "status" => status).increment(1);
        Ok(result)
    }

    /// One attempt on a fresh page that is closed before returning.
    async fn attempt(&self, task: &ScrapingTask, cancel: &CancellationToken) -> Result<ExtractionOutcome> {
        let mut guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            page = self.sessions.open_page() => page?,
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            outcome = self.extract_on(&mut guard, task) => outcome,
        };

        guard.close().await;
        outcome
    }

    async fn extract_on(&self, guard: &mut PageGuard, task: &ScrapingTask) -> Result<ExtractionOutcome> {
        let page = guard.session()?;
        page.install_request_filter(self.filter.clone()).await?;
        self.extractor.extract(page, task).await
    }
}
