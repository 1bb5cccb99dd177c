//! Turns a loaded listing page into a listing outcome.
//!
//! Navigation and page content are async and go through [`PageSession`];
//! DOM inspection is synchronous and never crosses an await point.

pub mod adapters;
pub mod parse;
pub mod strategy;

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::browser::{NavigationResponse, PageSession};
use crate::models::{ListingSnapshot, ListingStatus, Marketplace, ScrapingResult, ScrapingTask};
use crate::{AppError, Result};

pub use adapters::{AdapterRegistry, ListingAdapter, RuleAdapter};
pub use strategy::{EndedMarker, FieldChain, FieldStrategy, PageDocument};

/// A terminal observation about one listing.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Active(ListingSnapshot),
    Ended,
    NotFound,
    Deleted,
}

impl ExtractionOutcome {
    pub fn status(&self) -> ListingStatus {
        match self {
            ExtractionOutcome::Active(_) => ListingStatus::Active,
            ExtractionOutcome::Ended => ListingStatus::Ended,
            ExtractionOutcome::NotFound => ListingStatus::NotFound,
            ExtractionOutcome::Deleted => ListingStatus::Deleted,
        }
    }

    pub fn into_result(self, task: &ScrapingTask, attempts: u32) -> ScrapingResult {
        match self {
            ExtractionOutcome::Active(snapshot) => ScrapingResult::active(task, snapshot, attempts),
            ExtractionOutcome::Ended => ScrapingResult::ended(task, attempts),
            ExtractionOutcome::NotFound => ScrapingResult::not_found(task, attempts),
            ExtractionOutcome::Deleted => ScrapingResult::deleted(task, attempts),
        }
    }
}

/// What the navigation response alone tells us.
enum ResponseClass {
    NotFound,
    Deleted,
    Inspect,
}

fn classify_response(url: &str, response: Option<&NavigationResponse>) -> Result<ResponseClass> {
    let Some(response) = response else {
        return Ok(ResponseClass::NotFound);
    };

    match response.status {
        404 => Ok(ResponseClass::NotFound),
        410 => Ok(ResponseClass::Deleted),
        status @ 500..=599 => Err(AppError::UpstreamStatus {
            url: url.to_string(),
            status,
        }),
        // 0: the browser could not report a status, judge by the page itself
        _ => Ok(ResponseClass::Inspect),
    }
}

pub struct ListingExtractor {
    registry: AdapterRegistry,
    navigation_timeout: Duration,
}

impl ListingExtractor {
    pub fn new(registry: AdapterRegistry, navigation_timeout: Duration) -> Self {
        Self {
            registry,
            navigation_timeout,
        }
    }

    pub fn adapter(&self, marketplace: Marketplace) -> Arc<dyn ListingAdapter> {
        self.registry.get(marketplace)
    }

    /// Run one attempt on a fresh page.
    pub async fn extract(
        &self,
        page: &mut dyn PageSession,
        task: &ScrapingTask,
    ) -> Result<ExtractionOutcome> {
        let response = page.navigate(&task.url, self.navigation_timeout).await?;

        match classify_response(&task.url, response.as_ref())? {
            ResponseClass::NotFound => {
                debug!(task_id = %task.id, "Listing not found");
                return Ok(ExtractionOutcome::NotFound);
            }
            ResponseClass::Deleted => {
                debug!(task_id = %task.id, "Listing deleted");
                return Ok(ExtractionOutcome::Deleted);
            }
            ResponseClass::Inspect => {}
        }

        let html = page.content().await?;
        Ok(self.inspect(task.marketplace, &html))
    }

    /// Pure DOM inspection of already-fetched page content.
    pub fn inspect(&self, marketplace: Marketplace, html: &str) -> ExtractionOutcome {
        let doc = PageDocument::parse(html);
        let adapter = self.registry.get(marketplace);

        if adapter.is_ended(&doc) {
            return ExtractionOutcome::Ended;
        }
        ExtractionOutcome::Active(adapter.extract(&doc))
    }
}
