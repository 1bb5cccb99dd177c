use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::task::{Marketplace, ScrapingTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Ended,
    NotFound,
    Deleted,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Ended => "ended",
            ListingStatus::NotFound => "not_found",
            ListingStatus::Deleted => "deleted",
        }
    }
}

/// Fields read off an active listing page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub price: Option<Decimal>,
    pub stock: Option<u32>,
    pub title: Option<String>,
    pub condition: Option<String>,
}

impl ListingSnapshot {
    /// A listing counts as purchasable unless its stock explicitly reads zero.
    pub fn is_available(&self) -> bool {
        self.stock.is_none_or(|stock| stock > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapingResult {
    pub product_id: String,
    pub url: String,
    pub marketplace: Marketplace,
    pub success: bool,
    pub is_available: bool,
    pub status: ListingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapingResult {
    fn base(task: &ScrapingTask, status: ListingStatus, attempts: u32) -> Self {
        Self {
            product_id: task.id.clone(),
            url: task.url.clone(),
            marketplace: task.marketplace,
            success: true,
            is_available: false,
            status,
            price: None,
            stock: None,
            title: None,
            condition: None,
            error: None,
            attempts,
            scraped_at: Utc::now(),
        }
    }

    pub fn active(task: &ScrapingTask, snapshot: ListingSnapshot, attempts: u32) -> Self {
        let mut result = Self::base(task, ListingStatus::Active, attempts);
        result.is_available = snapshot.is_available();
        // a sold-out listing reports no details
        if result.is_available {
            result.price = snapshot.price;
            result.stock = snapshot.stock;
            result.title = snapshot.title;
            result.condition = snapshot.condition;
        }
        result
    }

    pub fn ended(task: &ScrapingTask, attempts: u32) -> Self {
        let mut result = Self::base(task, ListingStatus::Ended, attempts);
        result.price = Some(Decimal::ZERO);
        result.stock = Some(0);
        result
    }

    pub fn not_found(task: &ScrapingTask, attempts: u32) -> Self {
        Self::base(task, ListingStatus::NotFound, attempts)
    }

    pub fn deleted(task: &ScrapingTask, attempts: u32) -> Self {
        Self::base(task, ListingStatus::Deleted, attempts)
    }

    /// The page could not be rendered or read, so nothing about the listing
    /// was confirmed.
    pub fn failed(task: &ScrapingTask, error: impl Into<String>, attempts: u32) -> Self {
        let mut result = Self::base(task, ListingStatus::NotFound, attempts);
        result.success = false;
        result.error = Some(error.into());
        result
    }
}
