use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Selects which extraction adapter inspects a listing page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Marketplace {
    #[default]
    Generic,
    YahooAuctions,
    Mercari,
}

impl Marketplace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Marketplace::Generic => "generic",
            Marketplace::YahooAuctions => "yahoo_auctions",
            Marketplace::Mercari => "mercari",
        }
    }
}

impl FromStr for Marketplace {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to the baseline adapter.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Ok(match normalized.as_str() {
            "yahoo" | "yahoo_auction" | "yahoo_auctions" | "yahoo_auction_jp" => {
                Marketplace::YahooAuctions
            }
            "mercari" | "mercari_jp" => Marketplace::Mercari,
            _ => Marketplace::Generic,
        })
    }
}

impl From<String> for Marketplace {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl From<Marketplace> for String {
    fn from(value: Marketplace) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ScrapingTask {
    #[validate(length(min = 1, message = "task id cannot be empty"))]
    pub id: String,
    #[validate(url(message = "task url must be an absolute URL"))]
    pub url: String,
    #[serde(default)]
    pub marketplace: Marketplace,
}

impl ScrapingTask {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            marketplace: Marketplace::default(),
        }
    }

    pub fn with_marketplace(mut self, marketplace: Marketplace) -> Self {
        self.marketplace = marketplace;
        self
    }
}
