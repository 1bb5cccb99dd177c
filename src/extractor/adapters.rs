use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use super::parse::{clean_text, parse_price, parse_stock};
use super::strategy::{EndedMarker, FieldChain, PageDocument};
use crate::models::{ListingSnapshot, Marketplace};

/// Marketplace-specific reading of a loaded listing page.
pub trait ListingAdapter: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    fn is_ended(&self, doc: &PageDocument) -> bool;

    fn extract(&self, doc: &PageDocument) -> ListingSnapshot;
}

/// An adapter described entirely by marker lists and per-field strategy chains.
pub struct RuleAdapter {
    marketplace: Marketplace,
    ended: Vec<EndedMarker>,
    price: FieldChain<Decimal>,
    stock: FieldChain<u32>,
    title: FieldChain<String>,
    condition: FieldChain<String>,
}

impl ListingAdapter for RuleAdapter {
    fn marketplace(&self) -> Marketplace {
        self.marketplace
    }

    fn is_ended(&self, doc: &PageDocument) -> bool {
        self.ended.iter().any(|marker| marker.is_present(doc))
    }

    fn extract(&self, doc: &PageDocument) -> ListingSnapshot {
        ListingSnapshot {
            price: self.price.resolve(doc),
            stock: self.stock.resolve(doc),
            title: self.title.resolve(doc),
            condition: self.condition.resolve(doc),
        }
    }
}

fn markers(selectors: &[&str], phrases: &[&str]) -> Vec<EndedMarker> {
    selectors
        .iter()
        .filter_map(|css| EndedMarker::selector(css))
        .chain(phrases.iter().map(|p| EndedMarker::body_text(p)))
        .collect()
}

impl RuleAdapter {
    /// Schema.org / OpenGraph markup plus common label heuristics.
    pub fn baseline() -> Self {
        Self {
            marketplace: Marketplace::Generic,
            ended: markers(
                &[
                    ".ClosedHeader",
                    ".listing-closed",
                    "[data-listing-status=\"closed\"]",
                    "[data-listing-status=\"ended\"]",
                ],
                &[
                    "このオークションは終了しています",
                    "販売終了",
                    "掲載終了",
                    "This listing has ended",
                    "This listing was ended",
                ],
            ),
            price: FieldChain::new("price")
                .selector_text("[data-testid=\"price\"]", parse_price)
                .selector_attr("[itemprop=\"price\"]", "content", parse_price)
                .selector_attr("meta[property=\"product:price:amount\"]", "content", parse_price)
                .selector_text(".price", parse_price)
                .label_adjacent(&["価格", "現在", "即決", "Price"], parse_price),
            stock: FieldChain::new("stock")
                .selector_text("[data-testid=\"stock\"]", parse_stock)
                .selector_attr("[itemprop=\"availability\"]", "href", parse_stock)
                .selector_attr("[itemprop=\"availability\"]", "content", parse_stock)
                .selector_text(".stock", parse_stock)
                .label_adjacent(&["在庫", "数量", "Quantity", "Stock"], parse_stock)
                .body_pattern(r"残り\s*(\d+)\s*点", parse_stock),
            title: FieldChain::new("title")
                .selector_text("h1", clean_text)
                .selector_attr("meta[property=\"og:title\"]", "content", clean_text)
                .selector_text("title", clean_text),
            condition: FieldChain::new("condition")
                .selector_text("[data-testid=\"condition\"]", clean_text)
                .selector_attr("[itemprop=\"itemCondition\"]", "content", clean_text)
                .label_adjacent(&["商品の状態", "状態", "Condition"], clean_text),
        }
    }

    pub fn yahoo_auctions() -> Self {
        Self {
            marketplace: Marketplace::YahooAuctions,
            ended: markers(
                &[".ClosedHeader", "#itemClosed", "[data-auction-status=\"closed\"]"],
                &["このオークションは終了しています", "オークションは終了しました"],
            ),
            price: FieldChain::new("price")
                .selector_text("[data-testid=\"auction-price\"]", parse_price)
                .selector_text(".Price--current .Price__value", parse_price)
                .selector_text(".Price__value", parse_price)
                .selector_text(".ProductPrice dd", parse_price)
                .label_adjacent(&["現在", "即決"], parse_price),
            stock: FieldChain::new("stock")
                .selector_text("[data-testid=\"quantity\"]", parse_stock)
                .label_adjacent(&["個数", "数量"], parse_stock),
            title: FieldChain::new("title")
                .selector_text("h1.ProductTitle__text", clean_text)
                .selector_text("h1", clean_text)
                .selector_attr("meta[property=\"og:title\"]", "content", clean_text),
            condition: FieldChain::new("condition")
                .selector_text("[data-testid=\"item-condition\"]", clean_text)
                .label_adjacent(&["商品の状態", "状態"], clean_text),
        }
    }

    pub fn mercari() -> Self {
        Self {
            marketplace: Marketplace::Mercari,
            ended: markers(
                &["[data-testid=\"sold-out-badge\"]", "[data-testid=\"item-deleted\"]"],
                &["この商品は売り切れました", "売り切れました", "この商品は削除されました"],
            ),
            price: FieldChain::new("price")
                .selector_text("[data-testid=\"price\"]", parse_price)
                .selector_text(".item-price", parse_price)
                .selector_attr("meta[name=\"product:price:amount\"]", "content", parse_price)
                .label_adjacent(&["価格"], parse_price),
            stock: FieldChain::new("stock")
                .selector_attr("[data-testid=\"checkout-button\"]", "data-stock", parse_stock),
            title: FieldChain::new("title")
                .selector_text("[data-testid=\"name\"] h1", clean_text)
                .selector_text("h1", clean_text),
            condition: FieldChain::new("condition")
                .selector_text("[data-testid=\"商品の状態\"]", clean_text)
                .label_adjacent(&["商品の状態"], clean_text),
        }
    }
}

/// Adapter lookup by marketplace, falling back to the baseline.
pub struct AdapterRegistry {
    adapters: HashMap<Marketplace, Arc<dyn ListingAdapter>>,
    fallback: Arc<dyn ListingAdapter>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(RuleAdapter::yahoo_auctions()));
        registry.register(Arc::new(RuleAdapter::mercari()));
        registry
    }
}

impl AdapterRegistry {
    /// Only the baseline adapter.
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
            fallback: Arc::new(RuleAdapter::baseline()),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ListingAdapter>) {
        self.adapters.insert(adapter.marketplace(), adapter);
    }

    pub fn get(&self, marketplace: Marketplace) -> Arc<dyn ListingAdapter> {
        self.adapters
            .get(&marketplace)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}
