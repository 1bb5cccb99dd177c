use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

static PRICE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)").expect("price regex is valid")
});

static INTEGER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*").expect("integer regex is valid"));

const OUT_OF_STOCK_PHRASES: &[&str] = &[
    "在庫なし",
    "在庫切れ",
    "売り切れ",
    "品切れ",
    "sold out",
    "out of stock",
    "not in stock",
    "outofstock",
    "soldout",
    "unavailable",
];

const IN_STOCK_PHRASES: &[&str] = &["在庫あり", "in stock", "instock", "available"];

/// First monetary amount in `text`, ignoring currency symbols and thousands separators.
/// Zero amounts count as no match.
pub fn parse_price(text: &str) -> Option<Decimal> {
    let captures = PRICE_REGEX.captures(text)?;
    let amount = captures.get(1)?.as_str().replace(',', "");
    let price = Decimal::from_str(&amount).ok()?;
    if price.is_zero() { None } else { Some(price) }
}

/// Interpret a stock field. Out-of-stock phrases read as 0 and in-stock phrases
/// as 1, both ahead of any digits; otherwise the first embedded integer.
pub fn parse_stock(text: &str) -> Option<u32> {
    let lowered = text.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    if OUT_OF_STOCK_PHRASES.iter().any(|p| lowered.contains(p)) {
        return Some(0);
    }

    if IN_STOCK_PHRASES.iter().any(|p| lowered.contains(p)) {
        return Some(1);
    }

    let found = INTEGER_REGEX.find(&lowered)?;
    found.as_str().replace(',', "").parse().ok()
}

/// Collapse whitespace runs; empty strings become `None`.
pub fn clean_text(text: &str) -> Option<String> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() { None } else { Some(cleaned) }
}
