use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{trace, warn};

/// A parsed listing page. Lives only inside synchronous inspection code.
pub struct PageDocument {
    html: Html,
    body_text: String,
}

impl PageDocument {
    pub fn parse(source: &str) -> Self {
        let html = Html::parse_document(source);
        let body_text = match Selector::parse("body") {
            Ok(body) => html
                .select(&body)
                .next()
                .map(|el| el.text().collect::<Vec<_>>().join(" "))
                .unwrap_or_default(),
            Err(_) => String::new(),
        };
        Self { html, body_text }
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn body_text(&self) -> &str {
        &self.body_text
    }

    pub fn matches(&self, selector: &Selector) -> bool {
        self.html.select(selector).next().is_some()
    }
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

pub type Parser<T> = fn(&str) -> Option<T>;

/// One way of reading a field off a page. `None` means "no match, try the next one".
pub trait FieldStrategy<T>: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, doc: &PageDocument) -> Option<T>;
}

/// Text content of elements matching a CSS selector.
pub struct SelectorText<T> {
    css: String,
    selector: Selector,
    parse: Parser<T>,
}

impl<T> FieldStrategy<T> for SelectorText<T> {
    fn name(&self) -> &str {
        &self.css
    }

    fn extract(&self, doc: &PageDocument) -> Option<T> {
        doc.html()
            .select(&self.selector)
            .find_map(|el| (self.parse)(&element_text(&el)))
    }
}

/// An attribute of elements matching a CSS selector, e.g. `meta[itemprop=price]@content`.
pub struct SelectorAttr<T> {
    name: String,
    selector: Selector,
    attr: String,
    parse: Parser<T>,
}

impl<T> FieldStrategy<T> for SelectorAttr<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, doc: &PageDocument) -> Option<T> {
        doc.html()
            .select(&self.selector)
            .filter_map(|el| el.value().attr(&self.attr))
            .find_map(|value| (self.parse)(value))
    }
}

/// Finds a short label element ("価格", "Price:") and reads the value next to it.
pub struct LabelAdjacent<T> {
    name: String,
    labels: Vec<String>,
    candidates: Selector,
    parse: Parser<T>,
}

const LABEL_CANDIDATES: &str = "dt, th, td, span, div, p, li, label, b, strong";
const MAX_INLINE_LABEL_LEN: usize = 48;

impl<T> LabelAdjacent<T> {
    fn label_of<'a>(&self, text: &'a str) -> Option<(&str, &'a str)> {
        self.labels.iter().find_map(|label| {
            text.strip_prefix(label.as_str())
                .map(|rest| (label.as_str(), rest.trim_start_matches([':', '：', ' '])))
        })
    }
}

impl<T> FieldStrategy<T> for LabelAdjacent<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, doc: &PageDocument) -> Option<T> {
        for element in doc.html().select(&self.candidates) {
            let text = element_text(&element);
            if text.chars().count() > MAX_INLINE_LABEL_LEN {
                continue;
            }
            let Some((_, rest)) = self.label_of(&text) else {
                continue;
            };

            // "Price: ¥1,000" inside the label element itself
            if !rest.trim().is_empty() {
                if let Some(value) = (self.parse)(rest) {
                    return Some(value);
                }
            }

            let sibling = element.next_siblings().filter_map(ElementRef::wrap).next();
            if let Some(value) = sibling.and_then(|s| (self.parse)(&element_text(&s))) {
                return Some(value);
            }
        }
        None
    }
}

/// First capture group of a regex run over the whole body text.
pub struct BodyPattern<T> {
    name: String,
    regex: Regex,
    parse: Parser<T>,
}

impl<T> FieldStrategy<T> for BodyPattern<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, doc: &PageDocument) -> Option<T> {
        self.regex
            .captures_iter(doc.body_text())
            .filter_map(|c| c.get(1))
            .find_map(|m| (self.parse)(m.as_str()))
    }
}

/// Priority-ordered strategies for one field; the first match wins.
pub struct FieldChain<T> {
    field: &'static str,
    strategies: Vec<Box<dyn FieldStrategy<T>>>,
}

impl<T: 'static> FieldChain<T> {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            strategies: Vec::new(),
        }
    }

    pub fn push(mut self, strategy: Box<dyn FieldStrategy<T>>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn selector_text(self, css: &str, parse: Parser<T>) -> Self {
        match Selector::parse(css) {
            Ok(selector) => self.push(Box::new(SelectorText {
                css: css.to_string(),
                selector,
                parse,
            })),
            Err(e) => {
                warn!(field = self.field, css, "Skipping invalid selector: {:?}", e);
                self
            }
        }
    }

    pub fn selector_attr(self, css: &str, attr: &str, parse: Parser<T>) -> Self {
        match Selector::parse(css) {
            Ok(selector) => self.push(Box::new(SelectorAttr {
                name: format!("{}@{}", css, attr),
                selector,
                attr: attr.to_string(),
                parse,
            })),
            Err(e) => {
                warn!(field = self.field, css, "Skipping invalid selector: {:?}", e);
                self
            }
        }
    }

    pub fn label_adjacent(self, labels: &[&str], parse: Parser<T>) -> Self {
        match Selector::parse(LABEL_CANDIDATES) {
            Ok(candidates) => self.push(Box::new(LabelAdjacent {
                name: format!("label:{}", labels.join("|")),
                labels: labels.iter().map(|l| l.to_string()).collect(),
                candidates,
                parse,
            })),
            Err(e) => {
                warn!(field = self.field, "Skipping label heuristic: {:?}", e);
                self
            }
        }
    }

    pub fn body_pattern(self, pattern: &str, parse: Parser<T>) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => self.push(Box::new(BodyPattern {
                name: format!("body:{}", pattern),
                regex,
                parse,
            })),
            Err(e) => {
                warn!(field = self.field, pattern, "Skipping invalid pattern: {}", e);
                self
            }
        }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn resolve(&self, doc: &PageDocument) -> Option<T> {
        self.strategies.iter().find_map(|strategy| {
            let value = strategy.extract(doc)?;
            trace!(field = self.field, strategy = strategy.name(), "field matched");
            Some(value)
        })
    }
}

/// Signals that a listing is closed.
pub enum EndedMarker {
    Selector(Selector),
    BodyText(String),
}

impl EndedMarker {
    pub fn selector(css: &str) -> Option<Self> {
        match Selector::parse(css) {
            Ok(selector) => Some(EndedMarker::Selector(selector)),
            Err(e) => {
                warn!(css, "Skipping invalid ended marker: {:?}", e);
                None
            }
        }
    }

    pub fn body_text(text: &str) -> Self {
        EndedMarker::BodyText(text.to_lowercase())
    }

    pub fn is_present(&self, doc: &PageDocument) -> bool {
        match self {
            EndedMarker::Selector(selector) => doc.matches(selector),
            EndedMarker::BodyText(text) => doc.body_text().to_lowercase().contains(text.as_str()),
        }
    }
}
