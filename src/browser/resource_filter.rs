use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Network resource types as reported by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    Xhr,
    Fetch,
    WebSocket,
    Other,
}

impl ResourceKind {
    /// Sub-resources a listing page never needs for text extraction.
    pub const NON_ESSENTIAL: [ResourceKind; 4] = [
        ResourceKind::Image,
        ResourceKind::Font,
        ResourceKind::Stylesheet,
        ResourceKind::Media,
    ];
}

#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub url: String,
    pub kind: ResourceKind,
}

impl InterceptedRequest {
    pub fn new(url: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Allow,
    Abort,
}

#[derive(Debug, Default)]
struct FilterCounters {
    allowed: AtomicU64,
    aborted: AtomicU64,
}

/// Aborts requests for blocked resource kinds. Clones share their counters.
#[derive(Debug, Clone)]
pub struct ResourceFilter {
    blocked: Arc<HashSet<ResourceKind>>,
    counters: Arc<FilterCounters>,
}

impl Default for ResourceFilter {
    fn default() -> Self {
        Self::new(ResourceKind::NON_ESSENTIAL)
    }
}

impl ResourceFilter {
    pub fn new(blocked: impl IntoIterator<Item = ResourceKind>) -> Self {
        Self {
            blocked: Arc::new(blocked.into_iter().collect()),
            counters: Arc::new(FilterCounters::default()),
        }
    }

    pub fn is_blocked(&self, kind: ResourceKind) -> bool {
        self.blocked.contains(&kind)
    }

    pub fn decide(&self, request: &InterceptedRequest) -> FilterDecision {
        if self.is_blocked(request.kind) {
            self.counters.aborted.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("listing_watcher_requests_blocked_total").increment(1);
            debug!(url = %request.url, kind = ?request.kind, "aborting request");
            FilterDecision::Abort
        } else {
            self.counters.allowed.fetch_add(1, Ordering::Relaxed);
            FilterDecision::Allow
        }
    }

    pub fn allowed_count(&self) -> u64 {
        self.counters.allowed.load(Ordering::Relaxed)
    }

    pub fn aborted_count(&self) -> u64 {
        self.counters.aborted.load(Ordering::Relaxed)
    }
}
