//! Browser abstraction used by the scraping engine.
//!
//! The engine only talks to these traits; `chrome` provides the real
//! headless Chrome backend and tests plug in scripted fakes.

pub mod chrome;
pub mod resource_filter;
pub mod session;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::Result;

pub use chrome::ChromeLauncher;
pub use resource_filter::{FilterDecision, InterceptedRequest, ResourceFilter, ResourceKind};
pub use session::{PageGuard, SessionManager};

/// What the main-frame navigation came back with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResponse {
    /// HTTP status of the document response, 0 when the browser could not report one.
    pub status: u16,
    pub final_url: String,
}

/// One isolated tab, used for exactly one task attempt.
#[async_trait]
pub trait PageSession: Send {
    /// Route every outgoing request of this page through `filter`.
    async fn install_request_filter(&mut self, filter: ResourceFilter) -> Result<()>;

    /// Navigate and wait for DOM ready. `Ok(None)` means the browser produced no response at all.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<Option<NavigationResponse>>;

    /// Serialized DOM of the current document.
    async fn content(&mut self) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}

/// The shared browser process.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageSession>>;

    async fn is_connected(&self) -> bool;

    async fn shutdown(&self) -> Result<()>;
}

/// Starts browser processes. Launch failures are systemic.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>>;
}
