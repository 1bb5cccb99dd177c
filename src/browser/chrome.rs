use async_trait::async_trait;
use headless_chrome::browser::tab::RequestPausedDecision;
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::{FailRequest, RequestPattern, RequestStage};
use headless_chrome::protocol::cdp::Network::{ErrorReason, ResourceType};
use headless_chrome::util::Wait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    BrowserHandle, BrowserLauncher, FilterDecision, InterceptedRequest, NavigationResponse,
    PageSession, ResourceFilter, ResourceKind,
};
use crate::config::ScraperConfig;
use crate::{AppError, Result};

/// Extra time granted to a blocking CDP call beyond its own timeout before the tab is abandoned.
const HARD_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

const NAVIGATION_ENTRY_JS: &str = r#"
(() => {
    const entry = performance.getEntriesByType('navigation')[0];
    if (!entry) {
        return null;
    }
    return JSON.stringify({ status: entry.responseStatus || 0, url: location.href });
})()
"#;

/// True once the new document has been parsed. Fresh tabs sit on a complete
/// `about:blank` until the navigation commits.
const DOM_READY_JS: &str = "location.href !== 'about:blank' && document.readyState !== 'loading'";

const DOM_READY_POLL: Duration = Duration::from_millis(50);

/// Launches a local headless Chrome process.
pub struct ChromeLauncher {
    config: ScraperConfig,
}

impl ChromeLauncher {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>> {
        let config = self.config.clone();

        let browser = tokio::task::spawn_blocking(move || -> anyhow::Result<Browser> {
            let mut args: Vec<&OsStr> = vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-background-timer-throttling"),
                OsStr::new("--disable-backgrounding-occluded-windows"),
                OsStr::new("--disable-renderer-backgrounding"),
            ];
            args.extend(config.extra_args.iter().map(OsStr::new));

            let mut launch_options = LaunchOptions::default_builder()
                .headless(config.headless)
                .sandbox(false)
                .idle_browser_timeout(Duration::from_secs(config.idle_browser_timeout_secs))
                .args(args)
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to create launch options: {}", e))?;

            if let Some(chrome_path) = &config.chrome_path {
                launch_options.path = Some(PathBuf::from(chrome_path));
            }

            Browser::new(launch_options)
        })
        .await
        .map_err(|e| AppError::BrowserLaunch(e.to_string()))?
        .map_err(|e| AppError::BrowserLaunch(e.to_string()))?;

        info!(headless = self.config.headless, "Chrome process started");

        Ok(Arc::new(ChromeBrowser {
            browser: Mutex::new(Some(browser)),
            user_agent: self.config.user_agent.clone(),
        }))
    }
}

pub struct ChromeBrowser {
    browser: Mutex<Option<Browser>>,
    user_agent: Option<String>,
}

impl ChromeBrowser {
    async fn handle(&self) -> Result<Browser> {
        self.browser
            .lock()
            .await
            .clone()
            .ok_or_else(|| AppError::Browser("browser already shut down".to_string()))
    }
}

#[async_trait]
impl BrowserHandle for ChromeBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageSession>> {
        let browser = self.handle().await?;
        let user_agent = self.user_agent.clone();

        let tab = tokio::task::spawn_blocking(move || -> anyhow::Result<Arc<Tab>> {
            let tab = browser.new_tab()?;
            if let Some(user_agent) = user_agent.as_deref() {
                tab.set_user_agent(user_agent, None, None)?;
            }
            Ok(tab)
        })
        .await?
        .map_err(|e| AppError::Browser(format!("Failed to create tab: {}", e)))?;

        Ok(Box::new(ChromePage {
            tab,
            filter_installed: false,
            closed: false,
        }))
    }

    async fn is_connected(&self) -> bool {
        let Ok(browser) = self.handle().await else {
            return false;
        };
        tokio::task::spawn_blocking(move || browser.get_version().is_ok())
            .await
            .unwrap_or(false)
    }

    async fn shutdown(&self) -> Result<()> {
        // Dropping the last handle kills the Chrome process.
        if let Some(browser) = self.browser.lock().await.take() {
            tokio::task::spawn_blocking(move || drop(browser)).await?;
        }
        Ok(())
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
    filter_installed: bool,
    closed: bool,
}

impl ChromePage {
    fn abandon(&self) {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = tab.close(false) {
                debug!("Closing stuck tab failed: {}", e);
            }
        });
    }
}

#[async_trait]
impl PageSession for ChromePage {
    async fn install_request_filter(&mut self, filter: ResourceFilter) -> Result<()> {
        if self.filter_installed {
            debug!("Request filter already installed on this page");
            return Ok(());
        }

        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let patterns = vec![RequestPattern {
                url_pattern: Some("*".to_string()),
                resource_Type: None,
                request_stage: Some(RequestStage::Request),
            }];
            tab.enable_fetch(Some(patterns.as_slice()), None)?;
            tab.enable_request_interception(Arc::new(
                move |_transport: Arc<Transport>,
                      _session_id: SessionId,
                      event: RequestPausedEvent|
                      -> RequestPausedDecision {
                    let request = InterceptedRequest::new(
                        event.params.request.url.clone(),
                        resource_kind(&event.params.resource_Type),
                    );
                    match filter.decide(&request) {
                        FilterDecision::Abort => RequestPausedDecision::Fail(FailRequest {
                            request_id: event.params.request_id,
                            error_reason: ErrorReason::BlockedByClient,
                        }),
                        FilterDecision::Allow => RequestPausedDecision::Continue(None),
                    }
                },
            ))?;
            Ok(())
        })
        .await?
        .map_err(|e| AppError::Browser(format!("Failed to install request filter: {}", e)))?;

        self.filter_installed = true;
        Ok(())
    }

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<Option<NavigationResponse>> {
        let tab = Arc::clone(&self.tab);
        let target = url.to_string();

        let handle = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<NavigationResponse>> {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&target)?;
            // DOMContentLoaded is enough; the full load event is not awaited
            Wait::new(timeout, DOM_READY_POLL)
                .until(|| {
                    let ready = tab.evaluate(DOM_READY_JS, false).ok()?;
                    is_dom_ready(ready.value.as_ref()).then_some(())
                })
                .map_err(|_| anyhow::anyhow!("DOM not ready within {}ms", timeout.as_millis()))?;
            let entry = tab.evaluate(NAVIGATION_ENTRY_JS, false)?;
            let response = parse_navigation_entry(entry.value);
            if let Some(response) = &response {
                if response.final_url.starts_with("chrome-error://") {
                    anyhow::bail!("browser rendered an error page");
                }
            }
            Ok(response)
        });

        match tokio::time::timeout(timeout + HARD_TIMEOUT_GRACE, handle).await {
            Err(_) => {
                warn!(url, "Navigation hard timeout, abandoning tab");
                self.abandon();
                Err(AppError::Timeout {
                    operation: format!("navigation to {}", url),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Ok(joined) => joined?.map_err(|e| AppError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn content(&mut self) -> Result<String> {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || tab.get_content())
            .await?
            .map_err(|e| AppError::Dom(format!("Failed to get page content: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || tab.close(false))
            .await?
            .map_err(|e| AppError::Browser(format!("Failed to close tab: {}", e)))?;
        Ok(())
    }
}

fn resource_kind(resource_type: &ResourceType) -> ResourceKind {
    match resource_type {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Media => ResourceKind::Media,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Xhr => ResourceKind::Xhr,
        ResourceType::Fetch => ResourceKind::Fetch,
        ResourceType::WebSocket => ResourceKind::WebSocket,
        _ => ResourceKind::Other,
    }
}

fn is_dom_ready(value: Option<&serde_json::Value>) -> bool {
    matches!(value, Some(serde_json::Value::Bool(true)))
}

#[derive(Debug, Deserialize)]
struct NavigationEntry {
    status: u16,
    url: String,
}

/// Decode the JSON string produced by `NAVIGATION_ENTRY_JS`.
fn parse_navigation_entry(value: Option<serde_json::Value>) -> Option<NavigationResponse> {
    let raw = value?;
    let entry: NavigationEntry = serde_json::from_str(raw.as_str()?).ok()?;
    Some(NavigationResponse {
        status: entry.status,
        final_url: entry.url,
    })
}
