use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{BrowserHandle, BrowserLauncher, PageSession};
use crate::{AppError, Result};

#[derive(Debug, Default)]
struct PageCounters {
    open: AtomicUsize,
    peak: AtomicUsize,
}

/// Owns the single shared browser and hands out one fresh page per attempt.
///
/// The browser is launched on first use and lives until [`SessionManager::close`]
/// is called; dropping the manager does not close it.
pub struct SessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    browser: Mutex<Option<Arc<dyn BrowserHandle>>>,
    pages: Arc<PageCounters>,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            browser: Mutex::new(None),
            pages: Arc::new(PageCounters::default()),
        }
    }

    /// Launch the shared browser unless it is already running.
    pub async fn init(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if browser.is_some() {
            debug!("Browser already initialized");
            return Ok(());
        }

        *browser = Some(self.launch().await?);
        info!("Shared browser launched");
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.browser.lock().await.is_some()
    }

    /// Shut the shared browser down. Safe to call repeatedly.
    pub async fn close(&self) -> Result<()> {
        let browser = self.browser.lock().await.take();
        if let Some(browser) = browser {
            browser.shutdown().await?;
            info!("Shared browser closed");
        }
        Ok(())
    }

    /// Open a fresh page. If the browser died underneath us it is relaunched once.
    pub async fn open_page(&self) -> Result<PageGuard> {
        let browser = self.current().await?;

        let page = match browser.new_page().await {
            Ok(page) => page,
            Err(e) if !browser.is_connected().await => {
                warn!("Browser disconnected ({}), relaunching", e);
                let fresh = self.relaunch(&browser).await?;
                fresh.new_page().await?
            }
            Err(e) => return Err(e),
        };

        Ok(PageGuard::new(page, Arc::clone(&self.pages)))
    }

    pub fn open_pages(&self) -> usize {
        self.pages.open.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open pages seen so far.
    pub fn peak_open_pages(&self) -> usize {
        self.pages.peak.load(Ordering::SeqCst)
    }

    async fn current(&self) -> Result<Arc<dyn BrowserHandle>> {
        let mut browser = self.browser.lock().await;
        match browser.as_ref() {
            Some(existing) => Ok(Arc::clone(existing)),
            None => {
                let launched = self.launch().await?;
                *browser = Some(Arc::clone(&launched));
                info!("Shared browser launched");
                Ok(launched)
            }
        }
    }

    async fn relaunch(&self, stale: &Arc<dyn BrowserHandle>) -> Result<Arc<dyn BrowserHandle>> {
        let mut browser = self.browser.lock().await;

        // Another task may already have replaced it.
        if let Some(current) = browser.as_ref() {
            if !std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(stale)) {
                return Ok(Arc::clone(current));
            }
        }

        if let Err(e) = stale.shutdown().await {
            debug!("Ignoring shutdown error of dead browser: {}", e);
        }
        *browser = None;

        let launched = self.launch().await?;
        *browser = Some(Arc::clone(&launched));
        metrics::counter!("listing_watcher_browser_relaunches_total").increment(1);
        info!("Shared browser relaunched");
        Ok(launched)
    }

    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>> {
        self.launcher.launch().await.map_err(|e| match e {
            AppError::BrowserLaunch(_) => e,
            other => AppError::BrowserLaunch(other.to_string()),
        })
    }
}

/// A page that is closed by [`PageGuard::close`] or, failing that, in the
/// background when the guard is dropped.
pub struct PageGuard {
    page: Option<Box<dyn PageSession>>,
    counters: Arc<PageCounters>,
}

impl PageGuard {
    fn new(page: Box<dyn PageSession>, counters: Arc<PageCounters>) -> Self {
        let open = counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(open, Ordering::SeqCst);
        Self {
            page: Some(page),
            counters,
        }
    }

    pub fn session(&mut self) -> Result<&mut (dyn PageSession + 'static)> {
        self.page
            .as_deref_mut()
            .ok_or_else(|| AppError::Internal("page already closed".to_string()))
    }

    pub async fn close(mut self) {
        if let Some(mut page) = self.page.take() {
            self.counters.open.fetch_sub(1, Ordering::SeqCst);
            if let Err(e) = page.close().await {
                warn!("Failed to close page: {}", e);
            }
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        let Some(mut page) = self.page.take() else {
            return;
        };
        self.counters.open.fetch_sub(1, Ordering::SeqCst);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Page dropped while open, closing in background");
                handle.spawn(async move {
                    if let Err(e) = page.close().await {
                        warn!("Failed to close dropped page: {}", e);
                    }
                });
            }
            Err(_) => warn!("Page dropped outside a runtime; left to the browser to reap"),
        }
    }
}
