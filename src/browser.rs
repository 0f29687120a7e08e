//! Headless browser integration for script-rendered pages.
//!
//! Only available when the `headless` Cargo feature is enabled. A single
//! long-lived browser process is shared across requests; each fetch opens
//! its own page and closes it on completion. Pages are the per-request
//! unit of isolation, not processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use crate::fetcher::{FetchSpec, FetchedPage, PageFetcher};
use crate::request::Viewport;
use crate::{Result, ScrapeError};

/// Poll interval while waiting for a caller-specified selector.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settle delay after a scroll-to-bottom, giving lazy content a chance to
/// land before extraction.
const SCROLL_SETTLE: Duration = Duration::from_millis(500);

/// Configuration for the browser pool.
#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    /// Maximum number of concurrent pages.
    pub max_pages: usize,
    /// Whether to run the browser in headless mode.
    pub headless: bool,
    /// Path to the Chrome/Chromium executable. If `None`, auto-detected.
    pub chrome_path: Option<String>,
    /// Proxy URL for the whole browser process to use.
    pub proxy_url: Option<String>,
    /// Additional launch arguments for Chrome.
    pub launch_args: Vec<String>,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            max_pages: 4,
            headless: true,
            chrome_path: None,
            proxy_url: None,
            launch_args: Vec::new(),
        }
    }
}

/// A live browser process plus the liveness flag its CDP handler task
/// owns. When the handler exits (process death, disconnect), the flag
/// flips and the next acquisition relaunches.
struct BrowserHandle {
    browser: Arc<Browser>,
    alive: Arc<AtomicBool>,
}

/// A shared pool managing a single browser process with page concurrency
/// control.
///
/// The browser is lazily launched on first acquisition. A semaphore limits
/// concurrent pages to prevent memory exhaustion. The pool is an
/// explicitly constructed component owned by the orchestrator's
/// composition root, so tests can run independent instances.
pub struct BrowserPool {
    config: BrowserPoolConfig,
    handle: Mutex<Option<BrowserHandle>>,
    page_semaphore: Arc<Semaphore>,
}

impl BrowserPool {
    /// Creates a new browser pool with the given configuration.
    pub fn new(config: BrowserPoolConfig) -> Self {
        let max_pages = config.max_pages;
        Self {
            config,
            handle: Mutex::new(None),
            page_semaphore: Arc::new(Semaphore::new(max_pages)),
        }
    }

    /// Returns the page semaphore for acquiring permits before opening pages.
    pub fn page_semaphore(&self) -> &Arc<Semaphore> {
        &self.page_semaphore
    }

    /// Lazily launches the browser and returns a shared handle, relaunching
    /// if the previous process disconnected.
    pub async fn acquire_browser(&self) -> Result<Arc<Browser>> {
        let mut guard = self.handle.lock().await;

        if let Some(ref handle) = *guard {
            if handle.alive.load(Ordering::SeqCst) {
                return Ok(Arc::clone(&handle.browser));
            }
            debug!("Cached browser disconnected, relaunching");
            *guard = None;
        }

        debug!("Launching headless browser");

        let mut builder = BrowserConfig::builder();

        if self.config.headless {
            builder = builder.arg("--headless=new");
        }

        if let Some(ref path) = self.config.chrome_path {
            builder = builder.chrome_executable(path);
        } else {
            let chrome_path = crate::browser_setup::find_chrome()?;
            debug!("Using browser at: {}", chrome_path.display());
            builder = builder.chrome_executable(chrome_path);
        }

        // Chrome's --headless=new mode injects "HeadlessChrome" into the UA,
        // which many sites detect and block.
        builder = builder.arg(
            "--user-agent=Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
             AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        );
        builder = builder.arg("--disable-blink-features=AutomationControlled");

        builder = builder
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-default-apps")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--mute-audio")
            .arg("--no-first-run");

        if let Some(ref proxy) = self.config.proxy_url {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        for arg in &self.config.launch_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScrapeError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapeError::Browser(format!("Failed to launch browser: {}", e)))?;

        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_handler = Arc::clone(&alive);

        // The CDP event handler runs until the connection drops; flipping
        // the flag is what triggers the relaunch above.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser CDP handler error: {}", e);
                }
            }
            alive_for_handler.store(false, Ordering::SeqCst);
            debug!("Browser CDP handler exited");
        });

        let browser = Arc::new(browser);
        *guard = Some(BrowserHandle {
            browser: Arc::clone(&browser),
            alive,
        });

        Ok(browser)
    }

    /// Shuts down the browser process.
    pub async fn shutdown(&self) {
        let mut guard = self.handle.lock().await;
        if guard.take().is_some() {
            debug!("Browser pool shut down");
        }
    }
}

/// A `PageFetcher` that renders pages in the shared headless browser.
///
/// Each `fetch()` opens a new page, configures it per the spec, navigates
/// with a bounded timeout, applies the optional wait/script/scroll steps,
/// captures a screenshot when asked, extracts the rendered markup, and
/// closes the page.
pub struct BrowserFetcher {
    pool: Arc<BrowserPool>,
}

impl BrowserFetcher {
    /// Creates a fetcher over the given pool.
    pub fn new(pool: Arc<BrowserPool>) -> Self {
        Self { pool }
    }

    async fn configure_page(&self, page: &Page, spec: &FetchSpec) -> Result<()> {
        let viewport = spec.browser.viewport.unwrap_or_default();
        self.set_viewport(page, viewport).await?;

        if let Some(ref user_agent) = spec.user_agent {
            page.set_user_agent(SetUserAgentOverrideParams::new(user_agent.clone()))
                .await
                .map_err(|e| ScrapeError::Browser(format!("Failed to set user agent: {}", e)))?;
        }

        if !spec.headers.is_empty() {
            let headers = serde_json::to_value(&spec.headers)
                .map_err(|e| ScrapeError::Browser(format!("Failed to encode headers: {}", e)))?;
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
                .await
                .map_err(|e| ScrapeError::Browser(format!("Failed to set headers: {}", e)))?;
        }

        Ok(())
    }

    async fn set_viewport(&self, page: &Page, viewport: Viewport) -> Result<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(viewport.width))
            .height(i64::from(viewport.height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| ScrapeError::Browser(format!("Failed to build viewport params: {}", e)))?;
        page.execute(params)
            .await
            .map_err(|e| ScrapeError::Browser(format!("Failed to set viewport: {}", e)))?;
        Ok(())
    }

    /// Polls for a selector until it appears or the budget runs out. A
    /// missing selector does not fail the fetch: the page may have loaded
    /// an error or challenge page, and extraction will report the misses.
    async fn wait_for_selector(&self, page: &Page, css: &str, timeout: Duration) {
        let waited = tokio::time::timeout(timeout, async {
            loop {
                if page.find_element(css).await.is_ok() {
                    return;
                }
                tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
            }
        })
        .await;

        if waited.is_err() {
            debug!(
                "Selector '{}' not found within {}ms, proceeding with current content",
                css,
                timeout.as_millis()
            );
        }
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, spec: &FetchSpec) -> Result<FetchedPage> {
        let _permit = self
            .pool
            .page_semaphore()
            .acquire()
            .await
            .map_err(|e| ScrapeError::Browser(format!("Page semaphore closed: {}", e)))?;

        let browser = self.pool.acquire_browser().await?;
        let timeout = Duration::from_millis(spec.timeout_ms);

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Browser(format!("Failed to open page: {}", e)))?;

        // Drive the page inside a closure so the page is always closed,
        // success or failure.
        let outcome = self.drive_page(&page, spec, timeout).await;

        if let Err(e) = page.close().await {
            warn!("Failed to close browser page: {}", e);
        }

        outcome
    }
}

impl BrowserFetcher {
    async fn drive_page(
        &self,
        page: &Page,
        spec: &FetchSpec,
        timeout: Duration,
    ) -> Result<FetchedPage> {
        self.configure_page(page, spec).await?;

        let navigation = async {
            page.goto(spec.url.as_str())
                .await
                .map_err(|e| ScrapeError::Browser(format!("Navigation failed: {}", e)))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| ScrapeError::Browser(format!("Navigation wait failed: {}", e)))?;
            Ok::<(), ScrapeError>(())
        };
        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| ScrapeError::Timeout)??;

        if let Some(ref css) = spec.browser.wait_for_selector {
            self.wait_for_selector(page, css, timeout).await;
        }

        if let Some(ref script) = spec.browser.page_script {
            page.evaluate(script.as_str())
                .await
                .map_err(|e| ScrapeError::Browser(format!("Page script failed: {}", e)))?;
        }

        if spec.browser.scroll_to_bottom {
            page.evaluate("window.scrollTo(0, document.body.scrollHeight)")
                .await
                .map_err(|e| ScrapeError::Browser(format!("Scroll failed: {}", e)))?;
            tokio::time::sleep(SCROLL_SETTLE).await;
        }

        let screenshot = if spec.browser.screenshot {
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build();
            match page.screenshot(params).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Screenshot capture failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let html = page
            .content()
            .await
            .map_err(|e| ScrapeError::Browser(format!("Failed to get page content: {}", e)))?;

        let content_length = Some(html.len() as u64);
        Ok(FetchedPage {
            html,
            status: None,
            content_type: None,
            content_length,
            screenshot,
        })
    }
}
