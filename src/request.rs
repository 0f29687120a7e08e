//! Scrape request representation.
//!
//! A [`ScrapeRequest`] enumerates every recognized option with an explicit
//! default and is validated once at the orchestrator boundary. Requests are
//! treated as immutable once dispatched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Result, ScrapeError};

/// Fetch strategy for a target URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchEngine {
    /// Plain HTTP request, markup parsed without executing scripts.
    #[default]
    Lightweight,
    /// Full headless browser rendering before extraction.
    Browser,
}

impl std::fmt::Display for FetchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchEngine::Lightweight => write!(f, "lightweight"),
            FetchEngine::Browser => write!(f, "browser"),
        }
    }
}

/// Which representations to extract for each matched element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Extract the element's visible text.
    #[serde(default = "default_true")]
    pub text: bool,
    /// Extract the element's raw markup.
    #[serde(default)]
    pub html: bool,
    /// Extract specific attributes by name.
    #[serde(default)]
    pub attributes: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            text: true,
            html: false,
            attributes: Vec::new(),
        }
    }
}

impl ExtractOptions {
    /// Number of extraction modes enabled. A single mode yields bare
    /// scalars; more than one yields structured objects per element.
    pub fn mode_count(&self) -> usize {
        usize::from(self.text) + usize::from(self.html) + usize::from(!self.attributes.is_empty())
    }
}

/// Browser viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// Options that only apply when the browser engine renders the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserOptions {
    /// CSS selector to wait for after navigation.
    #[serde(default)]
    pub wait_for_selector: Option<String>,
    /// JavaScript to evaluate in the page before extraction.
    #[serde(default)]
    pub page_script: Option<String>,
    /// Scroll to the bottom of the page to trigger lazy content.
    #[serde(default)]
    pub scroll_to_bottom: bool,
    /// Capture a screenshot of the rendered page.
    #[serde(default)]
    pub screenshot: bool,
    /// Viewport override.
    #[serde(default)]
    pub viewport: Option<Viewport>,
}

/// Proxy usage toggle and selection filters for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyPreferences {
    /// Route the fetch through the proxy pool.
    #[serde(default)]
    pub enabled: bool,
    /// Restrict selection to proxies tagged with this country code.
    #[serde(default)]
    pub country: Option<String>,
    /// Restrict selection to a proxy class (by its serialized name).
    #[serde(default)]
    pub class: Option<String>,
    /// Drop candidates scoring below this threshold.
    #[serde(default)]
    pub min_score: Option<f64>,
}

/// Tenant/user context supplied by the caller, used for proxy scoping
/// and usage logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// A scrape request with all parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    /// Target URL.
    pub url: String,
    /// Named field to CSS selector mapping.
    #[serde(default)]
    pub selectors: BTreeMap<String, String>,
    /// Extraction flags applied to every field.
    #[serde(default)]
    pub extract: ExtractOptions,
    /// Include the full raw markup in the result.
    #[serde(default)]
    pub include_raw_html: bool,
    /// Per-attempt fetch timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Number of retries after the first attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Base inter-retry delay in milliseconds; backoff is linear in the
    /// attempt number.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Custom request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Custom user agent.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Explicit engine override. When set, routing is skipped entirely.
    #[serde(default)]
    pub engine: Option<FetchEngine>,
    /// Browser-only options.
    #[serde(default)]
    pub browser: BrowserOptions,
    /// Proxy usage toggle and filters.
    #[serde(default)]
    pub proxy: ProxyPreferences,
    /// Caller-supplied tenant/user context.
    #[serde(default)]
    pub context: RequestContext,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl ScrapeRequest {
    /// Creates a new request for the given URL with default options.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selectors: BTreeMap::new(),
            extract: ExtractOptions::default(),
            include_raw_html: false,
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            headers: BTreeMap::new(),
            user_agent: None,
            engine: None,
            browser: BrowserOptions::default(),
            proxy: ProxyPreferences::default(),
            context: RequestContext::default(),
        }
    }

    /// Adds a named field selector.
    pub fn with_selector(mut self, field: impl Into<String>, css: impl Into<String>) -> Self {
        self.selectors.insert(field.into(), css.into());
        self
    }

    /// Sets the extraction flags.
    pub fn with_extract(mut self, extract: ExtractOptions) -> Self {
        self.extract = extract;
        self
    }

    /// Includes the full raw markup in the result.
    pub fn with_raw_html(mut self) -> Self {
        self.include_raw_html = true;
        self
    }

    /// Sets the per-attempt timeout in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the retry budget and base delay.
    pub fn with_retries(mut self, retries: u32, delay_ms: u64) -> Self {
        self.retries = retries;
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Adds a custom header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets a custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Forces a specific fetch engine, bypassing routing.
    pub fn with_engine(mut self, engine: FetchEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the browser-only options.
    pub fn with_browser_options(mut self, browser: BrowserOptions) -> Self {
        self.browser = browser;
        self
    }

    /// Enables proxy rotation for this request.
    pub fn with_proxy(mut self) -> Self {
        self.proxy.enabled = true;
        self
    }

    /// Sets the proxy selection filters (implies proxy usage).
    pub fn with_proxy_preferences(mut self, proxy: ProxyPreferences) -> Self {
        self.proxy = proxy;
        self
    }

    /// Sets the tenant/user context.
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Validates the request at the orchestrator boundary.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ScrapeError::InvalidRequest("URL cannot be empty".into()));
        }
        let parsed = Url::parse(&self.url)?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ScrapeError::InvalidRequest(format!(
                "Unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ScrapeError::InvalidRequest(
                "Timeout must be non-zero".into(),
            ));
        }
        if !self.selectors.is_empty() && self.extract.mode_count() == 0 {
            return Err(ScrapeError::InvalidRequest(
                "At least one extraction mode is required".into(),
            ));
        }
        Ok(())
    }
}
