//! Page fetcher abstraction shared by both engines.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::proxy::ProxyRecord;
use crate::request::{BrowserOptions, ScrapeRequest};
use crate::Result;

/// Everything one fetch attempt needs, resolved from the request plus the
/// proxy drawn for this attempt.
#[derive(Debug, Clone)]
pub struct FetchSpec {
    /// Target URL.
    pub url: String,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Custom request headers.
    pub headers: BTreeMap<String, String>,
    /// Custom user agent.
    pub user_agent: Option<String>,
    /// Proxy for this attempt, if one was drawn.
    pub proxy: Option<ProxyRecord>,
    /// Browser-only options; ignored by the lightweight fetcher.
    pub browser: BrowserOptions,
}

impl FetchSpec {
    /// Builds a spec from a request and the proxy chosen for this attempt.
    pub fn from_request(request: &ScrapeRequest, proxy: Option<ProxyRecord>) -> Self {
        Self {
            url: request.url.clone(),
            timeout_ms: request.timeout_ms,
            headers: request.headers.clone(),
            user_agent: request.user_agent.clone(),
            proxy,
            browser: request.browser.clone(),
        }
    }
}

/// A fetched page with whatever transport metadata the engine observed.
///
/// The lightweight engine reports HTTP status and content type; the browser
/// engine's status is implicit in navigation success, so those fields stay
/// `None` there.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    /// The page markup (rendered, for the browser engine).
    pub html: String,
    /// HTTP status code, when observed.
    pub status: Option<u16>,
    /// Response content type, when observed.
    pub content_type: Option<String>,
    /// Body length in bytes.
    pub content_length: Option<u64>,
    /// Screenshot payload, when the spec asked for one.
    pub screenshot: Option<Vec<u8>>,
}

/// Trait for fetching the markup of a URL.
///
/// Implementations use plain HTTP requests or a headless browser; test
/// doubles substitute fixed content. Errors are transport-level only —
/// response classification (ban signals, fatal statuses, content types)
/// belongs to the orchestrator.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches the page described by the spec.
    async fn fetch(&self, spec: &FetchSpec) -> Result<FetchedPage>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::FetchEngine;

    #[test]
    fn test_fetch_spec_from_request() {
        let request = ScrapeRequest::new("https://example.com")
            .with_timeout_ms(5_000)
            .with_header("Accept", "text/html")
            .with_user_agent("TestBot/1.0")
            .with_engine(FetchEngine::Lightweight);
        let proxy = ProxyRecord::new("p1", "127.0.0.1", 8080);
        let spec = FetchSpec::from_request(&request, Some(proxy));

        assert_eq!(spec.url, "https://example.com");
        assert_eq!(spec.timeout_ms, 5_000);
        assert_eq!(spec.headers.get("Accept").unwrap(), "text/html");
        assert_eq!(spec.user_agent.as_deref(), Some("TestBot/1.0"));
        assert_eq!(spec.proxy.as_ref().unwrap().id, "p1");
    }

    #[test]
    fn test_fetch_spec_without_proxy() {
        let request = ScrapeRequest::new("https://example.com");
        let spec = FetchSpec::from_request(&request, None);
        assert!(spec.proxy.is_none());
        assert!(spec.browser.wait_for_selector.is_none());
    }

    #[test]
    fn test_fetched_page_default() {
        let page = FetchedPage::default();
        assert!(page.html.is_empty());
        assert!(page.status.is_none());
        assert!(page.screenshot.is_none());
    }
}
