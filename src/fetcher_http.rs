//! Lightweight HTTP fetcher using reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy};
use tracing::debug;

use crate::fetcher::{FetchSpec, FetchedPage, PageFetcher};
use crate::{Result, ScrapeError};

/// Default user agent when the request supplies none.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; gleaner/0.1)";

/// A page fetcher that issues plain HTTP requests via reqwest.
///
/// Suitable for server-rendered markup. Pages that require script
/// execution go through `BrowserFetcher` instead.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a new `HttpFetcher` with default settings.
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent(DEFAULT_USER_AGENT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Creates an `HttpFetcher` with a custom reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Returns the client for a spec: the shared one, or a per-call client
    /// configured with the attempt's proxy.
    fn client_for(&self, spec: &FetchSpec) -> Result<Client> {
        let Some(ref proxy) = spec.proxy else {
            return Ok(self.client.clone());
        };

        let proxy_url = proxy.url();
        debug!(proxy_id = %proxy.id, "Fetching via proxy");
        let reqwest_proxy = ReqwestProxy::all(&proxy_url)
            .map_err(|e| ScrapeError::Other(format!("Failed to create proxy: {}", e)))?;
        Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .proxy(reqwest_proxy)
            .build()
            .map_err(|e| ScrapeError::Other(format!("Failed to create HTTP client: {}", e)))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, spec: &FetchSpec) -> Result<FetchedPage> {
        let client = self.client_for(spec)?;

        let mut builder = client
            .get(&spec.url)
            .timeout(Duration::from_millis(spec.timeout_ms));
        for (name, value) in &spec.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref user_agent) = spec.user_agent {
            builder = builder.header(reqwest::header::USER_AGENT, user_agent.as_str());
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let html = response.text().await.map_err(map_reqwest_error)?;
        let content_length = Some(html.len() as u64);

        Ok(FetchedPage {
            html,
            status: Some(status),
            content_type,
            content_length,
            screenshot: None,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ScrapeError {
    if e.is_timeout() {
        ScrapeError::Timeout
    } else {
        ScrapeError::Http(e)
    }
}
