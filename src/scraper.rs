//! Fetch-and-extract orchestration.
//!
//! [`Gleaner`] is the composition root: it owns the router, the proxy
//! pool, both fetch engines and the feedback bus, and runs the per-request
//! state machine — route, acquire a proxy, fetch with retries, extract,
//! report. Callers always get a structured [`ScrapeResult`]; fatal errors
//! surface as `success == false`, never as panics or bubbled errors.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::extract::extract_fields;
use crate::feedback::{
    AttemptTelemetry, FeedbackBus, FeedbackEvent, LoggingHealer, LoggingTelemetry, ScrapeTelemetry,
    SelectorHealer, TelemetrySink,
};
use crate::fetcher::{FetchSpec, FetchedPage, PageFetcher};
use crate::fetcher_http::HttpFetcher;
use crate::proxy::{ProxyFilter, ProxyOutcome, ProxyPool, ProxyRecord, ProxyStore, UsageContext};
use crate::request::{FetchEngine, ScrapeRequest};
use crate::result::{ScrapeMetadata, ScrapeResult};
use crate::router::EngineRouter;
use crate::{Result, ScrapeError};

#[cfg(feature = "headless")]
use crate::browser::{BrowserFetcher, BrowserPool, BrowserPoolConfig};

/// Content types accepted as markup by the lightweight engine.
const MARKUP_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml", "text/xml", "application/xml"];

/// Builder for a [`Gleaner`] instance.
pub struct GleanerBuilder {
    router: EngineRouter,
    proxy_store: Option<Arc<dyn ProxyStore>>,
    healer: Arc<dyn SelectorHealer>,
    telemetry: Arc<dyn TelemetrySink>,
    http_fetcher: Option<Arc<dyn PageFetcher>>,
    browser_fetcher: Option<Arc<dyn PageFetcher>>,
    #[cfg(feature = "headless")]
    browser_config: BrowserPoolConfig,
}

impl GleanerBuilder {
    fn new() -> Self {
        Self {
            router: EngineRouter::new(),
            proxy_store: None,
            healer: Arc::new(LoggingHealer),
            telemetry: Arc::new(LoggingTelemetry),
            http_fetcher: None,
            browser_fetcher: None,
            #[cfg(feature = "headless")]
            browser_config: BrowserPoolConfig::default(),
        }
    }

    /// Replaces the engine router.
    pub fn router(mut self, router: EngineRouter) -> Self {
        self.router = router;
        self
    }

    /// Enables proxy rotation backed by the given store.
    pub fn proxy_store(mut self, store: Arc<dyn ProxyStore>) -> Self {
        self.proxy_store = Some(store);
        self
    }

    /// Replaces the selector-healing collaborator.
    pub fn healer(mut self, healer: Arc<dyn SelectorHealer>) -> Self {
        self.healer = healer;
        self
    }

    /// Replaces the telemetry collaborator.
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Replaces the lightweight fetcher (test seam).
    pub fn http_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.http_fetcher = Some(fetcher);
        self
    }

    /// Replaces the browser fetcher (test seam).
    pub fn browser_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.browser_fetcher = Some(fetcher);
        self
    }

    /// Sets the browser pool configuration.
    #[cfg(feature = "headless")]
    pub fn browser_config(mut self, config: BrowserPoolConfig) -> Self {
        self.browser_config = config;
        self
    }

    /// Builds the orchestrator, spawning its feedback worker.
    ///
    /// Must be called within a tokio runtime.
    pub fn build(self) -> Gleaner {
        let proxy_pool = self
            .proxy_store
            .map(|store| Arc::new(ProxyPool::new(store)));
        let feedback = FeedbackBus::new(proxy_pool.clone(), self.healer, self.telemetry);

        let http_fetcher = self
            .http_fetcher
            .unwrap_or_else(|| Arc::new(HttpFetcher::new()));

        #[cfg(feature = "headless")]
        let (browser_pool, browser_fetcher) = match self.browser_fetcher {
            Some(fetcher) => (None, Some(fetcher)),
            None => {
                let pool = Arc::new(BrowserPool::new(self.browser_config));
                let fetcher: Arc<dyn PageFetcher> =
                    Arc::new(BrowserFetcher::new(Arc::clone(&pool)));
                (Some(pool), Some(fetcher))
            }
        };
        #[cfg(not(feature = "headless"))]
        let browser_fetcher = self.browser_fetcher;

        Gleaner {
            router: self.router,
            proxy_pool,
            http_fetcher,
            browser_fetcher,
            feedback,
            #[cfg(feature = "headless")]
            browser_pool,
        }
    }
}

/// The web content acquisition engine.
pub struct Gleaner {
    router: EngineRouter,
    proxy_pool: Option<Arc<ProxyPool>>,
    http_fetcher: Arc<dyn PageFetcher>,
    browser_fetcher: Option<Arc<dyn PageFetcher>>,
    feedback: FeedbackBus,
    #[cfg(feature = "headless")]
    browser_pool: Option<Arc<BrowserPool>>,
}

impl Gleaner {
    /// Creates an orchestrator with default components.
    ///
    /// Must be called within a tokio runtime.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder for customizing components.
    pub fn builder() -> GleanerBuilder {
        GleanerBuilder::new()
    }

    /// Returns the proxy pool, if rotation is enabled.
    pub fn proxy_pool(&self) -> Option<&Arc<ProxyPool>> {
        self.proxy_pool.as_ref()
    }

    /// Shuts down owned long-lived resources (the browser process).
    pub async fn close(&self) {
        #[cfg(feature = "headless")]
        if let Some(ref pool) = self.browser_pool {
            pool.shutdown().await;
        }
    }

    /// Acquires, fetches and extracts one target.
    pub async fn scrape(&self, request: ScrapeRequest) -> ScrapeResult {
        let start = Instant::now();

        if let Err(e) = request.validate() {
            let mut metadata = ScrapeMetadata::new(request.engine.unwrap_or_default());
            metadata.finished_at = Utc::now();
            return ScrapeResult::failed(e.to_string(), metadata);
        }

        let decision = self.router.decide(&request).await;
        debug!(
            url = %request.url,
            engine = %decision.engine,
            confidence = decision.confidence,
            reason = %decision.reason,
            "Routed request"
        );
        let engine = decision.engine;

        let outcome = self.fetch_with_retries(&request, engine).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok((page, attempts)) => {
                let extraction = extract_fields(&page.html, &request);
                for signal in extraction.signals {
                    self.feedback.send(FeedbackEvent::Selector(signal));
                }

                let metadata = ScrapeMetadata {
                    latency_ms,
                    content_length: page.content_length,
                    content_type: page.content_type.clone(),
                    status_code: page.status,
                    engine,
                    attempts,
                    finished_at: Utc::now(),
                };

                self.feedback.send(FeedbackEvent::Scrape(ScrapeTelemetry {
                    url: request.url.clone(),
                    engine,
                    success: true,
                    attempts,
                    latency_ms,
                    error: None,
                    tenant_id: request.context.tenant_id.clone(),
                }));

                let mut result = ScrapeResult::ok(extraction.data, metadata);
                if request.include_raw_html {
                    result = result.with_raw_html(page.html);
                }
                if let Some(screenshot) = page.screenshot {
                    result = result.with_screenshot(screenshot);
                }
                result
            }
            Err((error, attempts)) => {
                warn!(url = %request.url, attempts, "Scrape failed: {}", error);
                let metadata = ScrapeMetadata {
                    latency_ms,
                    content_length: None,
                    content_type: None,
                    status_code: match error {
                        ScrapeError::Status(code)
                        | ScrapeError::Ban(code)
                        | ScrapeError::Upstream(code) => Some(code),
                        _ => None,
                    },
                    engine,
                    attempts,
                    finished_at: Utc::now(),
                };

                self.feedback.send(FeedbackEvent::Scrape(ScrapeTelemetry {
                    url: request.url.clone(),
                    engine,
                    success: false,
                    attempts,
                    latency_ms,
                    error: Some(error.to_string()),
                    tenant_id: request.context.tenant_id.clone(),
                }));

                ScrapeResult::failed(error.to_string(), metadata)
            }
        }
    }

    /// The fetch loop: up to `retries + 1` attempts with ban-driven proxy
    /// redraws and linear backoff on transient failures.
    async fn fetch_with_retries(
        &self,
        request: &ScrapeRequest,
        engine: FetchEngine,
    ) -> std::result::Result<(FetchedPage, u32), (ScrapeError, u32)> {
        let max_attempts = request.retries + 1;
        let mut excluded: HashSet<String> = HashSet::new();

        // Proxy rotation applies to the lightweight path. The shared
        // browser process has a single egress configured at pool level.
        let rotate = engine == FetchEngine::Lightweight
            && request.proxy.enabled
            && self.proxy_pool.is_some();
        let mut proxy = if rotate {
            self.select_proxy(request, &excluded).await
        } else {
            None
        };

        let mut last_error: Option<ScrapeError> = None;

        for attempt in 1..=max_attempts {
            let fetcher = match self.fetcher_for(engine) {
                Ok(fetcher) => fetcher,
                Err(e) => return Err((e, attempt)),
            };
            let spec = FetchSpec::from_request(request, proxy.clone());
            let attempt_start = Instant::now();

            let outcome = fetcher.fetch(&spec).await.and_then(|page| {
                if engine == FetchEngine::Lightweight {
                    classify_response(page)
                } else {
                    Ok(page)
                }
            });
            let attempt_latency = attempt_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(page) => {
                    if let Some(ref record) = spec.proxy {
                        self.report_proxy(
                            record,
                            ProxyOutcome::Success {
                                status: page.status,
                                latency_ms: attempt_latency,
                            },
                            request,
                        );
                    }
                    self.feedback.send(FeedbackEvent::Attempt(AttemptTelemetry {
                        url: request.url.clone(),
                        engine,
                        attempt,
                        error: None,
                    }));
                    return Ok((page, attempt));
                }
                Err(error) => {
                    debug!(
                        url = %request.url,
                        attempt,
                        "Fetch attempt failed: {}",
                        error
                    );
                    self.feedback.send(FeedbackEvent::Attempt(AttemptTelemetry {
                        url: request.url.clone(),
                        engine,
                        attempt,
                        error: Some(error.to_string()),
                    }));

                    if let Some(ref record) = spec.proxy {
                        let outcome = if error.is_ban() {
                            ProxyOutcome::Ban {
                                status: match error {
                                    ScrapeError::Ban(code) => Some(code),
                                    _ => None,
                                },
                                reason: error.to_string(),
                                latency_ms: attempt_latency,
                            }
                        } else {
                            ProxyOutcome::Failure {
                                error: error.to_string(),
                                latency_ms: attempt_latency,
                            }
                        };
                        self.report_proxy(record, outcome, request);
                    }

                    if !error.is_retryable() {
                        return Err((error, attempt));
                    }

                    if attempt == max_attempts {
                        last_error = Some(error);
                        break;
                    }

                    if error.is_ban() && spec.proxy.is_some() {
                        // The ban is proxy-local: exclude it for the rest of
                        // this request and retry immediately with a redraw.
                        if let Some(record) = spec.proxy {
                            excluded.insert(record.id);
                        }
                        proxy = self.select_proxy(request, &excluded).await;
                        if proxy.is_none() {
                            debug!(url = %request.url, "Proxy pool exhausted, retrying direct");
                        }
                    } else {
                        tokio::time::sleep(Duration::from_millis(
                            request.retry_delay_ms * u64::from(attempt),
                        ))
                        .await;
                    }

                    last_error = Some(error);
                }
            }
        }

        Err((
            last_error.unwrap_or(ScrapeError::Timeout),
            max_attempts,
        ))
    }

    fn fetcher_for(&self, engine: FetchEngine) -> Result<Arc<dyn PageFetcher>> {
        match engine {
            FetchEngine::Lightweight => Ok(Arc::clone(&self.http_fetcher)),
            FetchEngine::Browser => self.browser_fetcher.as_ref().map(Arc::clone).ok_or_else(|| {
                ScrapeError::Other("Browser engine unavailable in this build".to_string())
            }),
        }
    }

    async fn select_proxy(
        &self,
        request: &ScrapeRequest,
        excluded: &HashSet<String>,
    ) -> Option<ProxyRecord> {
        let pool = self.proxy_pool.as_ref()?;
        let filter = ProxyFilter {
            tenant_id: request.context.tenant_id.clone(),
            country: request.proxy.country.clone(),
            class: request
                .proxy
                .class
                .as_deref()
                .and_then(|name| name.parse().ok()),
            min_score: request.proxy.min_score,
            exclude: excluded.clone(),
        };
        pool.select(&filter).await
    }

    fn report_proxy(&self, record: &ProxyRecord, outcome: ProxyOutcome, request: &ScrapeRequest) {
        self.feedback.send(FeedbackEvent::ProxyUsage {
            proxy_id: record.id.clone(),
            outcome,
            context: UsageContext {
                url: request.url.clone(),
                tenant_id: request.context.tenant_id.clone(),
                user_id: request.context.user_id.clone(),
            },
        });
    }
}

impl Default for Gleaner {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies a lightweight-engine response into the error taxonomy.
///
/// 403/429 are ban signals; other 4xx are final; 5xx is transient; a
/// non-markup content type is final.
fn classify_response(page: FetchedPage) -> Result<FetchedPage> {
    if let Some(status) = page.status {
        if status == 403 || status == 429 {
            return Err(ScrapeError::Ban(status));
        }
        if (400..500).contains(&status) {
            return Err(ScrapeError::Status(status));
        }
        if status >= 500 {
            return Err(ScrapeError::Upstream(status));
        }
    }

    if let Some(ref content_type) = page.content_type {
        let markup = MARKUP_CONTENT_TYPES
            .iter()
            .any(|accepted| content_type.starts_with(accepted));
        if !markup {
            return Err(ScrapeError::ContentType(content_type.clone()));
        }
    }

    Ok(page)
}
