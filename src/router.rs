//! Engine routing: decide whether a URL needs browser rendering.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::heuristics::{self, MarkupComplexity, PageHeuristics};
use crate::request::{FetchEngine, ScrapeRequest};

/// Default TTL for cached heuristic snapshots.
const HEURISTIC_TTL: Duration = Duration::from_secs(3600);

/// Maximum number of cached snapshots.
const HEURISTIC_CACHE_CAPACITY: u64 = 10_000;

/// Timeout for the pre-routing probe fetch.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The router's verdict for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Chosen fetch engine.
    pub engine: FetchEngine,
    /// Human-readable reason for the choice.
    pub reason: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

/// TTL key-value cache for heuristic snapshots, keyed by URL.
///
/// Absence of a cache degrades gracefully to re-probing on every request.
#[async_trait]
pub trait HeuristicCache: Send + Sync {
    /// Returns the cached snapshot for a URL, if present and fresh.
    async fn get(&self, url: &str) -> Option<PageHeuristics>;

    /// Stores a snapshot for a URL with the given expiry.
    async fn set(&self, url: &str, heuristics: PageHeuristics, ttl: Duration);
}

/// In-process heuristic cache backed by moka with time-based expiration.
pub struct MokaHeuristicCache {
    inner: Cache<String, PageHeuristics>,
}

impl MokaHeuristicCache {
    /// Creates a cache with the default capacity and TTL.
    pub fn new() -> Self {
        Self::with_ttl(HEURISTIC_TTL)
    }

    /// Creates a cache with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(HEURISTIC_CACHE_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }
}

impl Default for MokaHeuristicCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HeuristicCache for MokaHeuristicCache {
    async fn get(&self, url: &str) -> Option<PageHeuristics> {
        self.inner.get(url).await
    }

    // moka expires by the cache-wide TTL set at construction; the per-call
    // ttl is for stores with per-entry expiry.
    async fn set(&self, url: &str, heuristics: PageHeuristics, _ttl: Duration) {
        self.inner.insert(url.to_string(), heuristics).await;
    }
}

/// Classifies target URLs as needing a headless browser or not.
pub struct EngineRouter {
    cache: Option<Arc<dyn HeuristicCache>>,
    probe_client: reqwest::Client,
}

impl EngineRouter {
    /// Creates a router with an in-process heuristic cache.
    pub fn new() -> Self {
        Self {
            cache: Some(Arc::new(MokaHeuristicCache::new())),
            probe_client: probe_client(),
        }
    }

    /// Replaces the heuristic cache.
    pub fn with_cache(mut self, cache: Arc<dyn HeuristicCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Disables caching; every routed request re-probes.
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Decides which engine should fetch the request's URL.
    ///
    /// Never fails: a probe error falls back to the lightweight engine at
    /// confidence 0.5, the cheapest safe default under total uncertainty.
    pub async fn decide(&self, request: &ScrapeRequest) -> RoutingDecision {
        if let Some(engine) = request.engine {
            return RoutingDecision {
                engine,
                reason: format!("{} engine explicitly requested by caller", engine),
                confidence: 1.0,
            };
        }

        if let Some(ref cache) = self.cache {
            if let Some(heuristics) = cache.get(&request.url).await {
                debug!(url = %request.url, "Routing from cached heuristics");
                return decide_from_heuristics(&heuristics, request, "from cache");
            }
        }

        match self.probe(&request.url).await {
            Ok(html) => {
                let heuristics = heuristics::analyze(&html);
                if let Some(ref cache) = self.cache {
                    cache
                        .set(&request.url, heuristics.clone(), HEURISTIC_TTL)
                        .await;
                }
                decide_from_heuristics(&heuristics, request, "probed")
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Probe failed, defaulting to lightweight");
                RoutingDecision {
                    engine: FetchEngine::Lightweight,
                    reason: format!("probe failed ({}), defaulting to lightweight engine", e),
                    confidence: 0.5,
                }
            }
        }
    }

    /// Short bounded-timeout fetch of the target markup.
    async fn probe(&self, url: &str) -> crate::Result<String> {
        let response = self.probe_client.get(url).send().await?;
        let html = response.text().await?;
        Ok(html)
    }
}

impl Default for EngineRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn probe_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (compatible; gleaner/0.1)")
        .timeout(PROBE_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Applies the decision policy to a heuristic snapshot, first match wins.
pub fn decide_from_heuristics(
    heuristics: &PageHeuristics,
    request: &ScrapeRequest,
    source: &str,
) -> RoutingDecision {
    let (engine, reason, confidence) = if let Some(ref framework) = heuristics.framework {
        (
            FetchEngine::Browser,
            format!("front-end framework detected: {}", framework),
            0.9,
        )
    } else if heuristics.requires_rendering() && heuristics.complexity == MarkupComplexity::Complex
    {
        (
            FetchEngine::Browser,
            "rendering signals on complex markup".to_string(),
            0.8,
        )
    } else if heuristics.has_interactive_attrs && request.browser.wait_for_selector.is_some() {
        (
            FetchEngine::Browser,
            "interactive elements with a wait-for selector".to_string(),
            0.85,
        )
    } else if heuristics.requires_rendering() && heuristics.script_count > 0 {
        (
            FetchEngine::Browser,
            "rendering signals with embedded scripts".to_string(),
            0.7,
        )
    } else if heuristics.complexity == MarkupComplexity::Simple && heuristics.script_count == 0 {
        (
            FetchEngine::Lightweight,
            "simple script-free markup".to_string(),
            0.9,
        )
    } else {
        (
            FetchEngine::Lightweight,
            "no rendering signals, defaulting to lightweight engine".to_string(),
            0.6,
        )
    };

    RoutingDecision {
        engine,
        reason: format!("{} ({})", reason, source),
        confidence,
    }
}
