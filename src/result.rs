//! Scrape result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::FetchEngine;

/// Metadata describing how a scrape was performed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeMetadata {
    /// Wall-clock duration of the whole request in milliseconds.
    pub latency_ms: u64,
    /// Body length in bytes, when known.
    pub content_length: Option<u64>,
    /// Response content type, when known.
    pub content_type: Option<String>,
    /// Final HTTP status code, when the lightweight engine was used.
    pub status_code: Option<u16>,
    /// The engine that produced the markup.
    pub engine: FetchEngine,
    /// Number of fetch attempts made.
    pub attempts: u32,
    /// Completion timestamp.
    pub finished_at: DateTime<Utc>,
}

impl ScrapeMetadata {
    /// Creates metadata for the given engine with zeroed counters.
    pub fn new(engine: FetchEngine) -> Self {
        Self {
            latency_ms: 0,
            content_length: None,
            content_type: None,
            status_code: None,
            engine,
            attempts: 0,
            finished_at: Utc::now(),
        }
    }
}

/// The outcome of one scrape request.
///
/// Fatal failures surface as `success == false` with an error message.
/// Per-field selector misses do not fail the scrape; the field is simply
/// null in `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    /// Whether the fetch-and-extract pipeline completed.
    pub success: bool,
    /// Extracted field values keyed by field name.
    pub data: Map<String, Value>,
    /// Full raw markup, when requested.
    pub raw_html: Option<String>,
    /// Screenshot payload, when requested and rendered by the browser.
    pub screenshot: Option<Vec<u8>>,
    /// Error message for fatal failures.
    pub error: Option<String>,
    /// Fetch metadata.
    pub metadata: ScrapeMetadata,
}

impl ScrapeResult {
    /// Creates a successful result.
    pub fn ok(data: Map<String, Value>, metadata: ScrapeMetadata) -> Self {
        Self {
            success: true,
            data,
            raw_html: None,
            screenshot: None,
            error: None,
            metadata,
        }
    }

    /// Creates a failed result with an error message.
    pub fn failed(error: impl Into<String>, metadata: ScrapeMetadata) -> Self {
        Self {
            success: false,
            data: Map::new(),
            raw_html: None,
            screenshot: None,
            error: Some(error.into()),
            metadata,
        }
    }

    /// Attaches the raw markup.
    pub fn with_raw_html(mut self, html: impl Into<String>) -> Self {
        self.raw_html = Some(html.into());
        self
    }

    /// Attaches a screenshot payload.
    pub fn with_screenshot(mut self, bytes: Vec<u8>) -> Self {
        self.screenshot = Some(bytes);
        self
    }

    /// Returns an extracted field value, if present.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// How a selector is matched against the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// CSS selector matching.
    #[default]
    Css,
}

/// Per-field, per-attempt signal forwarded to the selector-healing
/// collaborator. This subsystem only produces the signal; it keeps no
/// selector history of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorSignal {
    /// Target URL the selector ran against.
    pub url: String,
    /// Field name the selector belongs to.
    pub field: String,
    /// The selector string as supplied by the caller.
    pub selector: String,
    /// Match type of the selector.
    pub match_type: MatchType,
    /// Whether the selector matched at least one element.
    pub matched: bool,
    /// Tenant scope, when the caller supplied one.
    pub tenant_id: Option<String>,
}
