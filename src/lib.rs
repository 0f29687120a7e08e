//! # gleaner
//!
//! A web content acquisition engine. Given a target URL and a set of
//! field selectors, gleaner decides which fetch strategy the page needs
//! (plain HTTP parsing or full headless rendering), routes the request
//! through a scored rotating proxy pool, retries around bans and
//! timeouts, and extracts structured fields from the markup.
//!
//! ## Example
//!
//! ```rust,no_run
//! use gleaner::{Gleaner, ScrapeRequest};
//!
//! #[tokio::main]
//! async fn main() {
//!     let gleaner = Gleaner::new();
//!
//!     let request = ScrapeRequest::new("https://example.com")
//!         .with_selector("title", "h1");
//!     let result = gleaner.scrape(request).await;
//!
//!     if result.success {
//!         println!("title = {:?}", result.field("title"));
//!     }
//! }
//! ```

mod error;
mod extract;
mod fetcher;
mod fetcher_http;
mod request;
mod result;
mod scraper;

pub mod feedback;
pub mod heuristics;
pub mod proxy;
pub mod router;

#[cfg(feature = "headless")]
pub mod browser;
#[cfg(feature = "headless")]
mod browser_setup;

pub use error::{Result, ScrapeError};
pub use extract::{extract_fields, Extraction};
pub use fetcher::{FetchSpec, FetchedPage, PageFetcher};
pub use fetcher_http::HttpFetcher;
pub use request::{
    BrowserOptions, ExtractOptions, FetchEngine, ProxyPreferences, RequestContext, ScrapeRequest,
    Viewport,
};
pub use result::{MatchType, ScrapeMetadata, ScrapeResult, SelectorSignal};
pub use scraper::{Gleaner, GleanerBuilder};

#[cfg(feature = "headless")]
pub use browser::{BrowserFetcher, BrowserPool, BrowserPoolConfig};
