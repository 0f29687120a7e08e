//! Error types for the acquisition engine.

use thiserror::Error;

/// Result type alias for scrape operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Errors that can occur while acquiring and extracting content.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The target responded with a non-retryable client error.
    #[error("Request rejected with status {0}")]
    Status(u16),

    /// The target responded with a ban signal (403/429).
    #[error("Banned by target with status {0}")]
    Ban(u16),

    /// The target responded with a server error; worth retrying.
    #[error("Upstream server error {0}")]
    Upstream(u16),

    /// The response body is not markup.
    #[error("Unsupported content type: {0}")]
    ContentType(String),

    /// Fetch or navigation timeout exceeded.
    #[error("Fetch timeout exceeded")]
    Timeout,

    /// Headless browser failure.
    #[error("Browser error: {0}")]
    Browser(String),

    /// A field selector could not be parsed.
    #[error("Invalid selector '{0}'")]
    Selector(String),

    /// The request failed boundary validation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// URL parsing error.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl ScrapeError {
    /// Whether another attempt within the same request may succeed.
    ///
    /// Bans are retryable because the retry draws a different proxy; 4xx
    /// rejections and content-type mismatches are final for the target.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScrapeError::Http(_)
            | ScrapeError::Ban(_)
            | ScrapeError::Upstream(_)
            | ScrapeError::Timeout
            | ScrapeError::Browser(_) => true,
            ScrapeError::Status(_)
            | ScrapeError::ContentType(_)
            | ScrapeError::Selector(_)
            | ScrapeError::InvalidRequest(_)
            | ScrapeError::UrlParse(_)
            | ScrapeError::Other(_) => false,
        }
    }

    /// Whether this error is a proxy ban signal.
    pub fn is_ban(&self) -> bool {
        matches!(self, ScrapeError::Ban(_))
    }
}
