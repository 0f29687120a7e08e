//! Chrome/Chromium executable detection.
//!
//! Only available when the `headless` Cargo feature is enabled. The pool
//! resolves the browser binary from well-known install locations first,
//! then from `$PATH`. The deployment is expected to provision the browser;
//! there is no auto-download.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Result, ScrapeError};

/// Well-known Chrome/Chromium executable paths per platform.
#[cfg(target_os = "macos")]
const KNOWN_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

#[cfg(all(unix, not(target_os = "macos")))]
const KNOWN_PATHS: &[&str] = &[
    "/opt/google/chrome/chrome",
    "/opt/chromium.org/chromium/chrome",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

#[cfg(windows)]
const KNOWN_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

/// Well-known command names to search in PATH.
const KNOWN_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Locates a Chrome/Chromium executable.
///
/// Checks known install paths, then `$PATH` lookups. Errors when nothing
/// is found; callers with a known binary pass an explicit path via the
/// pool configuration instead.
pub fn find_chrome() -> Result<PathBuf> {
    for path in KNOWN_PATHS {
        let candidate = Path::new(path);
        if candidate.exists() {
            debug!("Found browser at known path: {}", path);
            return Ok(candidate.to_path_buf());
        }
    }

    for command in KNOWN_COMMANDS {
        if let Ok(path) = which::which(command) {
            debug!("Found browser in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(ScrapeError::Browser(
        "No Chrome/Chromium executable found; install one or set an explicit path".to_string(),
    ))
}
