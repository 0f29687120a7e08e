//! Markup analysis for engine routing.
//!
//! Everything here is pure: given a markup string, derive the signals the
//! router needs to choose between the lightweight and browser engines. The
//! resulting [`PageHeuristics`] snapshot is what gets cached per URL.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

/// Ordered markup complexity tiers derived from script and container counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkupComplexity {
    Simple,
    Moderate,
    Complex,
}

/// Heuristic snapshot of one page's markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageHeuristics {
    /// Number of embedded `<script>` blocks.
    pub script_count: usize,
    /// Number of structural container elements.
    pub container_count: usize,
    /// Complexity tier from the two counts above.
    pub complexity: MarkupComplexity,
    /// Name of the detected front-end framework, if any.
    pub framework: Option<String>,
    /// Client-hydration markers present (serialized state blobs, SSR roots).
    pub has_hydration_markers: bool,
    /// Inline interactive-event attributes present.
    pub has_interactive_attrs: bool,
}

impl PageHeuristics {
    /// Whether the page signals that scripts must run to build its content.
    pub fn requires_rendering(&self) -> bool {
        self.framework.is_some() || self.has_hydration_markers
    }
}

/// Front-end framework fingerprints: literal markers plus attribute
/// patterns that survive minification.
static FRAMEWORK_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "react",
            Regex::new(r#"data-reactroot|id="react-root"|__REACT_DEVTOOLS"#).unwrap(),
        ),
        (
            "next.js",
            Regex::new(r#"__NEXT_DATA__|id="__next""#).unwrap(),
        ),
        (
            "vue",
            Regex::new(r#"data-v-[0-9a-f]{8}|data-server-rendered="true"|__VUE__"#).unwrap(),
        ),
        ("nuxt", Regex::new(r#"__NUXT__|id="__nuxt""#).unwrap()),
        (
            "angular",
            Regex::new(r#"ng-version="|<app-root|ng-app="#).unwrap(),
        ),
        ("svelte", Regex::new(r#"class="[^"]*svelte-[0-9a-z]+"#).unwrap()),
        ("ember", Regex::new(r#"id="ember\d+"|class="ember-view""#).unwrap()),
    ]
});

/// Markers indicating the server shipped state for client-side hydration.
static HYDRATION_MARKERS: &[&str] = &[
    "__NEXT_DATA__",
    "__NUXT__",
    "__INITIAL_STATE__",
    "__APOLLO_STATE__",
    "__PRELOADED_STATE__",
    "data-reactroot",
    "data-server-rendered",
    "astro-island",
];

/// Inline event-handler attributes that hint at interactive behavior.
static INTERACTIVE_ATTRS: &[&str] = &[
    "onclick=",
    "onchange=",
    "onsubmit=",
    "oninput=",
    "data-action=",
    "data-toggle=",
];

/// Structural container elements counted for the density signal.
const CONTAINER_SELECTOR: &str = "div, section, article, main, aside, ul, ol, table";

/// Tier thresholds. Pages with a couple of scripts and a flat structure
/// parse fine without rendering; heavily scripted or deeply nested pages
/// usually do not.
const SIMPLE_MAX_SCRIPTS: usize = 2;
const SIMPLE_MAX_CONTAINERS: usize = 40;
const COMPLEX_MIN_SCRIPTS: usize = 11;
const COMPLEX_MIN_CONTAINERS: usize = 151;

/// Classifies script/container counts into a complexity tier.
pub fn classify_complexity(script_count: usize, container_count: usize) -> MarkupComplexity {
    if script_count >= COMPLEX_MIN_SCRIPTS || container_count >= COMPLEX_MIN_CONTAINERS {
        MarkupComplexity::Complex
    } else if script_count <= SIMPLE_MAX_SCRIPTS && container_count < SIMPLE_MAX_CONTAINERS {
        MarkupComplexity::Simple
    } else {
        MarkupComplexity::Moderate
    }
}

/// Analyzes a markup string into a heuristic snapshot.
pub fn analyze(html: &str) -> PageHeuristics {
    let document = Html::parse_document(html);

    let script_count = Selector::parse("script")
        .map(|sel| document.select(&sel).count())
        .unwrap_or(0);
    let container_count = Selector::parse(CONTAINER_SELECTOR)
        .map(|sel| document.select(&sel).count())
        .unwrap_or(0);

    let framework = FRAMEWORK_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(html))
        .map(|(name, _)| (*name).to_string());

    let has_hydration_markers = HYDRATION_MARKERS.iter().any(|marker| html.contains(marker));
    let has_interactive_attrs = {
        let lowered = html.to_ascii_lowercase();
        INTERACTIVE_ATTRS.iter().any(|attr| lowered.contains(attr))
    };

    PageHeuristics {
        script_count,
        container_count,
        complexity: classify_complexity(script_count, container_count),
        framework,
        has_hydration_markers,
        has_interactive_attrs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_simple() {
        assert_eq!(classify_complexity(0, 0), MarkupComplexity::Simple);
        assert_eq!(classify_complexity(2, 39), MarkupComplexity::Simple);
    }

    #[test]
    fn test_classify_moderate() {
        assert_eq!(classify_complexity(3, 10), MarkupComplexity::Moderate);
        assert_eq!(classify_complexity(0, 40), MarkupComplexity::Moderate);
        assert_eq!(classify_complexity(10, 150), MarkupComplexity::Moderate);
    }

    #[test]
    fn test_classify_complex() {
        assert_eq!(classify_complexity(11, 0), MarkupComplexity::Complex);
        assert_eq!(classify_complexity(0, 151), MarkupComplexity::Complex);
    }

    #[test]
    fn test_complexity_ordering() {
        assert!(MarkupComplexity::Simple < MarkupComplexity::Moderate);
        assert!(MarkupComplexity::Moderate < MarkupComplexity::Complex);
    }

    #[test]
    fn test_analyze_static_page() {
        let html = "<html><body><h1>Example</h1><p>Plain content</p></body></html>";
        let heuristics = analyze(html);
        assert_eq!(heuristics.script_count, 0);
        assert_eq!(heuristics.complexity, MarkupComplexity::Simple);
        assert!(heuristics.framework.is_none());
        assert!(!heuristics.has_hydration_markers);
        assert!(!heuristics.has_interactive_attrs);
        assert!(!heuristics.requires_rendering());
    }

    #[test]
    fn test_analyze_counts_scripts() {
        let html = r#"<html><body>
            <script src="a.js"></script>
            <script>var x = 1;</script>
            <script>var y = 2;</script>
        </body></html>"#;
        assert_eq!(analyze(html).script_count, 3);
    }

    #[test]
    fn test_analyze_counts_containers() {
        let html = "<html><body><div><section><ul><li>a</li></ul></section></div></body></html>";
        let heuristics = analyze(html);
        assert_eq!(heuristics.container_count, 3);
    }

    #[test]
    fn test_analyze_detects_next() {
        let html = r#"<html><body><div id="__next"></div>
            <script id="__NEXT_DATA__" type="application/json">{}</script></body></html>"#;
        let heuristics = analyze(html);
        assert_eq!(heuristics.framework.as_deref(), Some("next.js"));
        assert!(heuristics.has_hydration_markers);
        assert!(heuristics.requires_rendering());
    }

    #[test]
    fn test_analyze_detects_react_root() {
        let html = r#"<html><body><div data-reactroot=""></div></body></html>"#;
        let heuristics = analyze(html);
        assert_eq!(heuristics.framework.as_deref(), Some("react"));
    }

    #[test]
    fn test_analyze_detects_vue_scoped_attr() {
        let html = r#"<html><body><div data-v-1a2b3c4d class="card"></div></body></html>"#;
        let heuristics = analyze(html);
        assert_eq!(heuristics.framework.as_deref(), Some("vue"));
    }

    #[test]
    fn test_analyze_detects_angular() {
        let html = r#"<html><body><app-root ng-version="17.0.1"></app-root></body></html>"#;
        let heuristics = analyze(html);
        assert_eq!(heuristics.framework.as_deref(), Some("angular"));
    }

    #[test]
    fn test_analyze_detects_interactive_attrs() {
        let html = r#"<html><body><button onclick="go()">Go</button></body></html>"#;
        let heuristics = analyze(html);
        assert!(heuristics.has_interactive_attrs);
        assert!(heuristics.framework.is_none());
    }

    #[test]
    fn test_analyze_hydration_without_framework() {
        let html = r#"<html><body><script>window.__PRELOADED_STATE__ = {};</script></body></html>"#;
        let heuristics = analyze(html);
        assert!(heuristics.has_hydration_markers);
        assert!(heuristics.framework.is_none());
        assert!(heuristics.requires_rendering());
    }

    #[test]
    fn test_heuristics_serialization_round_trip() {
        let heuristics = analyze("<html><body><div>x</div></body></html>");
        let json = serde_json::to_string(&heuristics).unwrap();
        let back: PageHeuristics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.container_count, heuristics.container_count);
        assert_eq!(back.complexity, heuristics.complexity);
    }
}
