//! Selector-based field extraction over fetched markup.
//!
//! The markup is parsed once regardless of which engine produced it. Every
//! field resolves to something: a miss becomes a null value plus a miss
//! signal for the healing collaborator, never an error.

use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::warn;

use crate::request::{ExtractOptions, ScrapeRequest};
use crate::result::{MatchType, SelectorSignal};

/// Extracted field values plus the per-field selector signals to forward.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Field values keyed by field name.
    pub data: Map<String, Value>,
    /// One hit/miss signal per requested field.
    pub signals: Vec<SelectorSignal>,
}

/// Runs every field selector of the request against the markup.
pub fn extract_fields(html: &str, request: &ScrapeRequest) -> Extraction {
    let document = Html::parse_document(html);
    let mut extraction = Extraction::default();

    for (field, css) in &request.selectors {
        let (value, matched) = match Selector::parse(css) {
            Ok(selector) => {
                let matches: Vec<ElementRef<'_>> = document.select(&selector).collect();
                let value = match matches.len() {
                    0 => Value::Null,
                    1 => extract_element(&matches[0], &request.extract),
                    _ => Value::Array(
                        matches
                            .iter()
                            .map(|element| extract_element(element, &request.extract))
                            .collect(),
                    ),
                };
                (value, !matches.is_empty())
            }
            Err(e) => {
                warn!(%field, %css, "Unparseable selector: {:?}", e);
                (Value::Null, false)
            }
        };

        extraction.signals.push(SelectorSignal {
            url: request.url.clone(),
            field: field.clone(),
            selector: css.clone(),
            match_type: MatchType::Css,
            matched,
            tenant_id: request.context.tenant_id.clone(),
        });
        extraction.data.insert(field.clone(), value);
    }

    extraction
}

/// Extracts one matched element per the configured flags.
///
/// A single enabled mode yields a bare scalar; several yield an object
/// with one key per mode.
fn extract_element(element: &ElementRef<'_>, options: &ExtractOptions) -> Value {
    if options.mode_count() == 1 {
        if options.text {
            return Value::String(element_text(element));
        }
        if options.html {
            return Value::String(element.html());
        }
        return attributes_value(element, &options.attributes);
    }

    let mut object = Map::new();
    if options.text {
        object.insert("text".to_string(), Value::String(element_text(element)));
    }
    if options.html {
        object.insert("html".to_string(), Value::String(element.html()));
    }
    if !options.attributes.is_empty() {
        object.insert(
            "attributes".to_string(),
            attributes_value(element, &options.attributes),
        );
    }
    Value::Object(object)
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// One requested attribute collapses to its bare value; several become an
/// attribute-to-value object. Absent attributes resolve to null.
fn attributes_value(element: &ElementRef<'_>, attributes: &[String]) -> Value {
    let attr_value = |name: &str| {
        element
            .value()
            .attr(name)
            .map(|value| Value::String(value.to_string()))
            .unwrap_or(Value::Null)
    };

    if attributes.len() == 1 {
        return attr_value(&attributes[0]);
    }

    Value::Object(
        attributes
            .iter()
            .map(|name| (name.clone(), attr_value(name)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <h1>Example</h1>
        <ul>
            <li class="item">First</li>
            <li class="item">Second</li>
        </ul>
        <a id="home" href="/home" title="Home">Go home</a>
    </body></html>"#;

    fn request_with(extract: ExtractOptions, field: &str, css: &str) -> ScrapeRequest {
        ScrapeRequest::new("https://example.com")
            .with_selector(field, css)
            .with_extract(extract)
    }

    #[test]
    fn test_single_match_text_only_is_bare_string() {
        let request = request_with(ExtractOptions::default(), "title", "h1");
        let extraction = extract_fields(PAGE, &request);
        assert_eq!(extraction.data.get("title").unwrap(), "Example");
    }

    #[test]
    fn test_single_match_text_and_html_is_object() {
        let extract = ExtractOptions {
            text: true,
            html: true,
            attributes: vec![],
        };
        let request = request_with(extract, "title", "h1");
        let extraction = extract_fields(PAGE, &request);
        let value = extraction.data.get("title").unwrap();
        assert_eq!(value["text"], "Example");
        assert_eq!(value["html"], "<h1>Example</h1>");
    }

    #[test]
    fn test_zero_matches_is_null_with_miss_signal() {
        let request = request_with(ExtractOptions::default(), "missing", ".nope");
        let extraction = extract_fields(PAGE, &request);
        assert!(extraction.data.get("missing").unwrap().is_null());
        assert_eq!(extraction.signals.len(), 1);
        assert!(!extraction.signals[0].matched);
        assert_eq!(extraction.signals[0].selector, ".nope");
    }

    #[test]
    fn test_multiple_matches_is_ordered_list() {
        let request = request_with(ExtractOptions::default(), "items", "li.item");
        let extraction = extract_fields(PAGE, &request);
        let value = extraction.data.get("items").unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[0], "First");
        assert_eq!(value[1], "Second");
    }

    #[test]
    fn test_single_attribute_is_bare_string() {
        let extract = ExtractOptions {
            text: false,
            html: false,
            attributes: vec!["href".to_string()],
        };
        let request = request_with(extract, "link", "a#home");
        let extraction = extract_fields(PAGE, &request);
        assert_eq!(extraction.data.get("link").unwrap(), "/home");
    }

    #[test]
    fn test_multiple_attributes_is_object() {
        let extract = ExtractOptions {
            text: false,
            html: false,
            attributes: vec!["href".to_string(), "title".to_string()],
        };
        let request = request_with(extract, "link", "a#home");
        let extraction = extract_fields(PAGE, &request);
        let value = extraction.data.get("link").unwrap();
        assert_eq!(value["href"], "/home");
        assert_eq!(value["title"], "Home");
    }

    #[test]
    fn test_absent_attribute_is_null() {
        let extract = ExtractOptions {
            text: false,
            html: false,
            attributes: vec!["data-missing".to_string()],
        };
        let request = request_with(extract, "link", "a#home");
        let extraction = extract_fields(PAGE, &request);
        assert!(extraction.data.get("link").unwrap().is_null());
        // The selector matched even though the attribute is absent.
        assert!(extraction.signals[0].matched);
    }

    #[test]
    fn test_all_modes_object_shape() {
        let extract = ExtractOptions {
            text: true,
            html: true,
            attributes: vec!["href".to_string()],
        };
        let request = request_with(extract, "link", "a#home");
        let extraction = extract_fields(PAGE, &request);
        let value = extraction.data.get("link").unwrap();
        assert_eq!(value["text"], "Go home");
        assert!(value["html"].as_str().unwrap().contains("<a"));
        assert_eq!(value["attributes"], "/home");
    }

    #[test]
    fn test_invalid_selector_is_null_miss() {
        let request = request_with(ExtractOptions::default(), "broken", "li[");
        let extraction = extract_fields(PAGE, &request);
        assert!(extraction.data.get("broken").unwrap().is_null());
        assert!(!extraction.signals[0].matched);
    }

    #[test]
    fn test_signal_per_field() {
        let request = ScrapeRequest::new("https://example.com")
            .with_selector("title", "h1")
            .with_selector("missing", ".nope");
        let extraction = extract_fields(PAGE, &request);
        assert_eq!(extraction.signals.len(), 2);
        let hit = extraction.signals.iter().find(|s| s.field == "title").unwrap();
        let miss = extraction
            .signals
            .iter()
            .find(|s| s.field == "missing")
            .unwrap();
        assert!(hit.matched);
        assert!(!miss.matched);
    }

    #[test]
    fn test_signal_carries_tenant() {
        let mut request = request_with(ExtractOptions::default(), "title", "h1");
        request.context.tenant_id = Some("acme".to_string());
        let extraction = extract_fields(PAGE, &request);
        assert_eq!(extraction.signals[0].tenant_id.as_deref(), Some("acme"));
    }
}
