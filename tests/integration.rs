//! Integration tests for the acquisition pipeline.
//!
//! Most tests run against fixture pages served from a local socket, so
//! they need no external network. Tests marked `#[ignore]` hit real sites
//! and may be slow or flaky.
//!
//! Run the ignored set with: `cargo test --test integration -- --ignored`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use gleaner::{FetchEngine, Gleaner, ScrapeRequest};

/// Serves each connection one canned HTTP response, chosen by request
/// index. The last response repeats once the script runs out.
async fn serve_script(responses: Vec<(u16, &'static str, String)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let responses = responses.clone();
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;

                let index = counter.fetch_add(1, Ordering::SeqCst);
                let (status, content_type, body) =
                    &responses[index.min(responses.len() - 1)];
                let reason = match status {
                    200 => "OK",
                    403 => "Forbidden",
                    404 => "Not Found",
                    429 => "Too Many Requests",
                    _ => "Unknown",
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    content_type,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

/// Serves the same 200 HTML page to every connection.
async fn serve_fixture(html: &str) -> String {
    serve_script(vec![(200, "text/html; charset=utf-8", html.to_string())]).await
}

#[tokio::test]
async fn test_end_to_end_lightweight_scrape() {
    // No explicit engine, cache miss: the router probes the fixture,
    // classifies it as simple script-free markup and picks the
    // lightweight engine.
    let base = serve_fixture("<html><body><h1>Example</h1></body></html>").await;

    let gleaner = Gleaner::builder().build();
    let request = ScrapeRequest::new(&base).with_selector("title", "h1");
    let result = gleaner.scrape(request).await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.field("title").unwrap(), "Example");
    assert_eq!(result.metadata.engine, FetchEngine::Lightweight);
    assert_eq!(result.metadata.status_code, Some(200));
    assert!(result.metadata.content_length.unwrap() > 0);
}

#[tokio::test]
async fn test_end_to_end_multiple_fields_and_misses() {
    let base = serve_fixture(
        "<html><body><h1>Title</h1><p class=\"lead\">Intro</p></body></html>",
    )
    .await;

    let gleaner = Gleaner::builder().build();
    let request = ScrapeRequest::new(&base)
        .with_engine(FetchEngine::Lightweight)
        .with_selector("title", "h1")
        .with_selector("lead", "p.lead")
        .with_selector("missing", "aside.nope");
    let result = gleaner.scrape(request).await;

    assert!(result.success);
    assert_eq!(result.field("title").unwrap(), "Title");
    assert_eq!(result.field("lead").unwrap(), "Intro");
    assert!(result.field("missing").unwrap().is_null());
}

#[tokio::test]
async fn test_end_to_end_ban_then_recovery() {
    // First response is a ban signal; the direct retry succeeds.
    let base = serve_script(vec![
        (429, "text/html", "slow down".to_string()),
        (
            200,
            "text/html",
            "<html><body><h1>Recovered</h1></body></html>".to_string(),
        ),
    ])
    .await;

    let gleaner = Gleaner::builder().build();
    let request = ScrapeRequest::new(&base)
        .with_engine(FetchEngine::Lightweight)
        .with_selector("title", "h1")
        .with_retries(2, 50);
    let result = gleaner.scrape(request).await;

    assert!(result.success);
    assert_eq!(result.metadata.attempts, 2);
    assert_eq!(result.field("title").unwrap(), "Recovered");
}

#[tokio::test]
async fn test_end_to_end_fatal_404() {
    let base = serve_script(vec![(404, "text/html", "gone".to_string())]).await;

    let gleaner = Gleaner::builder().build();
    let request = ScrapeRequest::new(&base)
        .with_engine(FetchEngine::Lightweight)
        .with_selector("title", "h1")
        .with_retries(3, 50);
    let result = gleaner.scrape(request).await;

    assert!(!result.success);
    assert_eq!(result.metadata.attempts, 1);
    assert_eq!(result.metadata.status_code, Some(404));
}

#[tokio::test]
async fn test_end_to_end_content_type_rejection() {
    let base = serve_script(vec![(200, "application/json", "{}".to_string())]).await;

    let gleaner = Gleaner::builder().build();
    let request = ScrapeRequest::new(&base)
        .with_engine(FetchEngine::Lightweight)
        .with_selector("title", "h1");
    let result = gleaner.scrape(request).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("application/json"));
}

#[tokio::test]
async fn test_end_to_end_raw_html() {
    let html = "<html><body><h1>Raw</h1></body></html>";
    let base = serve_fixture(html).await;

    let gleaner = Gleaner::builder().build();
    let request = ScrapeRequest::new(&base)
        .with_engine(FetchEngine::Lightweight)
        .with_raw_html();
    let result = gleaner.scrape(request).await;

    assert!(result.success);
    assert_eq!(result.raw_html.as_deref(), Some(html));
}

#[tokio::test]
async fn test_router_routes_framework_page_to_browser() {
    let base = serve_fixture(
        r#"<html><body><div id="__next"></div>
        <script id="__NEXT_DATA__" type="application/json">{}</script></body></html>"#,
    )
    .await;

    let router = gleaner::router::EngineRouter::new();
    let decision = router.decide(&ScrapeRequest::new(&base)).await;

    assert_eq!(decision.engine, FetchEngine::Browser);
    assert_eq!(decision.confidence, 0.9);
}

#[tokio::test]
async fn test_router_second_decision_comes_from_cache() {
    let base = serve_fixture("<html><body><h1>Static</h1></body></html>").await;

    let router = gleaner::router::EngineRouter::new();
    let request = ScrapeRequest::new(&base);

    let first = router.decide(&request).await;
    assert!(first.reason.contains("probed"));

    let second = router.decide(&request).await;
    assert_eq!(second.engine, first.engine);
    assert!(second.reason.contains("from cache"));
}

mod network_tests {
    use super::*;

    #[tokio::test]
    #[ignore]
    async fn test_scrape_example_com() {
        let gleaner = Gleaner::builder().build();
        let request = ScrapeRequest::new("https://example.com").with_selector("title", "h1");
        let result = gleaner.scrape(request).await;

        assert!(result.success, "error: {:?}", result.error);
        let title = result.field("title").unwrap().as_str().unwrap();
        println!("example.com h1: {}", title);
        assert!(!title.is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_probe_real_site() {
        let router = gleaner::router::EngineRouter::new();
        let decision = router
            .decide(&ScrapeRequest::new("https://example.com"))
            .await;
        println!(
            "example.com -> {} ({:.2}): {}",
            decision.engine, decision.confidence, decision.reason
        );
    }

    #[cfg(feature = "headless")]
    #[tokio::test]
    #[ignore]
    async fn test_browser_engine_renders() {
        let gleaner = Gleaner::builder().build();
        let request = ScrapeRequest::new("https://example.com")
            .with_engine(FetchEngine::Browser)
            .with_selector("title", "h1");
        let result = gleaner.scrape(request).await;
        gleaner.close().await;

        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.metadata.engine, FetchEngine::Browser);
    }
}
