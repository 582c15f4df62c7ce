//! Rate limiter tests with crawl directives served over HTTP

use crate::common::test_user_agent;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_gather::adapters::build_http_client;
use sumi_gather::config::RateLimitConfig;
use sumi_gather::limiter::{AcquireError, DomainRateLimiter};
use sumi_gather::robots::{DirectiveSource, HttpDirectiveSource, ParsedRobots};
use sumi_gather::storage::{open_directive_store, DirectiveStore};
use sumi_gather::url::domain_key;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        requests_per_second: 100.0,
        burst: 10,
        max_acquire_wait_ms: 5_000,
        ..RateLimitConfig::default()
    }
}

fn http_limiter(config: RateLimitConfig) -> DomainRateLimiter {
    let client = build_http_client(&test_user_agent()).unwrap();
    DomainRateLimiter::new(config, "TestBot", Arc::new(HttpDirectiveSource::new(client)))
}

async fn serve_robots(server: &MockServer, content: &str, expected_fetches: u64) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(content))
        .expect(expected_fetches)
        .mount(server)
        .await;
}

fn page(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
}

/// Allows everything and counts how often it was asked
#[derive(Default)]
struct CountingSource {
    fetches: AtomicUsize,
}

#[async_trait]
impl DirectiveSource for CountingSource {
    async fn fetch(&self, _url: &Url) -> ParsedRobots {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        ParsedRobots::allow_all()
    }
}

#[tokio::test]
async fn test_disallowed_path_refused_without_token() {
    let server = MockServer::start().await;
    serve_robots(&server, "User-agent: *\nDisallow: /private", 1).await;

    let limiter = http_limiter(rate_limit());
    let private = page(&server, "/private/report");
    let domain = domain_key(&private).unwrap();

    let err = limiter.acquire(&private).await.unwrap_err();
    assert!(matches!(err, AcquireError::Disallowed { .. }));
    assert_eq!(limiter.granted(&domain).await, 0);

    limiter.acquire(&page(&server, "/public")).await.unwrap();
    assert_eq!(limiter.granted(&domain).await, 1);
}

#[tokio::test]
async fn test_agent_specific_group_applies() {
    let server = MockServer::start().await;
    serve_robots(
        &server,
        "User-agent: TestBot\nDisallow: /\n\nUser-agent: *\nAllow: /",
        1,
    )
    .await;

    let limiter = http_limiter(rate_limit());
    let err = limiter.acquire(&page(&server, "/anything")).await.unwrap_err();
    assert!(matches!(err, AcquireError::Disallowed { .. }));
}

#[tokio::test]
async fn test_directives_fetched_once_per_domain() {
    let server = MockServer::start().await;
    serve_robots(&server, "User-agent: *\nAllow: /", 1).await;

    let limiter = Arc::new(http_limiter(rate_limit()));
    let mut handles = Vec::new();
    for i in 0..5 {
        let limiter = Arc::clone(&limiter);
        let url = page(&server, &format!("/page{}", i));
        handles.push(tokio::spawn(async move { limiter.acquire(&url).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(limiter.domain_count(), 1);
    // The mock's expect(1) is verified when the server drops
}

#[tokio::test]
async fn test_crawl_delay_spaces_requests() {
    let server = MockServer::start().await;
    serve_robots(&server, "User-agent: *\nCrawl-delay: 1", 1).await;

    let limiter = http_limiter(rate_limit());
    let first = limiter.acquire(&page(&server, "/a")).await.unwrap();
    let second = limiter.acquire(&page(&server, "/b")).await.unwrap();

    let gap = second.granted_at.duration_since(first.granted_at);
    assert!(gap >= Duration::from_millis(950), "only {:?} apart", gap);
    assert_eq!(limiter.bucket_capacity(&first.domain).await, Some(1.0));
}

#[tokio::test]
async fn test_crawl_delay_beyond_wait_bound() {
    let server = MockServer::start().await;
    serve_robots(&server, "User-agent: *\nCrawl-delay: 10", 1).await;

    let mut config = rate_limit();
    config.max_acquire_wait_ms = 200;
    let limiter = http_limiter(config);

    limiter.acquire(&page(&server, "/a")).await.unwrap();
    let err = limiter.acquire(&page(&server, "/b")).await.unwrap_err();
    match err {
        AcquireError::WaitExceeded { retry_after, .. } => {
            assert!(retry_after > Duration::from_secs(5));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_stored_directives_survive_restart() {
    let server = MockServer::start().await;
    serve_robots(&server, "User-agent: *\nDisallow: /private", 1).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("directives.db");
    let private = page(&server, "/private/x");

    {
        let store = open_directive_store(&db_path).unwrap();
        let limiter = http_limiter(rate_limit()).with_store(Arc::new(Mutex::new(store)));
        assert!(limiter.acquire(&private).await.is_err());
    }

    let store = open_directive_store(&db_path).unwrap();
    assert_eq!(store.count_directives().unwrap(), 1);

    let source = Arc::new(CountingSource::default());
    let limiter = DomainRateLimiter::new(rate_limit(), "TestBot", source.clone())
        .with_store(Arc::new(Mutex::new(store)));

    let err = limiter.acquire(&private).await.unwrap_err();
    assert!(matches!(err, AcquireError::Disallowed { .. }));
    limiter.acquire(&page(&server, "/public")).await.unwrap();
    assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_robots_allows_all() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let limiter = http_limiter(rate_limit());
    limiter.acquire(&page(&server, "/private")).await.unwrap();
}
