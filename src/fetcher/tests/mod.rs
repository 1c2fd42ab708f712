// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = r#"<rss version="2.0"><channel><title>t</title></channel></rss>"#;

fn fetcher(timeout: Duration) -> ConditionalFetcher {
    ConditionalFetcher::new(&FetchConfig {
        timeout,
        ..Default::default()
    })
    .unwrap()
}

/// Mount `/hop/0` → `/hop/1` → ... → `/hop/{redirects}`, the last one serving the feed
async fn mount_redirect_chain(server: &MockServer, redirects: u32) {
    for hop in 0..redirects {
        Mock::given(method("GET"))
            .and(path(format!("/hop/{hop}")))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("/hop/{}", hop + 1)),
            )
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(format!("/hop/{redirects}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_captures_validators_and_sends_default_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .and(header("user-agent", "rss-parser"))
        .and(header("accept", "application/rss+xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .insert_header("Last-Modified", "Wed, 01 Jan 2025 00:00:00 GMT")
                .set_body_string(FEED),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/feed.xml", server.uri());
    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&url, &ValidatorCache::new())
        .await
        .unwrap();

    match outcome {
        FetchOutcome::Fetched(feed) => {
            assert_eq!(feed.body, FEED);
            assert_eq!(feed.final_url, url);
            assert_eq!(feed.validators.etag.as_deref(), Some("\"v1\""));
            assert_eq!(
                feed.validators.last_modified.as_deref(),
                Some("Wed, 01 Jan 2025 00:00:00 GMT")
            );
        }
        other => panic!("expected a body, got {other:?}"),
    }
}

#[tokio::test]
async fn test_conditional_request_resolves_not_modified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .and(header("if-none-match", "\"v1\""))
        .and(header_exists("if-modified-since"))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .expect(0)
        .mount(&server)
        .await;

    let url = format!("{}/feed.xml", server.uri());
    let mut cache = ValidatorCache::new();
    cache.record(
        url.clone(),
        Validators {
            etag: Some("\"v1\"".into()),
            last_modified: Some("Wed, 01 Jan 2025 00:00:00 GMT".into()),
        },
    );

    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&url, &cache)
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::NotModified { url });
}

#[tokio::test]
async fn test_five_redirects_are_followed() {
    let server = MockServer::start().await;
    mount_redirect_chain(&server, 5).await;

    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/hop/0", server.uri()), &ValidatorCache::new())
        .await
        .unwrap();

    match outcome {
        FetchOutcome::Fetched(feed) => {
            assert_eq!(feed.final_url, format!("{}/hop/5", server.uri()));
        }
        other => panic!("expected a body, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sixth_redirect_fails() {
    let server = MockServer::start().await;
    mount_redirect_chain(&server, 6).await;

    let result = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/hop/0", server.uri()), &ValidatorCache::new())
        .await;

    assert!(
        matches!(result, Err(FetchError::TooManyRedirects { max: 5, .. })),
        "got {result:?}"
    );
}

#[tokio::test]
async fn test_redirect_target_gets_its_own_validators() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .and(header("if-none-match", "\"new-tag\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let new_url = format!("{}/new", server.uri());
    let mut cache = ValidatorCache::new();
    cache.record(
        new_url.clone(),
        Validators {
            etag: Some("\"new-tag\"".into()),
            last_modified: None,
        },
    );

    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/old", server.uri()), &cache)
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::NotModified { url: new_url });
}

#[tokio::test]
async fn test_error_status_is_bad_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/gone.xml", server.uri()), &ValidatorCache::new())
        .await;
    assert!(matches!(
        result,
        Err(FetchError::BadStatus { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_redirect_without_location_is_bad_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(302))
        .mount(&server)
        .await;

    let result = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/feed.xml", server.uri()), &ValidatorCache::new())
        .await;
    assert!(matches!(
        result,
        Err(FetchError::BadStatus { status: 302, .. })
    ));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(FEED)
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let start = std::time::Instant::now();
    let result = fetcher(Duration::from_millis(150))
        .fetch(&format!("{}/feed.xml", server.uri()), &ValidatorCache::new())
        .await;

    assert!(matches!(result, Err(FetchError::Timeout { .. })), "got {result:?}");
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_unparseable_url_is_invalid() {
    let result = fetcher(Duration::from_secs(1))
        .fetch("not a url", &ValidatorCache::new())
        .await;
    assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
}
