//! Integration tests for the timeline locator and image fetcher using wiremock

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wikitimelines::crawler::fetcher::DEFAULT_CONTENT_TYPE;
use wikitimelines::crawler::{HttpImageFetcher, ImageFetcher, WikiClient};
use wikitimelines::parser::{ImageLocator, TimelineLocator};
use wikitimelines::utils::error::FetchError;

fn client() -> WikiClient {
    WikiClient::with_settings("wikitimelines-test", std::time::Duration::from_secs(5), 100)
        .unwrap()
}

fn article(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Article</title></head>
<body><div id="content">{body}</div></body>
</html>"#
    )
}

#[tokio::test]
async fn test_locates_protocol_relative_image() {
    let server = MockServer::start().await;
    let html = article(
        r#"<img src="/static/logo.png">
<div class="timeline-wrapper"><img src="//upload.wikimedia.org/timeline/abc.png" width="800"></div>
<div class="timeline-wrapper"><img src="//upload.wikimedia.org/timeline/second.png"></div>"#,
    );

    Mock::given(method("GET"))
        .and(path("/wiki/Timeline_of_Example"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .expect(1)
        .mount(&server)
        .await;

    let locator = TimelineLocator::new(client(), &server.uri()).unwrap();
    let image = locator
        .locate_image("Timeline of Example")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(image.title, "Timeline of Example");
    assert_eq!(image.image_url, "https://upload.wikimedia.org/timeline/abc.png");
}

#[tokio::test]
async fn test_root_relative_image_resolves_against_origin() {
    let server = MockServer::start().await;
    let html = article(r#"<div class="timeline-wrapper"><img src="/images/timeline/x.png"></div>"#);

    Mock::given(method("GET"))
        .and(path("/wiki/Example"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let locator = TimelineLocator::new(client(), &server.uri()).unwrap();
    let image = locator.locate_image("Example").await.unwrap().unwrap();

    assert_eq!(image.image_url, format!("{}/images/timeline/x.png", server.uri()));
}

#[tokio::test]
async fn test_article_without_timeline_is_none() {
    let server = MockServer::start().await;
    let html = article(r#"<img src="//upload.wikimedia.org/photo.jpg"><div class="timeline-wrapper"></div>"#);

    Mock::given(method("GET"))
        .and(path("/wiki/Plain_Article"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let locator = TimelineLocator::new(client(), &server.uri()).unwrap();
    assert!(locator.locate_image("Plain Article").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unusable_image_src_is_none() {
    let server = MockServer::start().await;
    let html = article(r#"<div class="timeline-wrapper"><img src="https://"></div>"#);

    Mock::given(method("GET"))
        .and(path("/wiki/Broken_Timeline"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .expect(1)
        .mount(&server)
        .await;

    let locator = TimelineLocator::new(client(), &server.uri()).unwrap();
    let result = locator.locate_image("Broken Timeline").await;
    assert!(matches!(result, Ok(None)), "got {result:?}");
}

#[tokio::test]
async fn test_missing_article_is_status_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let locator = TimelineLocator::new(client(), &server.uri()).unwrap();
    let err = locator.locate_image("Gone").await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }), "got {err:?}");
}

#[tokio::test]
async fn test_fetch_image_reports_content_type() {
    let server = MockServer::start().await;
    let png = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a];

    Mock::given(method("GET"))
        .and(path("/timeline/abc.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png.clone(), "image/png"))
        .mount(&server)
        .await;

    let fetcher = HttpImageFetcher::new(client());
    let payload = fetcher
        .fetch_image(&format!("{}/timeline/abc.png", server.uri()))
        .await
        .unwrap();

    assert_eq!(payload.content_type, "image/png");
    assert_eq!(payload.bytes.as_ref(), png.as_slice());
    assert_eq!(payload.len(), 6);
}

#[tokio::test]
async fn test_fetch_image_without_content_type_uses_default() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/blob"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let fetcher = HttpImageFetcher::new(client());
    let payload = fetcher
        .fetch_image(&format!("{}/blob", server.uri()))
        .await
        .unwrap();

    assert_eq!(payload.content_type, DEFAULT_CONTENT_TYPE);
    assert!(payload.is_empty());
}

#[tokio::test]
async fn test_fetch_image_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher = HttpImageFetcher::new(client());
    let err = fetcher
        .fetch_image(&format!("{}/timeline/abc.png", server.uri()))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
}
