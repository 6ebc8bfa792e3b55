//! HTTP route tests driven through the router with `oneshot`

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use tower::ServiceExt;

use common::{Harness, HarnessOptions};
use wikitimelines::config::ServerConfig;
use wikitimelines::metrics;
use wikitimelines::publisher::PublishStage;
use wikitimelines::server::{create_router, AppState};

fn router(options: HarnessOptions) -> Router {
    let harness = Harness::build(options);
    let state = AppState::new(Arc::new(harness.orchestrator), ServerConfig::default());
    create_router(state)
}

fn one_article() -> HarnessOptions {
    HarnessOptions {
        titles: vec!["Timeline of Example"],
        with_image: vec!["Timeline of Example"],
        ..Default::default()
    }
}

async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_post_then_already_posted() {
    let app = router(one_article());

    let (status, body) = send(&app, Method::POST, "/post").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["state"], "done");
    assert_eq!(body["data"]["receipt"]["title"], "Timeline of Example");

    // Any method triggers a run
    let (status, body) = send(&app, Method::GET, "/post").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["data"]["state"], "suppressed");
    assert_eq!(body["data"]["message"], "already posted");
}

#[tokio::test]
async fn test_post_not_found_is_404() {
    let app = router(HarnessOptions {
        titles: vec!["ArticleA"],
        ..Default::default()
    });

    let (status, body) = send(&app, Method::POST, "/post").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body = json(&body);
    assert_eq!(body["success"], false);
    assert_eq!(body["state"], "exhausted");
}

#[tokio::test]
async fn test_publish_failure_is_502() {
    let app = router(HarnessOptions {
        publish_fail_at: Some(PublishStage::Post),
        ..one_article()
    });

    let (status, body) = send(&app, Method::POST, "/post").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json(&body)["state"], "failed");
}

#[tokio::test]
async fn test_gate_failure_is_500() {
    let app = router(HarnessOptions {
        store_fail_get: true,
        ..one_article()
    });

    let (status, _) = send(&app, Method::POST, "/post").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_preview_json_and_html() {
    let app = router(one_article());

    let (status, body) = send(&app, Method::GET, "/preview").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["data"]["title"], "Timeline of Example");
    assert_eq!(body["data"]["content_type"], "image/png");
    assert!(body["data"].get("payload").is_none());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/preview?format=html")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("<h1>Timeline of Example</h1>"));

    // Previews never post, so a real run is still allowed
    let (_, body) = send(&app, Method::POST, "/post").await;
    assert_eq!(json(&body)["data"]["state"], "done");
}

#[tokio::test]
async fn test_index_lists_routes() {
    let app = router(one_article());

    let (status, body) = send(&app, Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["name"], "wikitimelines");
    let paths: Vec<&str> = body["routes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["path"].as_str().unwrap())
        .collect();
    assert!(paths.contains(&"/post"));
    assert!(paths.contains(&"/preview"));
}

#[tokio::test]
async fn test_candidates_and_health() {
    let app = router(HarnessOptions {
        titles: vec!["ArticleA", "ArticleB"],
        ..Default::default()
    });

    let (status, body) = send(&app, Method::GET, "/candidates").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["data"]["count"], 2);

    let (status, body) = send(&app, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["publisher"], "recording");
    assert!(body["data"].get("schedule").is_none());
}

#[tokio::test]
async fn test_metrics_exposition() {
    metrics::init_metrics().unwrap();
    let app = router(one_article());

    send(&app, Method::POST, "/post").await;
    let (status, body) = send(&app, Method::GET, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("wikitimelines_"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = router(one_article());
    let (status, _) = send(&app, Method::GET, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
