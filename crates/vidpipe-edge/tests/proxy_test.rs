//! Edge proxy behavior against a local storage backend.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;
use vidpipe_core::EdgeConfig;
use vidpipe_storage::{LocalStorage, Storage};

async fn app() -> (Router, tempfile::TempDir) {
    let store = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalStorage::new(store.path()).await.unwrap());

    storage
        .put_object(
            "videos/123/playlist.m3u8",
            b"#EXTM3U\n#EXTINF:6.0,\nseg_00000.ts\n#EXT-X-ENDLIST\n".to_vec(),
            "application/vnd.apple.mpegurl",
        )
        .await
        .unwrap();
    storage
        .put_object(
            "videos/123/seg_00000.ts",
            b"0123456789".to_vec(),
            "video/MP2T",
        )
        .await
        .unwrap();

    let config = EdgeConfig {
        server_port: 0,
        key_root: "videos".to_string(),
    };
    (vidpipe_edge::router(storage, &config), store)
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_check_returns_ok() {
    let (app, _store) = app().await;
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_object_is_404_with_cors() {
    let (app, _store) = app().await;
    let response = app.oneshot(get("/videos/999/playlist.m3u8")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

#[tokio::test]
async fn playlist_served_with_short_cache() {
    let (app, _store) = app().await;
    let response = app.oneshot(get("/videos/123/playlist.m3u8")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/vnd.apple.mpegurl"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=30");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.starts_with(b"#EXTM3U"));
}

#[tokio::test]
async fn segment_served_immutable() {
    let (app, _store) = app().await;
    let response = app.oneshot(get("/videos/123/seg_00000.ts")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/MP2T");
    let cache = response.headers()[header::CACHE_CONTROL].to_str().unwrap();
    assert!(cache.contains("max-age=86400"));
    assert!(cache.contains("immutable"));
}

#[tokio::test]
async fn options_preflight_is_204_anywhere() {
    let (app, _store) = app().await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/anything/at/all")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    let methods = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap();
    assert!(methods.contains("GET"));
    assert!(methods.contains("HEAD"));
}

#[tokio::test]
async fn head_returns_headers_without_body() {
    let (app, _store) = app().await;
    let request = Request::builder()
        .method(Method::HEAD)
        .uri("/videos/123/seg_00000.ts")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());
}

#[tokio::test]
async fn byte_range_returns_partial_content() {
    let (app, _store) = app().await;
    let request = Request::builder()
        .uri("/videos/123/seg_00000.ts")
        .header(header::RANGE, "bytes=2-5")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 2-5/10");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"2345");
}

#[tokio::test]
async fn range_past_end_is_416() {
    let (app, _store) = app().await;
    let request = Request::builder()
        .uri("/videos/123/seg_00000.ts")
        .header(header::RANGE, "bytes=100-200")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */10");
}

#[tokio::test]
async fn malformed_range_falls_back_to_full_body() {
    let (app, _store) = app().await;
    let request = Request::builder()
        .uri("/videos/123/seg_00000.ts")
        .header(header::RANGE, "bytes=0-3,5-9")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"0123456789");
}

#[tokio::test]
async fn paths_outside_key_root_are_404() {
    let (app, _store) = app().await;
    let response = app.oneshot(get("/secrets/123/file.txt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn traversal_attempts_are_404() {
    let (app, _store) = app().await;
    let response = app.oneshot(get("/videos/../etc/passwd")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsupported_method_is_405() {
    let (app, _store) = app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/videos/123/playlist.m3u8")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let allow = response.headers()[header::ALLOW].to_str().unwrap();
    assert!(allow.contains("GET"));
}
