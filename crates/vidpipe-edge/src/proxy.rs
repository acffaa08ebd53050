//! Edge delivery proxy.
//!
//! Stateless request handler mapping URL paths to storage keys. Serves
//! GET/HEAD with content-type and cache-control inferred from the file
//! extension, answers OPTIONS unconditionally for CORS preflight, and
//! honors single byte-range requests. Storage misses are ordinary 404s;
//! internal storage errors never leak beyond a 404.

use crate::range::parse_range_header;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use vidpipe_core::media::{cache_control_for, content_type_for};
use vidpipe_core::EdgeConfig;
use vidpipe_storage::keys::validate_key;
use vidpipe_storage::{Storage, StorageError};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub key_root: String,
}

pub fn router(storage: Arc<dyn Storage>, config: &EdgeConfig) -> Router {
    let state = AppState {
        storage,
        key_root: config.key_root.clone(),
    };
    Router::new()
        .route("/health", get(health))
        .fallback(serve_object)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn serve_object(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    // Preflight never touches storage.
    if method == Method::OPTIONS {
        return preflight();
    }
    if method != Method::GET && method != Method::HEAD {
        let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD, OPTIONS"));
        return with_cors(response);
    }

    let path = uri.path().trim_start_matches('/');
    let key = match validate_key(path) {
        Ok(key) => key,
        Err(_) => return not_found(),
    };
    // Requests outside the configured root are not ours to answer.
    if key.split('/').next() != Some(state.key_root.as_str()) {
        return not_found();
    }

    let total_size = match state.storage.content_length(key).await {
        Ok(size) => size,
        Err(StorageError::NotFound(_)) => return not_found(),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Storage lookup failed");
            return not_found();
        }
    };

    if method == Method::HEAD {
        return with_cors(object_headers(StatusCode::OK, key, total_size).into_response());
    }

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range_header);

    match range {
        Some(range) => match state.storage.download_range(key, range).await {
            Ok(ranged) => {
                let mut response = (
                    StatusCode::PARTIAL_CONTENT,
                    object_headers(StatusCode::PARTIAL_CONTENT, key, ranged.content_length()).1,
                    Body::from_stream(ranged.stream),
                )
                    .into_response();
                insert_header(
                    &mut response,
                    header::CONTENT_RANGE,
                    &format!("bytes {}-{}/{}", ranged.start, ranged.end, ranged.total_size),
                );
                with_cors(response)
            }
            Err(StorageError::RangeNotSatisfiable { size }) => {
                let mut response = StatusCode::RANGE_NOT_SATISFIABLE.into_response();
                insert_header(&mut response, header::CONTENT_RANGE, &format!("bytes */{}", size));
                with_cors(response)
            }
            Err(StorageError::NotFound(_)) => not_found(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Ranged download failed");
                not_found()
            }
        },
        None => match state.storage.download_stream(key).await {
            Ok(stream) => with_cors(
                (
                    StatusCode::OK,
                    object_headers(StatusCode::OK, key, total_size).1,
                    Body::from_stream(stream),
                )
                    .into_response(),
            ),
            Err(StorageError::NotFound(_)) => not_found(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Download failed");
                not_found()
            }
        },
    }
}

/// Common headers for any object response: content type and cache policy
/// by extension, range advertisement, and the body length.
fn object_headers(status: StatusCode, key: &str, content_length: u64) -> (StatusCode, HeaderMap) {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(key)),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control_for(key)),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(value) = HeaderValue::from_str(&content_length.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    (status, headers)
}

fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Range, Content-Type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    response
}

fn not_found() -> Response {
    with_cors(StatusCode::NOT_FOUND.into_response())
}

fn with_cors(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

fn insert_header(response: &mut Response, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers_mut().insert(name, value);
    }
}
