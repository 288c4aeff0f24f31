use axum::body::Body;
use axum::http::Request;
use serde_json::json;
use tower::ServiceExt;

use super::*;
use crate::state::test_helpers::{TEST_API_KEY, body_json, dead_upstream, spawn_upstream, test_app_state};

async fn proxied(upstream: &str, request: Request<Body>) -> Response {
    let app = crate::routes::app(test_app_state(upstream));
    app.oneshot(request).await.expect("router is infallible")
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method(Method::GET).uri(uri)
}

// =============================================================================
// forwarding
// =============================================================================

#[tokio::test]
async fn get_without_authorization_injects_api_key() {
    let upstream = spawn_upstream().await;
    let response = proxied(&upstream, get("/api/agents?page=2").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let echo = body_json(response).await;
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["path"], "/agents");
    assert_eq!(echo["query"], "page=2");
    assert_eq!(echo["headers"][API_KEY_HEADER], TEST_API_KEY);
    assert_eq!(echo["body"], "");
}

#[tokio::test]
async fn authorization_suppresses_api_key() {
    let upstream = spawn_upstream().await;
    let request = get("/api/agents")
        .header(header::AUTHORIZATION, "Bearer abc.def.ghi")
        .body(Body::empty())
        .unwrap();
    let echo = body_json(proxied(&upstream, request).await).await;
    assert_eq!(echo["headers"]["authorization"], "Bearer abc.def.ghi");
    assert!(echo["headers"].get(API_KEY_HEADER).is_none());
}

#[tokio::test]
async fn empty_authorization_still_gets_api_key() {
    let upstream = spawn_upstream().await;
    let request = get("/api/agents")
        .header(header::AUTHORIZATION, "")
        .body(Body::empty())
        .unwrap();
    let echo = body_json(proxied(&upstream, request).await).await;
    assert_eq!(echo["headers"][API_KEY_HEADER], TEST_API_KEY);
}

#[tokio::test]
async fn caller_api_key_is_replaced() {
    let upstream = spawn_upstream().await;
    let request = get("/api/agents")
        .header(API_KEY_HEADER, "forged")
        .body(Body::empty())
        .unwrap();
    let echo = body_json(proxied(&upstream, request).await).await;
    assert_eq!(echo["headers"][API_KEY_HEADER], TEST_API_KEY);
}

#[tokio::test]
async fn nested_path_and_repeated_query_pass_through() {
    let upstream = spawn_upstream().await;
    let request = get("/api/blogs/posts/7?tag=a&tag=b&sort=new").body(Body::empty()).unwrap();
    let echo = body_json(proxied(&upstream, request).await).await;
    assert_eq!(echo["path"], "/blogs/posts/7");
    assert_eq!(echo["query"], "tag=a&tag=b&sort=new");
}

#[tokio::test]
async fn encoded_path_characters_stay_encoded() {
    let upstream = spawn_upstream().await;
    for (uri, path) in [
        ("/api/files/a%23b", "/files/a%23b"),
        ("/api/files/a%3Fx%3D1", "/files/a%3Fx%3D1"),
        ("/api/files/a%2Fb", "/files/a%2Fb"),
    ] {
        let echo = body_json(proxied(&upstream, get(uri).body(Body::empty()).unwrap()).await).await;
        assert_eq!(echo["path"], path, "for {uri}");
        assert!(echo["query"].is_null(), "for {uri}");
    }
}

#[tokio::test]
async fn no_query_sends_no_query() {
    let upstream = spawn_upstream().await;
    let echo = body_json(proxied(&upstream, get("/api/agents").body(Body::empty()).unwrap()).await).await;
    assert!(echo["query"].is_null());
}

#[tokio::test]
async fn inbound_host_is_not_forwarded() {
    let upstream = spawn_upstream().await;
    let request = get("/api/agents")
        .header(header::HOST, "portal.example.test")
        .header("x-request-id", "r-1")
        .body(Body::empty())
        .unwrap();
    let echo = body_json(proxied(&upstream, request).await).await;
    assert_ne!(echo["headers"]["host"], "portal.example.test");
    assert_eq!(echo["headers"]["x-request-id"], "r-1");
}

#[tokio::test]
async fn post_forwards_json_object_unmodified() {
    let upstream = spawn_upstream().await;
    let payload = json!({ "title": "Hello", "tags": ["a", "b"], "status": "draft" });
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/blogs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let echo = body_json(proxied(&upstream, request).await).await;
    assert_eq!(echo["method"], "POST");
    let forwarded: Value = serde_json::from_str(echo["body"].as_str().unwrap()).unwrap();
    assert_eq!(forwarded, payload);
}

#[tokio::test]
async fn put_forwards_json_array() {
    let upstream = spawn_upstream().await;
    let payload = json!([{ "id": 1 }, { "id": 2 }]);
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/api/agents/order")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let echo = body_json(proxied(&upstream, request).await).await;
    let forwarded: Value = serde_json::from_str(echo["body"].as_str().unwrap()).unwrap();
    assert_eq!(forwarded, payload);
}

#[tokio::test]
async fn post_forwards_form_as_json_object() {
    let upstream = spawn_upstream().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/agents")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("name=Rina&email=r%40x.id"))
        .unwrap();
    let echo = body_json(proxied(&upstream, request).await).await;
    assert_eq!(echo["headers"]["content-type"], "application/json");
    let forwarded: Value = serde_json::from_str(echo["body"].as_str().unwrap()).unwrap();
    assert_eq!(forwarded, json!({ "name": "Rina", "email": "r@x.id" }));
}

#[tokio::test]
async fn get_never_forwards_a_body() {
    let upstream = spawn_upstream().await;
    let request = get("/api/agents").body(Body::from(r#"{"sneaky":true}"#)).unwrap();
    let echo = body_json(proxied(&upstream, request).await).await;
    assert_eq!(echo["body"], "");
}

#[tokio::test]
async fn post_with_primitive_body_forwards_nothing() {
    let upstream = spawn_upstream().await;
    for raw in ["42", "null", "\"text\"", "not json at all"] {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/agents")
            .body(Body::from(raw))
            .unwrap();
        let echo = body_json(proxied(&upstream, request).await).await;
        assert_eq!(echo["body"], "", "expected no body for {raw:?}");
    }
}

// =============================================================================
// failures
// =============================================================================

#[tokio::test]
async fn upstream_error_is_normalized() {
    let upstream = spawn_upstream().await;
    let response = proxied(&upstream, get("/api/missing").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body, json!({ "statusCode": 404, "statusMessage": "Not Found", "message": "Not found" }));
}

#[tokio::test]
async fn non_json_upstream_error_gets_default_message() {
    let upstream = spawn_upstream().await;
    let response = proxied(&upstream, get("/api/broken").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["statusMessage"], "Bad Gateway");
    assert_eq!(body["message"], DEFAULT_ERROR_MESSAGE);
    assert!(!body.to_string().contains("exploded"));
}

#[tokio::test]
async fn blank_upstream_message_gets_default_message() {
    let upstream = spawn_upstream().await;
    let response = proxied(&upstream, get("/api/blank-message").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["message"], DEFAULT_ERROR_MESSAGE);
}

/// Upstream that promises a longer error body than it sends, then hangs up.
async fn truncated_error_upstream() -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0_u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 100\r\n\r\n{\"message\":\"par")
                .await;
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn unreadable_error_body_gets_default_message() {
    let upstream = truncated_error_upstream().await;
    let response = proxied(&upstream, get("/api/agents").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["message"], DEFAULT_ERROR_MESSAGE);
}

#[tokio::test]
async fn unreachable_upstream_is_500() {
    let upstream = dead_upstream().await;
    let response = proxied(&upstream, get("/api/agents").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({ "statusCode": 500, "statusMessage": "Internal Server Error", "message": DEFAULT_ERROR_MESSAGE })
    );
}

#[tokio::test]
async fn missing_base_url_is_500() {
    let response = proxied("", get("/api/agents").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["message"], DEFAULT_ERROR_MESSAGE);
}

// =============================================================================
// helpers
// =============================================================================

#[test]
fn carries_body_is_case_insensitive() {
    assert!(carries_body(&Method::POST));
    assert!(carries_body(&Method::PATCH));
    assert!(carries_body(&Method::from_bytes(b"put").unwrap()));
    assert!(!carries_body(&Method::GET));
    assert!(!carries_body(&Method::DELETE));
}

#[test]
fn json_body_accepts_only_structured_values() {
    let none = HeaderMap::new();
    assert_eq!(json_body(&Method::POST, &none, br#"{"a":1}"#), Some(json!({ "a": 1 })));
    assert_eq!(json_body(&Method::POST, &none, b"[1]"), Some(json!([1])));
    assert_eq!(json_body(&Method::POST, &none, b"null"), None);
    assert_eq!(json_body(&Method::POST, &none, b""), None);
    assert_eq!(json_body(&Method::DELETE, &none, br#"{"a":1}"#), None);
}

#[test]
fn json_body_decodes_form_into_object() {
    let mut form = HeaderMap::new();
    form.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("Application/X-WWW-Form-Urlencoded; charset=UTF-8"),
    );
    assert_eq!(
        json_body(&Method::PATCH, &form, b"tag=a&name=Rina+K&tag=b&tag=c"),
        Some(json!({ "tag": ["a", "b", "c"], "name": "Rina K" }))
    );
    assert_eq!(json_body(&Method::GET, &form, b"name=Rina"), None);
}

#[test]
fn raw_suffix_keeps_percent_encoding() {
    let uri: Uri = "/api/files/a%2Fb%23c?x=1".parse().unwrap();
    assert_eq!(raw_suffix(&uri), "files/a%2Fb%23c");
}

#[test]
fn upstream_message_reads_message_field() {
    assert_eq!(upstream_message(br#"{"message":"Nope"}"#), Some("Nope".into()));
    assert_eq!(upstream_message(br#"{"message":""}"#), None);
    assert_eq!(upstream_message(br#"{"message":7}"#), None);
    assert_eq!(upstream_message(b"<html>"), None);
}

#[test]
fn unknown_status_falls_back_to_generic_reason() {
    let err = ProxyError::Upstream { status: StatusCode::from_u16(599).unwrap(), message: None };
    let body = err.body();
    assert_eq!(body.status_code, 599);
    assert_eq!(body.status_message, "Internal Server Error");
    assert_eq!(body.message, DEFAULT_ERROR_MESSAGE);
}
