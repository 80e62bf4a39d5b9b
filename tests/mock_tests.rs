//! Mock-based tests for upstream interactions.
//!
//! These tests use wiremock to simulate the model server in both dialects
//! and drive the full router with `tower::ServiceExt::oneshot`.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use llm_gateway::{
    api::{create_router, AppState},
    core::{
        config::{DocumentConfig, ResilienceConfig, ServerConfig, UpstreamConfig},
        init_metrics, AppConfig,
    },
    services::{InMemoryCalendarStore, InMemoryDocumentStore, UpstreamClient},
    transformer::Dialect,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::{
    matchers::{header as header_matcher, method, path},
    Mock, MockServer, ResponseTemplate,
};

// ============================================================================
// Helpers
// ============================================================================

fn test_config(mock_server: &MockServer, dialect: Dialect) -> AppConfig {
    AppConfig {
        server: ServerConfig::default(),
        upstream: UpstreamConfig {
            base_url: mock_server.uri(),
            api_key: Some("upstream-key".to_string()),
            dialect,
            timeout: Duration::from_secs(5),
            verify_tls: true,
        },
        resilience: ResilienceConfig {
            retry_attempts: 2,
            retry_base_delay: Duration::from_millis(10),
            retry_max_delay: None,
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
        },
        api_token: None,
        documents: DocumentConfig::default(),
    }
}

fn create_test_app(config: AppConfig) -> Router {
    init_metrics();
    let upstream = Arc::new(UpstreamClient::new(&config.upstream, &config.resilience).unwrap());
    let documents = Arc::new(InMemoryDocumentStore::new(&config.documents));
    let calendars = Arc::new(InMemoryCalendarStore::new());
    create_router(Arc::new(AppState::new(config, upstream, documents, calendars)))
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn hello(stream: bool) -> Value {
    json!({
        "model": "llama3:8b",
        "messages": [{"role": "user", "content": "Hello there"}],
        "stream": stream
    })
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Split an SSE body into its `data:` payloads.
async fn sse_payloads(response: axum::response::Response) -> Vec<String> {
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    text.split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(|frame| frame.strip_prefix("data: ").unwrap().to_string())
        .collect()
}

fn delta_content(payload: &str) -> Option<String> {
    let chunk: Value = serde_json::from_str(payload).ok()?;
    chunk["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string)
}

async fn upstream_bodies(mock_server: &MockServer, upstream_path: &str) -> Vec<Value> {
    mock_server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == upstream_path)
        .map(|r| r.body_json::<Value>().unwrap())
        .collect()
}

fn openai_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-upstream",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "llama3:8b-instruct",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 9, "total_tokens": 19}
    })
}

fn multipart_upload(session_id: Option<&str>, filename: &str, content: &str) -> Request<Body> {
    let boundary = "gateway-test-boundary";
    let mut body = String::new();
    if let Some(session_id) = session_id {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\n{session_id}\r\n"
        ));
    }
    body.push_str(&format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n--{boundary}--\r\n"
    ));

    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

// ============================================================================
// Non-streaming
// ============================================================================

#[tokio::test]
async fn test_openai_chat_completion() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header_matcher("authorization", "Bearer upstream-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion(" Hi! ")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::OpenAi));
    let response = app.oneshot(chat_request(hello(false))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], "chatcmpl-upstream");
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["created"], 1700000000);
    assert_eq!(body["model"], "llama3:8b-instruct");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "Hi!");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["total_tokens"], 19);

    let sent = upstream_bodies(&mock_server, "/v1/chat/completions").await;
    assert_eq!(sent[0]["model"], "llama3:8b");
    assert_eq!(sent[0]["stream"], false);
    assert_eq!(sent[0]["messages"][0]["content"], "Hello there");
    // Default temperature reaches the upstream unwidened
    assert_eq!(sent[0]["temperature"], json!(0.7));
}

#[tokio::test]
async fn test_native_chat_completion_estimates_usage() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3:8b",
            "message": {"role": "assistant", "content": "  Hi there, friend  "},
            "done": true
        })))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::Native));
    let mut request = hello(false);
    request["max_tokens"] = json!(64);
    request["temperature"] = json!(0.3);
    let response = app.oneshot(chat_request(request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert_eq!(body["model"], "llama3:8b");
    assert_eq!(body["choices"][0]["message"]["content"], "Hi there, friend");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    // "Hello there" is 11 chars, "Hi there, friend" is 16 chars
    assert_eq!(
        body["usage"],
        json!({"prompt_tokens": 2, "completion_tokens": 4, "total_tokens": 6})
    );

    let sent = upstream_bodies(&mock_server, "/api/chat").await;
    assert_eq!(sent[0]["options"]["num_predict"], 64);
    assert_eq!(sent[0]["options"]["temperature"], json!(0.3));
    assert_eq!(sent[0]["stream"], false);
}

#[tokio::test]
async fn test_retries_transient_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion("recovered")))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::OpenAi));
    let response = app.oneshot(chat_request(hello(false))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["choices"][0]["message"]["content"], "recovered");
    assert_eq!(
        upstream_bodies(&mock_server, "/v1/chat/completions").await.len(),
        3
    );
}

#[tokio::test]
async fn test_exhausted_retries_return_bad_gateway() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::OpenAi));
    let response = app.oneshot(chat_request(hello(false))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "upstream_error");
    assert_eq!(body["status_code"], 502);
    // One attempt plus two retries
    assert_eq!(
        upstream_bodies(&mock_server, "/v1/chat/completions").await.len(),
        3
    );
}

#[tokio::test]
async fn test_upstream_bad_request_is_unknown_model_without_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "model not found"})))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::Native));
    let response = app.oneshot(chat_request(hello(false))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "unknown_model");
    assert_eq!(upstream_bodies(&mock_server, "/api/chat").await.len(), 1);
}

#[tokio::test]
async fn test_upstream_forbidden_maps_to_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::OpenAi));
    let response = app.oneshot(chat_request(hello(false))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn test_upstream_timeout_returns_gateway_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(openai_completion("too late"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let mut config = test_config(&mock_server, Dialect::OpenAi);
    config.upstream.timeout = Duration::from_millis(200);
    config.resilience.retry_attempts = 0;

    let app = create_test_app(config);
    let response = app.oneshot(chat_request(hello(false))).await.unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "upstream_timeout");
    assert_eq!(body["status_code"], 504);
}

#[tokio::test]
async fn test_open_circuit_short_circuits_calls() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let mut config = test_config(&mock_server, Dialect::OpenAi);
    config.resilience.retry_attempts = 0;
    config.resilience.breaker_threshold = 1;
    let app = create_test_app(config);

    let first = app.clone().oneshot(chat_request(hello(false))).await.unwrap();
    assert_eq!(first.status(), StatusCode::BAD_GATEWAY);

    let second = app.clone().oneshot(chat_request(hello(false))).await.unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(second).await;
    assert_eq!(body["error"], "service_unavailable");
    assert_eq!(body["status_code"], 503);

    // Model listing degrades to an empty list instead of failing
    let models = app.oneshot(get_request("/models")).await.unwrap();
    assert_eq!(models.status(), StatusCode::OK);
    assert_eq!(body_json(models).await, json!({"object": "list", "data": []}));

    // Only the first call reached the upstream
    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn test_openai_stream_relay() {
    let mock_server = MockServer::start().await;

    let upstream_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
        "data: not json\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(upstream_body, "text/event-stream"))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::OpenAi));
    let response = app.oneshot(chat_request(hello(true))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let payloads = sse_payloads(response).await;
    assert_eq!(payloads.len(), 4);
    assert_eq!(delta_content(&payloads[0]).as_deref(), Some("Hel"));
    assert_eq!(delta_content(&payloads[1]).as_deref(), Some("lo"));

    let last_chunk: Value = serde_json::from_str(&payloads[2]).unwrap();
    assert_eq!(last_chunk["object"], "chat.completion.chunk");
    assert_eq!(last_chunk["choices"][0]["finish_reason"], "stop");
    assert_eq!(payloads[3], "[DONE]");

    let sent = upstream_bodies(&mock_server, "/v1/chat/completions").await;
    assert_eq!(sent[0]["stream"], true);
}

#[tokio::test]
async fn test_native_stream_relay() {
    let mock_server = MockServer::start().await;

    let upstream_body = concat!(
        "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n",
        "\n",
        "{\"message\":{\"content\":\"lo\"},\"done\":false}\n",
        "{\"message\":{\"content\":\"\"},\"done\":true}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(upstream_body, "application/x-ndjson"),
        )
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::Native));
    let response = app.oneshot(chat_request(hello(true))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let payloads = sse_payloads(response).await;
    assert_eq!(payloads.len(), 4);

    let first: Value = serde_json::from_str(&payloads[0]).unwrap();
    let second: Value = serde_json::from_str(&payloads[1]).unwrap();
    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["model"], "llama3:8b");
    assert_eq!(delta_content(&payloads[0]).as_deref(), Some("Hel"));
    assert_eq!(delta_content(&payloads[1]).as_deref(), Some("lo"));

    let finish: Value = serde_json::from_str(&payloads[2]).unwrap();
    assert_eq!(finish["choices"][0]["finish_reason"], "stop");
    assert_eq!(finish["choices"][0]["delta"], json!({}));
    assert_eq!(payloads[3], "[DONE]");
}

#[tokio::test]
async fn test_stream_without_end_marker_still_terminates() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"},\"finish_reason\":null}]}\n\n",
            "text/event-stream",
        ))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::OpenAi));
    let response = app.oneshot(chat_request(hello(true))).await.unwrap();

    let payloads = sse_payloads(response).await;
    assert_eq!(payloads.len(), 2);
    assert_eq!(delta_content(&payloads[0]).as_deref(), Some("partial"));
    assert_eq!(payloads[1], "[DONE]");
}

#[tokio::test]
async fn test_stream_open_failure_emits_inline_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::Native));
    let response = app.oneshot(chat_request(hello(true))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let payloads = sse_payloads(response).await;
    assert_eq!(payloads.len(), 1);
    let error: Value = serde_json::from_str(&payloads[0]).unwrap();
    assert_eq!(error["error"], "upstream_error");
    assert_eq!(error["status_code"], 502);

    // Stream opens are retried like plain requests
    assert_eq!(upstream_bodies(&mock_server, "/api/chat").await.len(), 3);
}

#[tokio::test]
async fn test_stream_with_open_circuit_emits_503_event() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let mut config = test_config(&mock_server, Dialect::OpenAi);
    config.resilience.retry_attempts = 0;
    config.resilience.breaker_threshold = 1;
    let app = create_test_app(config);

    let first = app.clone().oneshot(chat_request(hello(false))).await.unwrap();
    assert_eq!(first.status(), StatusCode::BAD_GATEWAY);

    let response = app.oneshot(chat_request(hello(true))).await.unwrap();
    let payloads = sse_payloads(response).await;
    assert_eq!(payloads.len(), 1);
    let error: Value = serde_json::from_str(&payloads[0]).unwrap();
    assert_eq!(error["error"], "service_unavailable");
    assert_eq!(error["status_code"], 503);
}

// ============================================================================
// Models and health
// ============================================================================

#[tokio::test]
async fn test_native_models_from_tags() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "llama3:8b"}, {"name": "mistral:7b"}]
        })))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::Native));
    let response = app.oneshot(get_request("/models")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"object": "list", "data": [
            {"id": "llama3:8b", "object": "model"},
            {"id": "mistral:7b", "object": "model"}
        ]})
    );
}

#[tokio::test]
async fn test_openai_models_fall_back_after_tags_404() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"id": "gpt-4o-mini", "object": "model"}]
        })))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::OpenAi));

    let response = app.clone().oneshot(get_request("/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"][0]["id"], "gpt-4o-mini");

    let health = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(
        body_json(health).await,
        json!({"status": "ok", "upstream_reachable": true})
    );
}

#[tokio::test]
async fn test_health_reports_unreachable_upstream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let mut config = test_config(&mock_server, Dialect::Native);
    config.api_token = Some("secret".to_string());
    let app = create_test_app(config);

    // No credentials needed for health
    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "ok", "upstream_reachable": false})
    );
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server, Dialect::OpenAi));

    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server, Dialect::Native));

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-abc-123");

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

// ============================================================================
// Inbound validation and auth
// ============================================================================

#[tokio::test]
async fn test_gateway_token_required_when_configured() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion("ok")))
        .mount(&mock_server)
        .await;

    let mut config = test_config(&mock_server, Dialect::OpenAi);
    config.api_token = Some("secret".to_string());
    let app = create_test_app(config);

    let response = app.clone().oneshot(chat_request(hello(false))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({"error": "unauthorized", "status_code": 401})
    );

    let models = app.clone().oneshot(get_request("/models")).await.unwrap();
    assert_eq!(models.status(), StatusCode::UNAUTHORIZED);

    let mut request = chat_request(hello(false));
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_payloads_are_unprocessable() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server, Dialect::OpenAi));

    let malformed = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"model\":"))
        .unwrap();
    let response = app.clone().oneshot(malformed).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"], "invalid_request");

    let mut hot = hello(false);
    hot["temperature"] = json!(3.5);
    let response = app.clone().oneshot(chat_request(hot)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let bad_role = json!({
        "model": "m",
        "messages": [{"role": "tool", "content": "x"}]
    });
    let response = app.oneshot(chat_request(bad_role)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

// ============================================================================
// Documents
// ============================================================================

#[tokio::test]
async fn test_uploaded_document_is_injected_as_context() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion("14 days")))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config(&mock_server, Dialect::OpenAi));

    let upload = app
        .clone()
        .oneshot(multipart_upload(
            Some("session-1"),
            "policy.txt",
            "Refunds are processed within 14 days of the return.",
        ))
        .await
        .unwrap();
    assert_eq!(upload.status(), StatusCode::OK);
    let upload = body_json(upload).await;
    assert_eq!(upload["status"], "processed");
    assert_eq!(upload["session_id"], "session-1");
    assert_eq!(upload["filename"], "policy.txt");
    assert_eq!(upload["chunks"], 1);
    let file_id = upload["file_id"].as_str().unwrap().to_string();

    let listing = app
        .clone()
        .oneshot(get_request("/sessions/session-1/files"))
        .await
        .unwrap();
    let listing = body_json(listing).await;
    assert_eq!(listing["files"][0]["file_id"], file_id.as_str());
    assert!(listing["files"][0]["created_at"].as_i64().unwrap() > 0);

    let mut request = hello(false);
    request["session_id"] = json!("session-1");
    request["messages"] = json!([{"role": "user", "content": "How long do refunds take?"}]);
    let response = app.clone().oneshot(chat_request(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A session without documents leaves the messages alone
    let mut request = hello(false);
    request["session_id"] = json!("session-2");
    let response = app.clone().oneshot(chat_request(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let sent = upstream_bodies(&mock_server, "/v1/chat/completions").await;
    assert_eq!(sent.len(), 2);

    let injected = sent[0]["messages"].as_array().unwrap();
    assert_eq!(injected.len(), 2);
    assert_eq!(injected[0]["role"], "system");
    let system = injected[0]["content"].as_str().unwrap();
    assert!(system.starts_with("Use the following uploaded document context when answering."));
    assert!(system.contains("[Source: policy.txt]"));
    assert!(system.contains("14 days"));
    assert_eq!(injected[1]["role"], "user");

    let untouched = sent[1]["messages"].as_array().unwrap();
    assert_eq!(untouched.len(), 1);
    assert_eq!(untouched[0]["role"], "user");

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/sessions/session-1/files/{}", file_id))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"ok": true}));

    let delete_again = Request::builder()
        .method("DELETE")
        .uri(format!("/sessions/session-1/files/{}", file_id))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(delete_again).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "file_not_found");
}

#[tokio::test]
async fn test_upload_rejections() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server, Dialect::OpenAi));

    let response = app
        .clone()
        .oneshot(multipart_upload(Some("s"), "photo.png", "\u{89}PNG"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "unsupported_file_type");

    let response = app
        .clone()
        .oneshot(multipart_upload(Some("s"), "report.pdf", "not a pdf at all"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "upload_failed");
    assert!(body["details"].as_str().unwrap().starts_with("document could not be read"));

    let response = app
        .clone()
        .oneshot(multipart_upload(None, "notes.txt", "hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "upload_failed");

    let response = app
        .clone()
        .oneshot(multipart_upload(Some("s"), "blank.md", "   \n  "))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "empty_document");

    // Not a multipart body at all
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "upload_failed");
}
