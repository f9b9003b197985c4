//! `OpenAiClient` against an in-process mock provider.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use parley_completion::request::{ChatCompletionRequest, ContentPart, WireContent};
use parley_completion::{
    AttachmentPayload, CompletionClient, CompletionError, CompletionRequest, OpenAiClient,
};
use parley_core::types::{Attachment, AttachmentKind, ChatConfig, Locator, Message};

const KEY: &str = "sk-test-0123456789abcdef";

#[derive(Default)]
struct Provider {
    status: Mutex<Option<(StatusCode, Value)>>,
    seen: Mutex<Vec<(Option<String>, ChatCompletionRequest)>>,
}

async fn completions(
    State(provider): State<Arc<Provider>>,
    headers: HeaderMap,
    Json(body): Json<ChatCompletionRequest>,
) -> impl IntoResponse {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    provider.seen.lock().unwrap().push((auth, body));
    let (status, value) = provider.status.lock().unwrap().clone().unwrap_or((
        StatusCode::OK,
        json!({"choices": [{"message": {"role": "assistant", "content": "Hello from mock"}}]}),
    ));
    (status, Json(value))
}

async fn spawn_provider() -> (String, Arc<Provider>) {
    let provider = Arc::new(Provider::default());
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(Arc::clone(&provider));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/v1", addr), provider)
}

fn respond_with(provider: &Provider, status: StatusCode, body: Value) {
    *provider.status.lock().unwrap() = Some((status, body));
}

fn configured_client(base_url: &str) -> OpenAiClient {
    let client = OpenAiClient::new(base_url, 5).unwrap();
    assert!(client.configure(KEY));
    client
}

async fn send(
    client: &OpenAiClient,
    history: &[Message],
    attachments: &[AttachmentPayload],
) -> Result<String, CompletionError> {
    let config = ChatConfig::default();
    client
        .complete(CompletionRequest::new(history, &config, attachments))
        .await
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_success_returns_first_choice() {
    let (url, provider) = spawn_provider().await;
    let client = configured_client(&url);
    let history = vec![Message::user("hi", vec![])];

    let reply = send(&client, &history, &[]).await.unwrap();
    assert_eq!(reply, "Hello from mock");

    let seen = provider.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.as_deref(), Some(format!("Bearer {}", KEY).as_str()));
    assert_eq!(seen[0].1.model, "gpt-4o-mini");
    assert_eq!(seen[0].1.messages[0].content, WireContent::Text("hi".into()));
}

#[tokio::test]
async fn test_empty_choices_fallback() {
    let (url, provider) = spawn_provider().await;
    respond_with(&provider, StatusCode::OK, json!({"choices": []}));
    let client = configured_client(&url);

    let reply = send(&client, &[Message::user("hi", vec![])], &[]).await.unwrap();
    assert_eq!(reply, "No response received");
}

#[tokio::test]
async fn test_401_is_unauthorized() {
    let (url, provider) = spawn_provider().await;
    respond_with(
        &provider,
        StatusCode::UNAUTHORIZED,
        json!({"error": {"message": "Incorrect API key provided"}}),
    );
    let client = configured_client(&url);

    let result = send(&client, &[Message::user("hi", vec![])], &[]).await;
    assert_eq!(result, Err(CompletionError::Unauthorized));
}

#[tokio::test]
async fn test_429_is_rate_limited() {
    let (url, provider) = spawn_provider().await;
    respond_with(
        &provider,
        StatusCode::TOO_MANY_REQUESTS,
        json!({"error": {"message": "Rate limit reached"}}),
    );
    let client = configured_client(&url);

    let result = send(&client, &[Message::user("hi", vec![])], &[]).await;
    assert_eq!(result, Err(CompletionError::RateLimited));
    // Exactly one attempt.
    assert_eq!(provider.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_500_carries_provider_message() {
    let (url, provider) = spawn_provider().await;
    respond_with(
        &provider,
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": {"message": "The server had an error"}}),
    );
    let client = configured_client(&url);

    let result = send(&client, &[Message::user("hi", vec![])], &[]).await;
    assert_eq!(
        result,
        Err(CompletionError::ProviderError("The server had an error".into()))
    );
}

#[tokio::test]
async fn test_unparseable_error_body_uses_status() {
    let (url, provider) = spawn_provider().await;
    respond_with(&provider, StatusCode::BAD_GATEWAY, json!("upstream down"));
    let client = configured_client(&url);

    let result = send(&client, &[Message::user("hi", vec![])], &[]).await;
    assert_eq!(result, Err(CompletionError::ProviderError("HTTP 502".into())));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = configured_client(&format!("http://{}/v1", addr));
    let result = send(&client, &[Message::user("hi", vec![])], &[]).await;
    assert!(matches!(result, Err(CompletionError::NetworkError(_))));
}

#[tokio::test]
async fn test_image_attachment_request_shape() {
    let (url, provider) = spawn_provider().await;
    let client = configured_client(&url);

    let image = Attachment {
        id: uuid::Uuid::new_v4(),
        kind: AttachmentKind::Image,
        name: "dot.png".into(),
        mime_type: "image/png".into(),
        locator: Locator::new(),
        size_bytes: Some(4),
    };
    let payloads = vec![AttachmentPayload::new(
        image.clone(),
        Some(Arc::from(&b"\x89PNG"[..])),
    )];
    let history = vec![Message::user("describe", vec![image])];

    send(&client, &history, &payloads).await.unwrap();

    let seen = provider.seen.lock().unwrap();
    let WireContent::Parts(parts) = &seen[0].1.messages[0].content else {
        panic!("expected structured content");
    };
    assert_eq!(parts.len(), 2);
    assert!(matches!(&parts[0], ContentPart::Text { text } if text == "describe"));
    assert!(matches!(
        &parts[1],
        ContentPart::ImageUrl { image_url } if image_url.url == "data:image/png;base64,iVBORw=="
    ));
}

#[tokio::test]
async fn test_unconfigured_client_never_calls_provider() {
    let (url, provider) = spawn_provider().await;
    let client = OpenAiClient::new(&url, 5).unwrap();
    assert!(!client.configure("sk-short"));

    let result = send(&client, &[Message::user("hi", vec![])], &[]).await;
    assert_eq!(result, Err(CompletionError::NotConfigured));
    assert!(provider.seen.lock().unwrap().is_empty());
}
