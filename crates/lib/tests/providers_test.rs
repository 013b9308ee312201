//! Provider-level tests against a stand-in HTTP server: Gemini request and
//! response mapping, error taxonomy, and the search-tool degradation path
//! through the LM client.

mod common;

use std::time::Duration;

use common::setup_tracing;
use paperbase::errors::LmError;
use paperbase::providers::ai::{CompletionRequest, GeminiProvider, LmClient, LmProvider};
use paperbase::retry::RetryPolicy;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request<'a>() -> CompletionRequest<'a> {
    CompletionRequest {
        system: "You are helpful.",
        user: "Say hi.",
        temperature: 0.0,
        model: "test-model",
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    }
}

#[tokio::test]
async fn gemini_plain_completion_maps_text_and_tokens() {
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/test-model:generateContent"))
        .and(query_param("key", "api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "hello " }, { "text": "there" }] }
            }],
            "usageMetadata": { "totalTokenCount": 17 }
        })))
        .mount(&server)
        .await;

    let provider =
        GeminiProvider::with_api_root(server.uri(), "api-key".into(), Duration::from_secs(5))
            .unwrap();
    let completion = provider.complete(request()).await.unwrap();

    assert_eq!(completion.text, "hello there");
    assert_eq!(completion.token_count, 17);
    assert!(!completion.web_search_used);
}

#[tokio::test]
async fn gemini_search_completion_collects_citations() {
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/test-model:generateContent"))
        .and(body_string_contains("google_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "grounded answer" }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "uri": "https://example.com/a", "title": "Source A" } }
                    ]
                }
            }],
            "usageMetadata": { "totalTokenCount": 30 }
        })))
        .mount(&server)
        .await;

    let provider =
        GeminiProvider::with_api_root(server.uri(), "api-key".into(), Duration::from_secs(5))
            .unwrap();
    let completion = provider.complete_with_search(request()).await.unwrap();

    assert!(completion.web_search_used);
    assert_eq!(completion.citations.len(), 1);
    assert_eq!(completion.citations[0].url, "https://example.com/a");
}

#[tokio::test]
async fn auth_failures_map_to_auth_failed() {
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/test-model:generateContent"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let provider =
        GeminiProvider::with_api_root(server.uri(), "api-key".into(), Duration::from_secs(5))
            .unwrap();
    assert!(matches!(
        provider.complete(request()).await,
        Err(LmError::AuthFailed(_))
    ));
}

/// A 400 naming the search tool means "tool unavailable", and the LM
/// client silently downgrades to plain completion.
#[tokio::test]
async fn search_tool_rejection_degrades_through_the_client() {
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/test-model:generateContent"))
        .and(body_string_contains("google_search"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string("google_search tool is not supported for this model"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/test-model:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "plain answer" }] } }],
            "usageMetadata": { "totalTokenCount": 9 }
        })))
        .mount(&server)
        .await;

    let provider =
        GeminiProvider::with_api_root(server.uri(), "api-key".into(), Duration::from_secs(5))
            .unwrap();
    let client = LmClient::new(Box::new(provider), fast_retry(), Duration::ZERO);

    let completion = client.complete_with_search(request()).await.unwrap();
    assert_eq!(completion.text, "plain answer");
    assert!(!completion.web_search_used);
    assert!(completion.search_degraded);
}

#[tokio::test]
async fn transient_5xx_is_retried_by_the_client() {
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/test-model:generateContent"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/test-model:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "recovered" }] } }],
            "usageMetadata": { "totalTokenCount": 5 }
        })))
        .mount(&server)
        .await;

    let provider =
        GeminiProvider::with_api_root(server.uri(), "api-key".into(), Duration::from_secs(5))
            .unwrap();
    let client = LmClient::new(Box::new(provider), fast_retry(), Duration::ZERO);

    let completion = client.complete(request()).await.unwrap();
    assert_eq!(completion.text, "recovered");
}
