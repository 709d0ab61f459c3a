use persona_model::{
    ChatMessage, ChatRequest, FinishReason, ModelError, ModelProvider, OpenAiProvider,
    ProviderConfig, RetryPolicy,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn make_provider(server: &MockServer) -> OpenAiProvider {
    let config = ProviderConfig::default()
        .with_base_url(server.uri())
        .with_api_key("sk-test")
        .with_timeout(Duration::from_secs(5));
    OpenAiProvider::new(config).expect("provider creation")
}

#[tokio::test]
async fn test_chat_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Score: 4"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = make_provider(&server);
    let request = ChatRequest::new("gpt-4o-mini", vec![ChatMessage::user("Rate this")]);
    let response = provider.chat(request).await.expect("chat failed");

    assert_eq!(response.text(), Some("Score: 4"));
    assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));
    assert_eq!(response.usage.map(|u| u.total()), Some(13));
}

#[tokio::test]
async fn test_chat_maps_rate_limit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let provider = make_provider(&server);
    let request = ChatRequest::new("gpt-4o-mini", vec![ChatMessage::user("Hi")]);
    let err = provider.chat(request).await.unwrap_err();

    assert!(matches!(err, ModelError::RateLimit));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_chat_rejects_empty_choices() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let provider = make_provider(&server);
    let request = ChatRequest::new("gpt-4o-mini", vec![ChatMessage::user("Hi")]);

    assert!(matches!(
        provider.chat(request).await,
        Err(ModelError::EmptyResponse)
    ));
}

#[tokio::test]
async fn test_retry_policy_recovers_from_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "recovered"}}]
        })))
        .mount(&server)
        .await;

    let provider = make_provider(&server);
    let policy = RetryPolicy::with_attempts(3, 1).without_jitter();

    let response = policy
        .run("chat", || {
            provider.chat(ChatRequest::new(
                "gpt-4o-mini",
                vec![ChatMessage::user("Hi")],
            ))
        })
        .await
        .expect("retry should recover");

    assert_eq!(response.text(), Some("recovered"));
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let provider = make_provider(&server);
    provider.health_check().await.expect("health check failed");
}

#[tokio::test]
#[ignore]
async fn test_live_endpoint() {
    // Requires OPENAI_API_KEY and network access.
    let Ok(key) = std::env::var("OPENAI_API_KEY") else {
        return;
    };
    let provider = OpenAiProvider::new(ProviderConfig::default().with_api_key(key))
        .expect("provider creation");
    let request = ChatRequest::new(
        provider.default_model().to_string(),
        vec![ChatMessage::user("What is 2+2?")],
    );
    let response = provider.chat(request).await.expect("chat failed");
    assert!(response.text().is_some());
}

#[tokio::test]
async fn test_json_output_sets_response_format() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "temperature": 0.0,
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"score\": 5, \"reason\": \"in voice\"}"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = make_provider(&server);
    let request = ChatRequest::new("gpt-4o-mini", vec![ChatMessage::user("Score this")])
        .with_temperature(0.0)
        .with_json_output();
    let response = provider.chat(request).await.expect("chat failed");

    assert_eq!(
        response.text(),
        Some("{\"score\": 5, \"reason\": \"in voice\"}")
    );
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown model"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = make_provider(&server);
    let policy = RetryPolicy::with_attempts(3, 1).without_jitter();
    let err = policy
        .run("chat", || {
            provider.chat(ChatRequest::new("nope", vec![ChatMessage::user("Hi")]))
        })
        .await
        .unwrap_err();

    match err {
        ModelError::Status { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "unknown model");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
