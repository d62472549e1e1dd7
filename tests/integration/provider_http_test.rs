//! Provider Adapter Integration Tests
//!
//! Drives the Anthropic and OpenAI-compatible adapters against a wiremock
//! server:
//! - rate limits are retried with backoff, other errors are not
//! - a rejected native-tools request falls back to the textual format once
//! - streamed text is forwarded and cancellation closes both channels

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use taskforge_llm::{
    generate_code_stream, AnthropicProvider, LlmError, LlmProvider, Message, OpenAIProvider,
    ParameterSchema, PromptData, ProviderRegistry, RetryPolicy, ToolChoiceClassifier,
    ToolDefinition,
};

use crate::support::{
    claude_error, claude_text, openai_text, provider_config, with_tools, without_tools,
};

fn classifier() -> Arc<ToolChoiceClassifier> {
    Arc::new(ToolChoiceClassifier::builtin())
}

fn anthropic(server: &MockServer) -> AnthropicProvider {
    AnthropicProvider::new(provider_config("anthropic", &server.uri()), classifier()).unwrap()
}

fn read_file_tool() -> ToolDefinition {
    let mut properties = HashMap::new();
    properties.insert("path".to_string(), ParameterSchema::string(Some("File path")));
    ToolDefinition {
        name: "read_file".to_string(),
        description: "Read a file".to_string(),
        input_schema: ParameterSchema::object(None, properties, vec!["path".to_string()]),
    }
}

fn prompt_with_tools(text: &str) -> PromptData {
    PromptData::new(vec![Message::user(text)]).with_tools(vec![read_file_tool()])
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test]
async fn test_rate_limit_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(claude_error("rate_limit_error", "slow down")),
        )
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(claude_text("hello")))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;

    let response = anthropic(&server)
        .generate_code(
            &CancellationToken::new(),
            &PromptData::new(vec![Message::user("hi")]),
        )
        .await
        .unwrap();

    assert_eq!(response.content, "hello");
    assert_eq!(response.usage.input_tokens, 10);
    assert!(!response.used_fallback);
}

#[tokio::test]
async fn test_rate_limit_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_string("too many"))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = provider_config("anthropic", &server.uri());
    config.retry = RetryPolicy {
        max_retries: 1,
        ..config.retry
    };
    let provider = AnthropicProvider::new(config, classifier()).unwrap();

    let err = provider
        .generate_code(
            &CancellationToken::new(),
            &PromptData::new(vec![Message::user("hi")]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::RateLimited { .. }));
}

#[tokio::test]
async fn test_authentication_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(claude_error("authentication_error", "invalid x-api-key")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = anthropic(&server)
        .generate_code(&CancellationToken::new(), &prompt_with_tools("read a.rs"))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("invalid x-api-key"));
}

#[tokio::test]
async fn test_openai_compatible_backend_retries_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Rate limit reached", "type": "requests", "code": "rate_limit_exceeded" }
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_text("4")))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        OpenAIProvider::new(provider_config("openai", &server.uri()), classifier()).unwrap();
    let answer = provider
        .complete_prompt(&CancellationToken::new(), "what is 2 + 2?")
        .await
        .unwrap();
    assert_eq!(answer, "4");
}

// ============================================================================
// Textual tool fallback
// ============================================================================

#[tokio::test]
async fn test_rejected_tools_fall_back_to_text_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(with_tools)
        .respond_with(ResponseTemplate::new(400).set_body_json(claude_error(
            "invalid_request_error",
            "tools are not supported for this model",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(without_tools)
        .respond_with(ResponseTemplate::new(200).set_body_json(claude_text(
            r#"Sure. {"content": "Reading it", "tool_calls": [{"name": "read_file", "args": {"path": "a.rs"}}]}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let response = anthropic(&server)
        .generate_code(&CancellationToken::new(), &prompt_with_tools("read a.rs"))
        .await
        .unwrap();

    assert!(response.used_fallback);
    assert_eq!(response.content, "Reading it");
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "read_file");
    assert_eq!(
        response.tool_calls[0].arguments.get("path"),
        Some(&json!("a.rs"))
    );

    let requests = server.received_requests().await.unwrap();
    let fallback: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    let system = fallback["system"].as_str().unwrap();
    assert!(system.contains("### read_file"));
}

#[tokio::test]
async fn test_failed_fallback_is_not_repeated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(claude_error("invalid_request_error", "bad request")),
        )
        .expect(2)
        .mount(&server)
        .await;

    let err = anthropic(&server)
        .generate_code(&CancellationToken::new(), &prompt_with_tools("read a.rs"))
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::InvalidRequest { .. }));
}

#[tokio::test]
async fn test_unparsable_fallback_reply_is_plain_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(with_tools)
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(claude_error("invalid_request_error", "no tools")),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(without_tools)
        .respond_with(
            ResponseTemplate::new(200).set_body_json(claude_text("I cannot use tools, sorry.")),
        )
        .mount(&server)
        .await;

    let response = anthropic(&server)
        .generate_code(&CancellationToken::new(), &prompt_with_tools("read a.rs"))
        .await
        .unwrap();
    assert!(response.used_fallback);
    assert!(response.tool_calls.is_empty());
    assert_eq!(response.content, "I cannot use tools, sorry.");
}

// ============================================================================
// Streaming
// ============================================================================

const CLAUDE_SSE: &str = "event: message_start\n\
data: {\"type\": \"message_start\", \"message\": {\"usage\": {\"input_tokens\": 3, \"output_tokens\": 0}}}\n\n\
event: content_block_delta\n\
data: {\"type\": \"content_block_delta\", \"index\": 0, \"delta\": {\"type\": \"text_delta\", \"text\": \"Hello\"}}\n\n\
event: content_block_delta\n\
data: {\"type\": \"content_block_delta\", \"index\": 0, \"delta\": {\"type\": \"text_delta\", \"text\": \", world\"}}\n\n\
event: message_stop\n\
data: {\"type\": \"message_stop\"}\n\n";

#[tokio::test]
async fn test_stream_forwards_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(CLAUDE_SSE),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider: Arc<dyn LlmProvider> = Arc::new(anthropic(&server));
    let stream = generate_code_stream(
        provider,
        CancellationToken::new(),
        PromptData::new(vec![Message::user("greet")]),
    );
    assert_eq!(stream.collect().await.unwrap(), "Hello, world");
}

#[tokio::test]
async fn test_stream_error_is_reported_on_error_channel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let provider: Arc<dyn LlmProvider> = Arc::new(anthropic(&server));
    let mut stream = generate_code_stream(
        provider,
        CancellationToken::new(),
        PromptData::new(vec![Message::user("greet")]),
    );
    assert!(stream.text.recv().await.is_none());
    assert!(matches!(
        stream.error.recv().await,
        Some(LlmError::ServerError {
            status: Some(500),
            ..
        })
    ));
}

#[tokio::test]
async fn test_cancelled_stream_closes_both_channels() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(CLAUDE_SSE)
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let provider: Arc<dyn LlmProvider> = Arc::new(anthropic(&server));
    let cancel = CancellationToken::new();
    let mut stream = generate_code_stream(
        provider,
        cancel.clone(),
        PromptData::new(vec![Message::user("greet")]),
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        assert!(stream.text.recv().await.is_none());
        assert!(stream.error.recv().await.is_none());
    })
    .await;
    assert!(closed.is_ok(), "channels stayed open after cancellation");
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn test_registry_builds_working_openai_adapter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_text("pong")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = ProviderRegistry::with_builtin()
        .create(provider_config("OpenAI", &server.uri()), classifier())
        .unwrap();
    assert_eq!(provider.name(), "openai");
    let answer = provider
        .complete_prompt(&CancellationToken::new(), "ping")
        .await
        .unwrap();
    assert_eq!(answer, "pong");
}
