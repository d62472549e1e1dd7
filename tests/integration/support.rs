//! Mock backend helpers shared by the integration tests.

use serde_json::{json, Value};
use taskforge_llm::{ProviderConfig, RetryPolicy};
use wiremock::Request;

/// Retry schedule short enough for tests
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        multiplier: 2.0,
        randomization_factor: 0.0,
    }
}

pub fn provider_config(provider: &str, base_url: &str) -> ProviderConfig {
    ProviderConfig {
        provider: provider.to_string(),
        api_key: Some("test-key".to_string()),
        base_url: Some(base_url.to_string()),
        model: "test-model".to_string(),
        retry: fast_retry(),
        ..Default::default()
    }
}

fn body(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap_or(Value::Null)
}

/// Matches requests that carry native tool definitions
pub fn with_tools(request: &Request) -> bool {
    body(request).get("tools").is_some()
}

/// Matches requests without native tool definitions
pub fn without_tools(request: &Request) -> bool {
    !with_tools(request)
}

pub fn claude_text(text: &str) -> Value {
    json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "model": "test-model",
        "content": [{ "type": "text", "text": text }],
        "stop_reason": "end_turn",
        "usage": { "input_tokens": 10, "output_tokens": 5 }
    })
}

pub fn claude_tool_use(id: &str, name: &str, input: Value) -> Value {
    json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "model": "test-model",
        "content": [{ "type": "tool_use", "id": id, "name": name, "input": input }],
        "stop_reason": "tool_use",
        "usage": { "input_tokens": 20, "output_tokens": 8 }
    })
}

pub fn openai_text(text: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 7, "completion_tokens": 3 }
    })
}

pub fn claude_error(kind: &str, message: &str) -> Value {
    json!({ "type": "error", "error": { "type": kind, "message": message } })
}
