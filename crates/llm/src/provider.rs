//! LLM Provider Trait
//!
//! Defines the common interface for all LLM providers.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::{
    AiResponse, LlmError, LlmResult, Message, ModelInfo, PromptData, ProviderCapabilities,
};

/// Trait that all LLM providers must implement.
///
/// Provides a unified interface for:
/// - Tool-aware completions (generate_code)
/// - Plain text streaming (stream_text, driven by `generate_code_stream`)
/// - One-shot prompts and token counting
///
/// Every method takes the caller's cancellation token; a cancelled token
/// ends the call with `LlmError::Cancelled`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Model the adapter was constructed for.
    fn model_info(&self) -> &ModelInfo;

    /// What the backend supports.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Send the conversation and tool set, returning normalized text and
    /// tool calls. Retries rate limits and falls back to the textual tool
    /// format when the backend rejects native tools.
    async fn generate_code(
        &self,
        cancel: &CancellationToken,
        prompt: &PromptData,
    ) -> LlmResult<AiResponse>;

    /// Stream text deltas of a plain (tool-less) completion into `tx`.
    ///
    /// Returns when the backend signals the end of the stream, the
    /// receiver is dropped, or `cancel` fires.
    async fn stream_text(
        &self,
        cancel: &CancellationToken,
        prompt: &PromptData,
        tx: &mpsc::Sender<String>,
    ) -> LlmResult<()>;

    /// Single-turn text completion with no tools.
    async fn complete_prompt(&self, cancel: &CancellationToken, text: &str) -> LlmResult<String> {
        let prompt = PromptData::new(vec![Message::user(text)]);
        let response = self.generate_code(cancel, &prompt).await?;
        if response.content.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                message: format!("{} returned no text", self.name()),
            });
        }
        Ok(response.content)
    }

    /// Count the tokens `messages` would occupy.
    ///
    /// The default is a character heuristic; backends with a counting
    /// endpoint override it.
    async fn count_tokens(
        &self,
        _cancel: &CancellationToken,
        messages: &[Message],
    ) -> LlmResult<usize> {
        Ok(estimate_tokens(messages))
    }
}

/// Rough token estimate: a quarter token per character plus a fixed
/// per-message overhead for role markers.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    const PER_MESSAGE_OVERHEAD: usize = 4;
    messages
        .iter()
        .map(|m| {
            let mut chars = m.content.chars().count();
            for call in &m.tool_calls {
                chars += call.name.chars().count() + call.arguments.to_json_string().chars().count();
            }
            chars.div_ceil(4) + PER_MESSAGE_OVERHEAD
        })
        .sum()
}

/// Helper function to create an error for missing API key
pub fn missing_api_key_error(provider: &str) -> LlmError {
    LlmError::Configuration {
        message: format!("API key not configured for {}", provider),
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorPayload {
    Detailed {
        #[serde(default, rename = "type")]
        error_type: Option<String>,
        #[serde(default)]
        code: Option<serde_json::Value>,
        #[serde(default)]
        message: Option<String>,
    },
    Text(String),
}

/// Native error code and message extracted from an error body.
fn parse_error_body(body: &str) -> (Option<String>, String) {
    const MAX_MESSAGE_CHARS: usize = 500;
    let fallback = || body.trim().chars().take(MAX_MESSAGE_CHARS).collect::<String>();

    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error:
                ErrorPayload::Detailed {
                    error_type,
                    code,
                    message,
                },
        }) => {
            // `code` is more specific than `type` on OpenAI-style bodies.
            let code = code.and_then(|c| match c {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            });
            let kind = code.into_iter().chain(error_type).find(|k| native_kind(k).is_some());
            (kind, message.unwrap_or_else(fallback))
        }
        Ok(ErrorEnvelope {
            error: ErrorPayload::Text(message),
        }) => (None, message),
        Err(_) => (None, fallback()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeKind {
    RateLimit,
    Overloaded,
    Authentication,
    Permission,
    NotFound,
}

fn native_kind(code: &str) -> Option<NativeKind> {
    match code {
        "rate_limit_error" | "rate_limit_exceeded" | "rate_limited" | "too_many_requests" => {
            Some(NativeKind::RateLimit)
        }
        "overloaded_error" | "server_overloaded" | "engine_overloaded" => {
            Some(NativeKind::Overloaded)
        }
        "authentication_error" | "invalid_api_key" => Some(NativeKind::Authentication),
        "permission_error" | "permission_denied" => Some(NativeKind::Permission),
        "not_found_error" | "model_not_found" => Some(NativeKind::NotFound),
        _ => None,
    }
}

/// Map an HTTP error response to an `LlmError`.
///
/// The body's native `error.code` / `error.type` wins over the status, so a
/// rate-limit reported with an unusual status is still retried.
pub fn parse_http_error(
    status: u16,
    body: &str,
    retry_after: Option<u64>,
    provider: &str,
) -> LlmError {
    let (kind, message) = parse_error_body(body);
    let message = format!("{}: {}", provider, message);

    if let Some(kind) = kind.as_deref().and_then(native_kind) {
        return match kind {
            NativeKind::RateLimit => LlmError::RateLimited {
                message,
                retry_after,
            },
            NativeKind::Overloaded => LlmError::Overloaded { message },
            NativeKind::Authentication => LlmError::AuthenticationFailed { message },
            NativeKind::Permission => LlmError::PermissionDenied { message },
            NativeKind::NotFound => LlmError::ModelNotFound { model: message },
        };
    }

    match status {
        400 => LlmError::InvalidRequest { message },
        401 => LlmError::AuthenticationFailed { message },
        403 => LlmError::PermissionDenied { message },
        404 => LlmError::ModelNotFound { model: message },
        429 => LlmError::RateLimited {
            message,
            retry_after,
        },
        529 => LlmError::Overloaded { message },
        _ => LlmError::ServerError {
            message,
            status: Some(status),
        },
    }
}

/// Map an in-stream error event (an SSE `error` payload) to an `LlmError`.
pub fn stream_error(code: Option<&str>, message: &str, provider: &str) -> LlmError {
    let message = format!("{}: {}", provider, message);
    match code.and_then(native_kind) {
        Some(NativeKind::RateLimit) => LlmError::RateLimited {
            message,
            retry_after: None,
        },
        Some(NativeKind::Overloaded) => LlmError::Overloaded { message },
        Some(NativeKind::Authentication) => LlmError::AuthenticationFailed { message },
        Some(NativeKind::Permission) => LlmError::PermissionDenied { message },
        Some(NativeKind::NotFound) => LlmError::ModelNotFound { model: message },
        None => LlmError::ServerError {
            message,
            status: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolArguments, ToolCall};

    #[test]
    fn test_missing_api_key_error() {
        let err = missing_api_key_error("anthropic");
        match err {
            LlmError::Configuration { message } => {
                assert!(message.contains("anthropic"));
            }
            _ => panic!("Expected Configuration"),
        }
    }

    #[test]
    fn test_parse_http_error_by_status() {
        let err = parse_http_error(401, "unauthorized", None, "openai");
        assert!(matches!(err, LlmError::AuthenticationFailed { .. }));

        let err = parse_http_error(403, "nope", None, "openai");
        assert!(matches!(err, LlmError::PermissionDenied { .. }));

        let err = parse_http_error(404, "no such model", None, "openai");
        assert!(matches!(err, LlmError::ModelNotFound { .. }));

        let err = parse_http_error(429, "rate limited", Some(7), "openai");
        assert_eq!(err.retry_after_secs(), Some(7));

        let err = parse_http_error(400, "bad", None, "openai");
        assert!(matches!(err, LlmError::InvalidRequest { .. }));

        let err = parse_http_error(529, "busy", None, "anthropic");
        assert!(matches!(err, LlmError::Overloaded { .. }));

        let err = parse_http_error(500, "internal error", None, "openai");
        assert!(matches!(err, LlmError::ServerError { status: Some(500), .. }));
    }

    #[test]
    fn test_native_codes_win_over_status() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = parse_http_error(500, body, None, "anthropic");
        assert_eq!(
            err,
            LlmError::Overloaded {
                message: "anthropic: Overloaded".to_string()
            }
        );

        let body = r#"{"error":{"message":"Slow down","type":"requests","code":"rate_limit_exceeded"}}"#;
        let err = parse_http_error(400, body, None, "openai");
        assert!(err.is_retryable());

        let body = r#"{"error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        let err = parse_http_error(400, body, None, "anthropic");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_native_code_falls_back_to_status() {
        let body = r#"{"error":{"message":"tools not supported","type":"invalid_request_error","code":null}}"#;
        let err = parse_http_error(400, body, None, "openai");
        assert_eq!(
            err,
            LlmError::InvalidRequest {
                message: "openai: tools not supported".to_string()
            }
        );
    }

    #[test]
    fn test_string_error_body() {
        let err = parse_http_error(404, r#"{"error":"model 'llama9' not found"}"#, None, "ollama");
        match err {
            LlmError::ModelNotFound { model } => assert!(model.contains("llama9")),
            other => panic!("Expected ModelNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_error_mapping() {
        let err = stream_error(Some("overloaded_error"), "Overloaded", "anthropic");
        assert!(matches!(err, LlmError::Overloaded { .. }));

        let err = stream_error(None, "boom", "openai");
        assert_eq!(
            err,
            LlmError::ServerError {
                message: "openai: boom".to_string(),
                status: None
            }
        );
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(&[]), 0);
        // 8 chars -> 2 tokens + 4 overhead
        assert_eq!(estimate_tokens(&[Message::user("abcdefgh")]), 6);
        // 9 chars rounds up
        assert_eq!(estimate_tokens(&[Message::user("abcdefghi")]), 7);

        let call = ToolCall::new(Some("c".into()), "ls", ToolArguments::Raw("ab".into()));
        let with_call = Message::assistant_with_tools("", vec![call]);
        assert_eq!(estimate_tokens(&[with_call]), 5);
    }
}
