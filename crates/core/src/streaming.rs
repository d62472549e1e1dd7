//! Unified Stream Event Types
//!
//! Provider-agnostic event types and the adapter trait used to turn raw
//! provider stream lines (SSE `data:` payloads) into a single event shape.
//! The LLM crate produces these events while parsing streams; the task
//! session re-uses the same enum to report progress to an observer.

use serde::{Deserialize, Serialize};

/// Unified streaming event that all provider adapters convert to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text content delta from the model
    TextDelta { content: String },

    /// Start of a tool call
    ToolStart {
        tool_id: String,
        tool_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },

    /// Partial JSON for the tool call currently being streamed
    ToolArgumentsDelta { tool_id: String, partial: String },

    /// Tool call complete with accumulated arguments
    ToolComplete {
        tool_id: String,
        tool_name: String,
        /// Complete JSON string of tool arguments
        arguments: String,
    },

    /// Tool execution result
    ToolResult {
        tool_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Token usage information
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },

    /// Error during streaming
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Stream complete
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
}

impl StreamEvent {
    /// Whether this event ends the stream it belongs to.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. })
    }
}

/// Errors that can occur during stream adaptation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
pub enum AdapterError {
    /// Invalid format that couldn't be parsed
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    /// JSON/data parsing error
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Trait for adapting provider-specific stream formats to unified events.
///
/// A single input line may produce zero, one, or multiple events.
pub trait StreamAdapter: Send + Sync {
    /// Returns the provider name for logging and identification.
    fn provider_name(&self) -> &'static str;

    /// Adapt a raw stream line to unified events.
    fn adapt(&mut self, input: &str) -> Result<Vec<StreamEvent>, AdapterError>;

    /// Reset adapter state for a new stream.
    fn reset(&mut self) {}
}

/// Extract the JSON payload of an SSE line.
///
/// Returns `None` for `event:`/`id:`/comment lines, blank lines and the
/// `[DONE]` sentinel. Raw JSON lines without a `data:` prefix pass through.
pub fn sse_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let payload = if let Some(rest) = trimmed.strip_prefix("data:") {
        rest.trim_start()
    } else if trimmed.starts_with('{') {
        trimmed
    } else {
        return None;
    };

    if payload.is_empty() || payload == "[DONE]" {
        None
    } else {
        Some(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta_serialization() {
        let event = StreamEvent::TextDelta {
            content: "Hello".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"text_delta\""));
        assert!(json.contains("\"content\":\"Hello\""));

        let parsed: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_tool_result_skips_empty_fields() {
        let event = StreamEvent::ToolResult {
            tool_id: "call_1".to_string(),
            result: Some("ok".to_string()),
            error: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"tool_result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_is_terminal() {
        assert!(StreamEvent::Complete { stop_reason: None }.is_terminal());
        assert!(!StreamEvent::TextDelta {
            content: String::new()
        }
        .is_terminal());
    }

    #[test]
    fn test_sse_data() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("event: message_start"), None);
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_data("data: [DONE]"), None);
        assert_eq!(sse_data(""), None);
    }

    #[test]
    fn test_adapter_error_display() {
        let err = AdapterError::InvalidFormat("bad json".to_string());
        assert_eq!(err.to_string(), "Invalid format: bad json");

        let err = AdapterError::ParseError("unexpected token".to_string());
        assert_eq!(err.to_string(), "Parse error: unexpected token");
    }
}
