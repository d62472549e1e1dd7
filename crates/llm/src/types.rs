//! LLM Types
//!
//! Backend-neutral conversation, tool and response types. Every provider
//! adapter converts from these into its wire format and back.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::retry::RetryPolicy;

/// Tool calling mode for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallMode {
    /// Model chooses whether to call a tool.
    #[default]
    Auto,
    /// Model must call at least one tool this turn.
    Required,
    /// Tool calling disabled for this request.
    None,
}

impl std::fmt::Display for ToolCallMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolCallMode::Auto => write!(f, "auto"),
            ToolCallMode::Required => write!(f, "required"),
            ToolCallMode::None => write!(f, "none"),
        }
    }
}

/// Configuration for one LLM backend, supplied by the config provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Registry identifier of the backend ("anthropic", "openai", ...)
    pub provider: String,
    /// API key (not needed for local backends)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// API root override, e.g. `https://api.anthropic.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model identifier
    pub model: String,
    /// Maximum output tokens; backend default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature; only values >= 0 are honored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Context window override in tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    /// Force native tool calling on or off for this model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_tools: Option<bool>,
    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Backoff schedule for rate-limited calls
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            api_key: None,
            base_url: None,
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: None,
            temperature: None,
            context_window: None,
            supports_tools: None,
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ProviderConfig {
    /// Temperature sent to the backend: the configured value when it is
    /// a non-negative number, otherwise 0.
    pub fn effective_temperature(&self) -> f32 {
        match self.temperature {
            Some(t) if t >= 0.0 => t,
            _ => 0.0,
        }
    }

    /// Max output tokens, falling back to the backend's constant.
    pub fn effective_max_tokens(&self, backend_default: u32) -> u32 {
        self.max_tokens.filter(|t| *t > 0).unwrap_or(backend_default)
    }
}

/// Static description of the model an adapter talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub context_window: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// What a backend supports. Drives request sizing and fallback strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub tool_calling: bool,
    pub image_input: bool,
    pub system_prompt: bool,
}

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    /// Free text; may be empty for pure tool-call turns
    #[serde(default)]
    pub content: String,
    /// Tool calls proposed by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool-result turns, the call this result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a plain assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant message carrying tool calls
    pub fn assistant_with_tools(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: text.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Create a tool result message
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// True when the turn carries neither text nor tool calls.
    ///
    /// Such turns are dropped before sending; several backends reject them.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.tool_calls.is_empty()
    }
}

/// Arguments of a tool call: decoded JSON object, or the raw payload when
/// the model produced something that does not decode to an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArguments {
    Structured(serde_json::Map<String, serde_json::Value>),
    Raw(String),
}

impl Default for ToolArguments {
    fn default() -> Self {
        Self::Structured(serde_json::Map::new())
    }
}

impl ToolArguments {
    /// Decode a JSON string. Objects become `Structured`; anything else
    /// (invalid JSON, arrays, scalars) is kept verbatim as `Raw`.
    pub fn from_json_str(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Object(map)) => Self::Structured(map),
            _ => Self::Raw(raw.to_string()),
        }
    }

    /// Normalize an already-decoded value. A JSON string is decoded again
    /// because some backends double-encode arguments.
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Self::Structured(map),
            serde_json::Value::String(s) => Self::from_json_str(&s),
            serde_json::Value::Null => Self::default(),
            other => Self::Raw(other.to_string()),
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    /// Look up a structured argument.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        match self {
            Self::Structured(map) => map.get(key),
            Self::Raw(_) => None,
        }
    }

    /// JSON value to embed in a request body (objects stay objects, raw
    /// payloads are sent as strings).
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Structured(map) => serde_json::Value::Object(map.clone()),
            Self::Raw(raw) => serde_json::Value::String(raw.clone()),
        }
    }

    /// JSON text form, as OpenAI-style `function.arguments` expects.
    pub fn to_json_string(&self) -> String {
        match self {
            Self::Structured(map) => serde_json::Value::Object(map.clone()).to_string(),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Backend-assigned or synthesized call ID
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// Arguments to pass to the tool
    #[serde(default)]
    pub arguments: ToolArguments,
}

impl ToolCall {
    /// Build a tool call, synthesizing an ID when the backend gave none.
    pub fn new(id: Option<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        let id = id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(synthesize_call_id);
        Self {
            id,
            name: name.into(),
            arguments,
        }
    }
}

/// Generate a call ID for backends (and the text fallback) that omit one.
pub fn synthesize_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// JSON Schema for tool parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, ParameterSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParameterSchema>>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl ParameterSchema {
    fn scalar(schema_type: &str, description: Option<&str>) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            description: description.map(|s| s.to_string()),
            properties: None,
            required: None,
            items: None,
            enum_values: None,
        }
    }

    /// Create a string schema
    pub fn string(description: Option<&str>) -> Self {
        Self::scalar("string", description)
    }

    /// Create an integer schema
    pub fn integer(description: Option<&str>) -> Self {
        Self::scalar("integer", description)
    }

    /// Create a boolean schema
    pub fn boolean(description: Option<&str>) -> Self {
        Self::scalar("boolean", description)
    }

    /// Create an object schema
    pub fn object(
        description: Option<&str>,
        properties: HashMap<String, ParameterSchema>,
        required: Vec<String>,
    ) -> Self {
        Self {
            properties: Some(properties),
            required: Some(required),
            ..Self::scalar("object", description)
        }
    }

    /// Create an array schema
    pub fn array(description: Option<&str>, items: ParameterSchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::scalar("array", description)
        }
    }
}

/// Definition of a tool that can be called by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: ParameterSchema,
}

/// Everything one model call needs: system prompt, ordered conversation
/// and the tool set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

impl PromptData {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            system: None,
            messages,
            tools: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Messages with empty turns removed, in order.
    pub fn sendable_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.is_empty())
    }

    /// Text of the latest non-empty user or tool-result turn; this is what
    /// the tool-choice classifier looks at.
    pub fn last_user_visible_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| matches!(m.role, MessageRole::User | MessageRole::Tool))
            .map(|m| m.content.as_str())
            .find(|c| !c.trim().is_empty())
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl UsageStats {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &UsageStats) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Stop reason for the response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    Other(String),
}

impl From<&str> for StopReason {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "end_turn" | "stop" => StopReason::EndTurn,
            "max_tokens" | "length" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            "tool_use" | "tool_calls" | "function_call" => StopReason::ToolUse,
            other => StopReason::Other(other.to_string()),
        }
    }
}

/// Normalized result of one model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiResponse {
    /// Text blocks joined with newlines, in block order
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: UsageStats,
    pub model: String,
    /// True when the answer came from the textual tool-catalogue fallback
    #[serde(default)]
    pub used_fallback: bool,
}

impl AiResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.tool_calls.is_empty()
    }
}

/// Errors surfaced by provider adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmError {
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },

    #[error("Provider overloaded: {message}")]
    Overloaded { message: String },

    #[error("Server error ({}): {message}", status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()))]
    ServerError { message: String, status: Option<u16> },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("Empty response: {message}")]
    EmptyResponse { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Request cancelled")]
    Cancelled,
}

impl LlmError {
    /// Transient failures worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. } | LlmError::Overloaded { .. })
    }

    /// Failures that no amount of retrying or re-prompting will fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LlmError::AuthenticationFailed { .. }
                | LlmError::PermissionDenied { .. }
                | LlmError::ModelNotFound { .. }
                | LlmError::Configuration { .. }
        )
    }

    /// Server-suggested wait in seconds, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            LlmError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        LlmError::Configuration {
            message: message.into(),
        }
    }

    pub fn network(err: impl std::fmt::Display) -> Self {
        LlmError::NetworkError {
            message: err.to_string(),
        }
    }
}

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
