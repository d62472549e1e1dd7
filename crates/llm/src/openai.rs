//! OpenAI-Compatible Provider
//!
//! Implementation of the LlmProvider trait for the chat-completions API.
//! The same adapter serves OpenAI and the OpenAI-compatible backends
//! (DeepSeek, Ollama); a [`BackendProfile`] carries the per-backend
//! defaults.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::http_client::{
    build_http_client, error_from_response, network_error, normalize_base_url,
};
use crate::prompt_fallback::{fallback_prompt, into_fallback_response};
use crate::provider::{missing_api_key_error, LlmProvider};
use crate::retry::with_retry;
use crate::sse::forward_text;
use crate::streaming_adapters::OpenAIAdapter;
use crate::tool_choice::ToolChoiceClassifier;
use crate::types::{
    AiResponse, LlmError, LlmResult, Message, MessageRole, ModelInfo, PromptData,
    ProviderCapabilities, ProviderConfig, StopReason, ToolArguments, ToolCall, ToolCallMode,
    ToolDefinition, UsageStats,
};

/// Output token budget when none is configured
pub const OPENAI_DEFAULT_MAX_TOKENS: u32 = 4096;

/// Per-backend defaults for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendProfile {
    pub name: &'static str,
    pub default_base_url: &'static str,
    pub requires_api_key: bool,
    /// Whether native tool calling is assumed when the config is silent
    pub native_tools: bool,
    pub context_window: u32,
}

pub const OPENAI_PROFILE: BackendProfile = BackendProfile {
    name: "openai",
    default_base_url: "https://api.openai.com/v1",
    requires_api_key: true,
    native_tools: true,
    context_window: 128_000,
};

pub const DEEPSEEK_PROFILE: BackendProfile = BackendProfile {
    name: "deepseek",
    default_base_url: "https://api.deepseek.com",
    requires_api_key: true,
    native_tools: true,
    context_window: 64_000,
};

pub const OLLAMA_PROFILE: BackendProfile = BackendProfile {
    name: "ollama",
    default_base_url: "http://localhost:11434/v1",
    requires_api_key: false,
    native_tools: false,
    context_window: 8_192,
};

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    profile: BackendProfile,
    config: ProviderConfig,
    api_key: Option<String>,
    base_url: String,
    model_info: ModelInfo,
    capabilities: ProviderCapabilities,
    classifier: Arc<ToolChoiceClassifier>,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Create a provider for OpenAI itself.
    pub fn new(config: ProviderConfig, classifier: Arc<ToolChoiceClassifier>) -> LlmResult<Self> {
        Self::with_profile(OPENAI_PROFILE, config, classifier)
    }

    /// Create a provider for any OpenAI-compatible backend.
    pub fn with_profile(
        profile: BackendProfile,
        config: ProviderConfig,
        classifier: Arc<ToolChoiceClassifier>,
    ) -> LlmResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        if profile.requires_api_key && api_key.is_none() {
            return Err(missing_api_key_error(profile.name));
        }
        if config.model.trim().is_empty() {
            return Err(LlmError::config(format!(
                "Model not configured for {}",
                profile.name
            )));
        }
        let base_url = normalize_base_url(
            config
                .base_url
                .as_deref()
                .unwrap_or(profile.default_base_url),
        )?;
        let client = build_http_client(config.request_timeout_secs)?;

        let model_info = ModelInfo {
            id: config.model.clone(),
            context_window: config.context_window.unwrap_or(profile.context_window),
            max_tokens: config.effective_max_tokens(OPENAI_DEFAULT_MAX_TOKENS),
            temperature: config.effective_temperature(),
        };
        let capabilities = ProviderCapabilities {
            tool_calling: config.supports_tools.unwrap_or(profile.native_tools),
            image_input: profile.name == "openai",
            system_prompt: true,
        };

        Ok(Self {
            profile,
            config,
            api_key,
            base_url,
            model_info,
            capabilities,
            classifier,
            client,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn post(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let request = self.client.post(self.completions_url()).json(body);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        prompt: &PromptData,
        tool_mode: Option<ToolCallMode>,
        stream: bool,
    ) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = prompt.system.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.extend(prompt.sendable_messages().map(|m| self.message_to_openai(m)));

        let mut body = serde_json::json!({
            "model": self.model_info.id,
            "messages": messages,
            "max_tokens": self.model_info.max_tokens,
            "temperature": self.model_info.temperature,
        });

        if stream {
            body["stream"] = serde_json::json!(true);
        }

        if let Some(mode) = tool_mode.filter(|_| !prompt.tools.is_empty()) {
            let tools: Vec<serde_json::Value> =
                prompt.tools.iter().map(|t| self.tool_to_openai(t)).collect();
            body["tools"] = serde_json::json!(tools);
            body["tool_choice"] = serde_json::json!(match mode {
                ToolCallMode::Required => "required",
                ToolCallMode::Auto => "auto",
                ToolCallMode::None => "none",
            });
        }

        body
    }

    /// Convert a Message to OpenAI API format
    fn message_to_openai(&self, message: &Message) -> serde_json::Value {
        match message.role {
            MessageRole::User => serde_json::json!({ "role": "user", "content": message.content }),
            MessageRole::Assistant if message.tool_calls.is_empty() => {
                serde_json::json!({ "role": "assistant", "content": message.content })
            }
            MessageRole::Assistant => {
                let tool_calls: Vec<serde_json::Value> = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        serde_json::json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_json_string(),
                            }
                        })
                    })
                    .collect();
                let content = if message.content.trim().is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::json!(message.content)
                };
                serde_json::json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": tool_calls,
                })
            }
            MessageRole::Tool => serde_json::json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id.as_deref().unwrap_or_default(),
                "content": message.content,
            }),
        }
    }

    /// Convert a ToolDefinition to OpenAI API format
    fn tool_to_openai(&self, tool: &ToolDefinition) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema
            }
        })
    }

    /// Parse a response from the chat-completions API
    fn parse_response(&self, response: OpenAIResponse) -> LlmResult<AiResponse> {
        let Some(choice) = response.choices.into_iter().next() else {
            return Err(LlmError::EmptyResponse {
                message: format!("{} returned no choices", self.profile.name),
            });
        };

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                ToolCall::new(
                    tc.id,
                    tc.function.name,
                    ToolArguments::from_value(tc.function.arguments),
                )
            })
            .collect();

        let usage = response
            .usage
            .map(|u| UsageStats {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(AiResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            stop_reason: choice
                .finish_reason
                .as_deref()
                .map(StopReason::from)
                .unwrap_or(StopReason::EndTurn),
            usage,
            model: response.model.unwrap_or_else(|| self.model_info.id.clone()),
            used_fallback: false,
        })
    }

    /// One non-streaming request, retried on rate limits.
    async fn send(
        &self,
        cancel: &CancellationToken,
        prompt: &PromptData,
        tool_mode: Option<ToolCallMode>,
    ) -> LlmResult<AiResponse> {
        let body = self.build_request_body(prompt, tool_mode, false);
        let provider = self.profile.name;

        let response: OpenAIResponse = with_retry(&self.config.retry, cancel, provider, || {
            let request = self.post(&body);
            async move {
                let response = request.send().await.map_err(network_error)?;
                if !response.status().is_success() {
                    return Err(error_from_response(response, provider).await);
                }
                let text = response.text().await.map_err(network_error)?;
                serde_json::from_str(&text).map_err(|e| LlmError::MalformedResponse {
                    message: format!("{}: failed to parse response: {}", provider, e),
                })
            }
        })
        .await?;

        self.parse_response(response)
    }

    async fn send_fallback(
        &self,
        cancel: &CancellationToken,
        prompt: &PromptData,
    ) -> LlmResult<AiResponse> {
        let response = self.send(cancel, &fallback_prompt(prompt), None).await?;
        Ok(into_fallback_response(response))
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        self.profile.name
    }

    fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    async fn generate_code(
        &self,
        cancel: &CancellationToken,
        prompt: &PromptData,
    ) -> LlmResult<AiResponse> {
        if prompt.tools.is_empty() {
            return self.send(cancel, prompt, None).await;
        }
        if !self.capabilities.tool_calling {
            return self.send_fallback(cancel, prompt).await;
        }

        let mode = self.classifier.mode_for_prompt(prompt);
        debug!(provider = self.profile.name, tool_mode = %mode, "Sending request with native tools");

        match self.send(cancel, prompt, Some(mode)).await {
            Err(LlmError::InvalidRequest { message }) => {
                warn!(
                    provider = self.profile.name,
                    error = %message,
                    "Native tool calling rejected, retrying with textual tool catalogue"
                );
                self.send_fallback(cancel, prompt).await
            }
            other => other,
        }
    }

    async fn stream_text(
        &self,
        cancel: &CancellationToken,
        prompt: &PromptData,
        tx: &mpsc::Sender<String>,
    ) -> LlmResult<()> {
        let body = self.build_request_body(prompt, None, true);
        let provider = self.profile.name;

        let response = with_retry(&self.config.retry, cancel, provider, || {
            let request = self.post(&body);
            async move {
                let response = request.send().await.map_err(network_error)?;
                if !response.status().is_success() {
                    return Err(error_from_response(response, provider).await);
                }
                Ok(response)
            }
        })
        .await?;

        let mut adapter = OpenAIAdapter::new();
        forward_text(cancel, response, &mut adapter, tx, provider).await
    }
}

/// Chat-completions response format
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    /// A JSON string per the API, though some backends send an object
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}
