//! Anthropic Claude Provider
//!
//! Implementation of the LlmProvider trait for Anthropic's Messages API.

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
use crate::provider::{estimate_tokens, missing_api_key_error, LlmProvider};
use crate::retry::with_retry;
use crate::sse::forward_text;
use crate::streaming_adapters::ClaudeApiAdapter;
use crate::tool_choice::ToolChoiceClassifier;
use crate::types::{
    AiResponse, LlmError, LlmResult, Message, MessageRole, ModelInfo, PromptData,
    ProviderCapabilities, ProviderConfig, StopReason, ToolArguments, ToolCall, ToolCallMode,
    ToolDefinition, UsageStats,
};

/// Default Anthropic API root
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";

/// Current API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Output token budget when none is configured
pub const ANTHROPIC_DEFAULT_MAX_TOKENS: u32 = 8192;

const ANTHROPIC_CONTEXT_WINDOW: u32 = 200_000;

/// Anthropic Claude provider
pub struct AnthropicProvider {
    config: ProviderConfig,
    api_key: String,
    base_url: String,
    model_info: ModelInfo,
    capabilities: ProviderCapabilities,
    classifier: Arc<ToolChoiceClassifier>,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider. Fails on missing key, model or an
    /// unparsable base URL; no request is made.
    pub fn new(config: ProviderConfig, classifier: Arc<ToolChoiceClassifier>) -> LlmResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| missing_api_key_error("anthropic"))?
            .to_string();
        if config.model.trim().is_empty() {
            return Err(LlmError::config("Model not configured for anthropic"));
        }
        let base_url = normalize_base_url(config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL))?;
        let client = build_http_client(config.request_timeout_secs)?;

        let model_info = ModelInfo {
            id: config.model.clone(),
            context_window: config.context_window.unwrap_or(ANTHROPIC_CONTEXT_WINDOW),
            max_tokens: config.effective_max_tokens(ANTHROPIC_DEFAULT_MAX_TOKENS),
            temperature: config.effective_temperature(),
        };
        let capabilities = ProviderCapabilities {
            tool_calling: config.supports_tools.unwrap_or(true),
            image_input: true,
            system_prompt: true,
        };

        Ok(Self {
            config,
            api_key,
            base_url,
            model_info,
            capabilities,
            classifier,
            client,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    /// Build the request body for the API. Tools are attached only when a
    /// tool mode is given and the prompt carries tool definitions.
    fn build_request_body(
        &self,
        prompt: &PromptData,
        tool_mode: Option<ToolCallMode>,
        stream: bool,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model_info.id,
            "max_tokens": self.model_info.max_tokens,
            "temperature": self.model_info.temperature,
            "messages": self.convert_messages(&prompt.messages),
        });

        if stream {
            body["stream"] = serde_json::json!(true);
        }

        if let Some(system) = prompt.system.as_deref().filter(|s| !s.trim().is_empty()) {
            body["system"] = serde_json::json!(system);
        }

        if let Some(mode) = tool_mode.filter(|_| !prompt.tools.is_empty()) {
            let tools: Vec<serde_json::Value> =
                prompt.tools.iter().map(|t| self.tool_to_claude(t)).collect();
            body["tools"] = serde_json::json!(tools);
            body["tool_choice"] = match mode {
                ToolCallMode::Required => serde_json::json!({ "type": "any" }),
                ToolCallMode::Auto => serde_json::json!({ "type": "auto" }),
                ToolCallMode::None => serde_json::json!({ "type": "none" }),
            };
        }

        body
    }

    /// Convert the neutral conversation to Claude turns.
    ///
    /// Tool results travel as `tool_result` blocks inside user turns, and
    /// consecutive turns of the same role are merged so roles alternate.
    fn convert_messages(&self, messages: &[Message]) -> Vec<serde_json::Value> {
        let mut turns: Vec<(&'static str, Vec<serde_json::Value>)> = Vec::new();

        for message in messages.iter().filter(|m| !m.is_empty()) {
            let (role, blocks) = self.message_to_claude(message);
            match turns.last_mut() {
                Some((last_role, last_blocks)) if *last_role == role => {
                    last_blocks.extend(blocks)
                }
                _ => turns.push((role, blocks)),
            }
        }

        turns
            .into_iter()
            .map(|(role, content)| serde_json::json!({ "role": role, "content": content }))
            .collect()
    }

    /// Convert a Message to a Claude role and content blocks
    fn message_to_claude(&self, message: &Message) -> (&'static str, Vec<serde_json::Value>) {
        match message.role {
            MessageRole::User => (
                "user",
                vec![serde_json::json!({ "type": "text", "text": message.content })],
            ),
            MessageRole::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.trim().is_empty() {
                    blocks.push(serde_json::json!({ "type": "text", "text": message.content }));
                }
                for call in &message.tool_calls {
                    blocks.push(serde_json::json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": tool_input(&call.arguments),
                    }));
                }
                ("assistant", blocks)
            }
            MessageRole::Tool => (
                "user",
                vec![serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.as_deref().unwrap_or_default(),
                    "content": message.content,
                })],
            ),
        }
    }

    /// Convert a ToolDefinition to Claude API format
    fn tool_to_claude(&self, tool: &ToolDefinition) -> serde_json::Value {
        serde_json::json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.input_schema
        })
    }

    /// Parse a response from Claude API
    fn parse_response(&self, response: ClaudeResponse) -> AiResponse {
        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ContentBlock::Text { text } => texts.push(text),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::new(id, name, ToolArguments::from_value(input)));
                }
                ContentBlock::Other => {}
            }
        }

        AiResponse {
            content: texts.join("\n"),
            tool_calls,
            stop_reason: response
                .stop_reason
                .as_deref()
                .map(StopReason::from)
                .unwrap_or(StopReason::EndTurn),
            usage: UsageStats {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
            model: response.model,
            used_fallback: false,
        }
    }

    /// One non-streaming request, retried on rate limits.
    async fn send(
        &self,
        cancel: &CancellationToken,
        prompt: &PromptData,
        tool_mode: Option<ToolCallMode>,
    ) -> LlmResult<AiResponse> {
        let body = self.build_request_body(prompt, tool_mode, false);
        let url = self.messages_url();

        let response: ClaudeResponse = with_retry(&self.config.retry, cancel, "anthropic", || {
            let request = self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body);
            async move {
                let response = request.send().await.map_err(network_error)?;
                if !response.status().is_success() {
                    return Err(error_from_response(response, "anthropic").await);
                }
                let text = response.text().await.map_err(network_error)?;
                serde_json::from_str(&text).map_err(|e| LlmError::MalformedResponse {
                    message: format!("anthropic: failed to parse response: {}", e),
                })
            }
        })
        .await?;

        Ok(self.parse_response(response))
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

/// Claude requires `input` to be an object; raw argument text is wrapped.
fn tool_input(arguments: &ToolArguments) -> serde_json::Value {
    match arguments {
        ToolArguments::Structured(map) => serde_json::Value::Object(map.clone()),
        ToolArguments::Raw(raw) => serde_json::json!({ "raw_arguments": raw }),
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
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
        debug!(provider = "anthropic", tool_mode = %mode, "Sending request with native tools");

        match self.send(cancel, prompt, Some(mode)).await {
            Err(LlmError::InvalidRequest { message }) => {
                warn!(
                    provider = "anthropic",
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
        let url = self.messages_url();

        let response = with_retry(&self.config.retry, cancel, "anthropic", || {
            let request = self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body);
            async move {
                let response = request.send().await.map_err(network_error)?;
                if !response.status().is_success() {
                    return Err(error_from_response(response, "anthropic").await);
                }
                Ok(response)
            }
        })
        .await?;

        let mut adapter = ClaudeApiAdapter::new();
        forward_text(cancel, response, &mut adapter, tx, "anthropic").await
    }

    async fn count_tokens(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
    ) -> LlmResult<usize> {
        let body = serde_json::json!({
            "model": self.model_info.id,
            "messages": self.convert_messages(messages),
        });
        let request = self
            .client
            .post(format!("{}/v1/messages/count_tokens", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            outcome = async move {
                let response = request.send().await.map_err(network_error)?;
                if !response.status().is_success() {
                    return Err(error_from_response(response, "anthropic").await);
                }
                response
                    .json::<TokenCountResponse>()
                    .await
                    .map_err(|e| LlmError::MalformedResponse { message: e.to_string() })
            } => outcome,
        };

        match outcome {
            Ok(count) => Ok(count.input_tokens as usize),
            Err(e) => {
                debug!(provider = "anthropic", error = %e, "Token counting endpoint unavailable, estimating");
                Ok(estimate_tokens(messages))
            }
        }
    }
}

/// Claude API response format
#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: ResponseUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct TokenCountResponse {
    input_tokens: u32,
}
