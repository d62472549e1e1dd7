//! OpenAI API Adapter
//!
//! Handles the chat-completions SSE format shared by OpenAI and the
//! OpenAI-compatible backends (DeepSeek, Ollama).

use serde::Deserialize;
use taskforge_core::streaming::{AdapterError, StreamAdapter, StreamEvent};

#[derive(Debug, Deserialize)]
struct OpenAIEvent {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Adapter for OpenAI-compatible SSE format
#[derive(Debug, Default)]
pub struct OpenAIAdapter {
    tool_id: Option<String>,
    tool_name: Option<String>,
    tool_args_buffer: String,
}

impl OpenAIAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flush any pending tool call, emitting a ToolComplete event
    fn flush_pending_tool(&mut self) -> Option<StreamEvent> {
        match (self.tool_id.take(), self.tool_name.take()) {
            (Some(id), Some(name)) => Some(StreamEvent::ToolComplete {
                tool_id: id,
                tool_name: name,
                arguments: std::mem::take(&mut self.tool_args_buffer),
            }),
            _ => None,
        }
    }
}

impl StreamAdapter for OpenAIAdapter {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<StreamEvent>, AdapterError> {
        let trimmed = input.trim();
        let json_str = match trimmed.strip_prefix("data:") {
            Some(rest) => rest.trim_start(),
            None if trimmed.starts_with('{') => trimmed,
            None => return Ok(vec![]),
        };

        // The [DONE] sentinel closes any tool call still being accumulated.
        if json_str.is_empty() || json_str == "[DONE]" {
            return Ok(self.flush_pending_tool().into_iter().collect());
        }

        let event: OpenAIEvent =
            serde_json::from_str(json_str).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        let mut events = vec![];

        if let Some(usage) = event.usage {
            events.push(StreamEvent::Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        for choice in event.choices {
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                    events.push(StreamEvent::TextDelta { content });
                }

                for tc in delta.tool_calls.unwrap_or_default() {
                    if let Some(id) = tc.id {
                        events.extend(self.flush_pending_tool());
                        self.tool_id = Some(id.clone());
                        self.tool_name = tc.function.as_ref().and_then(|f| f.name.clone());
                        self.tool_args_buffer.clear();
                        if let Some(name) = &self.tool_name {
                            events.push(StreamEvent::ToolStart {
                                tool_id: id,
                                tool_name: name.clone(),
                                arguments: None,
                            });
                        }
                    }

                    if let Some(args) = tc.function.and_then(|f| f.arguments) {
                        self.tool_args_buffer.push_str(&args);
                        if let Some(id) = &self.tool_id {
                            events.push(StreamEvent::ToolArgumentsDelta {
                                tool_id: id.clone(),
                                partial: args,
                            });
                        }
                    }
                }
            }

            if let Some(finish_reason) = choice.finish_reason {
                events.extend(self.flush_pending_tool());
                events.push(StreamEvent::Complete {
                    stop_reason: Some(finish_reason),
                });
            }
        }

        Ok(events)
    }

    fn reset(&mut self) {
        self.tool_id = None;
        self.tool_name = None;
        self.tool_args_buffer.clear();
    }
}
