//! Claude API Adapter
//!
//! Handles the Anthropic Messages SSE format (`content_block_*` and
//! `message_*` events).

use serde::Deserialize;
use taskforge_core::streaming::{sse_data, AdapterError, StreamAdapter, StreamEvent};

/// Wire events of the Messages stream
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    MessageStart { message: WireMessage },
    ContentBlockStart { index: usize, content_block: WireBlock },
    ContentBlockDelta { index: usize, delta: WireDelta },
    ContentBlockStop { index: usize },
    MessageDelta {
        delta: WireStop,
        #[serde(default)]
        usage: Option<WireOutputUsage>,
    },
    MessageStop,
    Error { error: WireError },
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireStop {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireOutputUsage {
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// A `tool_use` block whose input is still arriving
#[derive(Debug)]
struct OpenToolBlock {
    index: usize,
    id: String,
    name: String,
    input: String,
}

/// Adapter for the Anthropic Messages stream.
///
/// Only one content block is open at a time; input fragments for a
/// `tool_use` block are buffered until its `content_block_stop`.
#[derive(Debug, Default)]
pub struct ClaudeApiAdapter {
    open_tool: Option<OpenToolBlock>,
}

impl ClaudeApiAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn block_start(&mut self, index: usize, block: WireBlock) -> Vec<StreamEvent> {
        let WireBlock::ToolUse { id, name } = block else {
            return vec![];
        };
        let event = StreamEvent::ToolStart {
            tool_id: id.clone(),
            tool_name: name.clone(),
            arguments: None,
        };
        self.open_tool = Some(OpenToolBlock {
            index,
            id,
            name,
            input: String::new(),
        });
        vec![event]
    }

    fn block_delta(&mut self, index: usize, delta: WireDelta) -> Vec<StreamEvent> {
        match delta {
            WireDelta::TextDelta { text } => vec![StreamEvent::TextDelta { content: text }],
            WireDelta::InputJsonDelta { partial_json } => match self.open_tool.as_mut() {
                Some(tool) if tool.index == index => {
                    tool.input.push_str(&partial_json);
                    vec![StreamEvent::ToolArgumentsDelta {
                        tool_id: tool.id.clone(),
                        partial: partial_json,
                    }]
                }
                _ => vec![],
            },
            WireDelta::Other => vec![],
        }
    }

    fn block_stop(&mut self, index: usize) -> Vec<StreamEvent> {
        match self.open_tool.take() {
            Some(tool) if tool.index == index => vec![StreamEvent::ToolComplete {
                tool_id: tool.id,
                tool_name: tool.name,
                arguments: tool.input,
            }],
            other => {
                self.open_tool = other;
                vec![]
            }
        }
    }
}

impl StreamAdapter for ClaudeApiAdapter {
    fn provider_name(&self) -> &'static str {
        "claude-api"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<StreamEvent>, AdapterError> {
        let Some(payload) = sse_data(input) else {
            return Ok(vec![]);
        };
        let event: WireEvent =
            serde_json::from_str(payload).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        Ok(match event {
            WireEvent::MessageStart { message } => message
                .usage
                .map(|u| StreamEvent::Usage {
                    input_tokens: u.input_tokens,
                    output_tokens: u.output_tokens,
                })
                .into_iter()
                .collect(),
            WireEvent::ContentBlockStart {
                index,
                content_block,
            } => self.block_start(index, content_block),
            WireEvent::ContentBlockDelta { index, delta } => self.block_delta(index, delta),
            WireEvent::ContentBlockStop { index } => self.block_stop(index),
            WireEvent::MessageDelta { delta, usage } => {
                let usage = usage.map(|u| StreamEvent::Usage {
                    input_tokens: 0,
                    output_tokens: u.output_tokens,
                });
                let done = delta.stop_reason.map(|reason| StreamEvent::Complete {
                    stop_reason: Some(reason),
                });
                usage.into_iter().chain(done).collect()
            }
            WireEvent::MessageStop => vec![StreamEvent::Complete { stop_reason: None }],
            WireEvent::Error { error } => vec![StreamEvent::Error {
                message: error.message,
                code: error.kind,
            }],
            WireEvent::Ignored => vec![],
        })
    }

    fn reset(&mut self) {
        self.open_tool = None;
    }
}
