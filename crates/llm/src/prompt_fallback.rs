//! Prompt-Based Tool Calling Fallback
//!
//! For backends or models that reject native tool calling, the tool
//! catalogue is injected into the system prompt and the model is asked to
//! answer with a fixed JSON envelope:
//!
//! ```text
//! {"content": "...", "tool_calls": [{"name": "...", "args": {...}}]}
//! ```
//!
//! The reply is parsed leniently. A reply that cannot be decoded is
//! returned as plain content with no tool calls, never as an error.

use serde_json::{Map, Value};

use crate::types::{
    AiResponse, Message, MessageRole, PromptData, StopReason, ToolArguments, ToolCall,
    ToolDefinition,
};

/// Content and tool calls recovered from a fallback-mode reply.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Build the system prompt for fallback mode: the caller's system prompt
/// followed by the textual tool catalogue and the envelope instructions.
pub fn build_fallback_system_prompt(base: Option<&str>, tools: &[ToolDefinition]) -> String {
    let mut catalogue = String::new();
    for tool in tools {
        catalogue.push_str(&format!("### {}\n{}\n", tool.name, tool.description));
        let schema =
            serde_json::to_string(&tool.input_schema).unwrap_or_else(|_| "{}".to_string());
        catalogue.push_str(&format!("Input schema: {}\n\n", schema));
    }

    let instructions = format!(
        r#"## Tool Calling

Native tool calling is unavailable. You can still use the tools listed below.
Reply with exactly one JSON object in this shape and nothing else:

{{"content": "<text for the user>", "tool_calls": [{{"name": "<tool name>", "args": {{"<param>": "<value>"}}}}]}}

- Use an empty "tool_calls" array when no tool is needed.
- Only use tools from the list below, with arguments matching their schema.
- After requesting tools, STOP and wait for the real results. Never invent tool output.

## Available Tools

{catalogue}"#
    );

    match base.map(str::trim).filter(|b| !b.is_empty()) {
        Some(base) => format!("{}\n\n{}", base, instructions.trim_end()),
        None => instructions.trim_end().to_string(),
    }
}

/// Rewrite a prompt for fallback mode: no native tools, catalogue in the
/// system prompt, and prior tool traffic flattened into plain text turns.
pub fn fallback_prompt(prompt: &PromptData) -> PromptData {
    let messages = prompt
        .sendable_messages()
        .map(|message| match message.role {
            MessageRole::Tool => Message::user(format!(
                "Tool result ({}):\n{}",
                message.tool_call_id.as_deref().unwrap_or("unknown"),
                message.content
            )),
            MessageRole::Assistant if !message.tool_calls.is_empty() => {
                Message::assistant(render_envelope(&message.content, &message.tool_calls))
            }
            _ => message.clone(),
        })
        .collect();

    PromptData {
        system: Some(build_fallback_system_prompt(
            prompt.system.as_deref(),
            &prompt.tools,
        )),
        messages,
        tools: Vec::new(),
    }
}

/// Serialize an assistant turn back into the envelope format so the model
/// sees its own earlier calls the way it was told to write them.
fn render_envelope(content: &str, tool_calls: &[ToolCall]) -> String {
    let calls: Vec<Value> = tool_calls
        .iter()
        .map(|call| serde_json::json!({ "name": call.name, "args": call.arguments.to_value() }))
        .collect();
    serde_json::json!({ "content": content, "tool_calls": calls }).to_string()
}

/// Parse a fallback-mode reply.
///
/// Tries each balanced `{...}` span in order until one decodes as an
/// envelope. Decoding is lenient: the call list may be `tool_calls` or
/// `tools`, each call's name may be `name` or `tool`, arguments may be
/// `args`, `arguments` or `input`. A bare single call object
/// (`{"tool": ..., "arguments": ...}`) is accepted too. With no envelope
/// anywhere the whole reply is content.
pub fn parse_fallback_response(text: &str) -> FallbackReply {
    let mut cursor = 0;
    while let Some(found) = text[cursor..].find('{') {
        let start = cursor + found;
        cursor = start + 1;

        let Some(span) = find_first_json_object(&text[start..]) else {
            continue;
        };
        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(span) else {
            continue;
        };
        if let Some(reply) = decode_envelope(object) {
            return reply;
        }
        // Nested objects of a non-envelope are not candidates.
        cursor = start + span.len();
    }

    FallbackReply {
        content: text.trim().to_string(),
        tool_calls: Vec::new(),
    }
}

fn decode_envelope(envelope: Map<String, Value>) -> Option<FallbackReply> {
    let call_list = envelope
        .get("tool_calls")
        .or_else(|| envelope.get("tools"))
        .and_then(Value::as_array);

    let tool_calls: Vec<ToolCall> = match call_list {
        Some(list) => list.iter().filter_map(decode_call).collect(),
        None => decode_call(&Value::Object(envelope.clone()))
            .into_iter()
            .collect(),
    };

    let content = match envelope.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    if content.is_empty() && tool_calls.is_empty() && call_list.is_none() {
        return None;
    }

    Some(FallbackReply {
        content,
        tool_calls,
    })
}

/// Re-read a response produced from a [`fallback_prompt`] request: the
/// envelope's content and calls replace the raw text.
pub fn into_fallback_response(mut response: AiResponse) -> AiResponse {
    let reply = parse_fallback_response(&response.content);
    response.content = reply.content;
    response.tool_calls = reply.tool_calls;
    if response.has_tool_calls() {
        response.stop_reason = StopReason::ToolUse;
    }
    response.used_fallback = true;
    response
}

fn decode_call(value: &Value) -> Option<ToolCall> {
    let obj = value.as_object()?;
    let name = obj
        .get("name")
        .or_else(|| obj.get("tool"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())?;
    let args = obj
        .get("args")
        .or_else(|| obj.get("arguments"))
        .or_else(|| obj.get("input"))
        .cloned()
        .unwrap_or(Value::Null);
    let id = obj.get("id").and_then(Value::as_str).map(str::to_string);
    Some(ToolCall::new(id, name, ToolArguments::from_value(args)))
}

/// Return the first balanced `{...}` span, ignoring braces inside JSON
/// string literals.
pub fn find_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
