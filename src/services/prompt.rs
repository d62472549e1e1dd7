//! System Prompt Builder
//!
//! Builds the system prompt for task sessions: role, working directory,
//! tool list, completion protocol and optional codebase context supplied
//! by an external indexer.

use std::path::Path;

use async_trait::async_trait;

use taskforge_llm::ToolDefinition;
use taskforge_tools::ATTEMPT_COMPLETION_TOOL;

/// Heading under which indexer output is appended
pub const CODEBASE_CONTEXT_HEADING: &str = "## Codebase Context";

/// Supplies extra context about the codebase for a task.
///
/// The session only consumes the returned text; how it is produced
/// (search index, embeddings, static summary) is up to the implementor.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn context_for(&self, task: &str) -> Option<String>;
}

/// Fixed text, mostly useful for tests and `--context-file`.
#[derive(Debug, Clone)]
pub struct StaticContext(pub String);

#[async_trait]
impl ContextSource for StaticContext {
    async fn context_for(&self, _task: &str) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Build the session system prompt.
pub fn build_system_prompt(
    working_dir: &Path,
    tools: &[ToolDefinition],
    codebase_context: Option<&str>,
) -> String {
    let tool_list = if tools.is_empty() {
        "(no tools available)".to_string()
    } else {
        tools
            .iter()
            .map(|t| format!("- **{}**: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut prompt = format!(
        r#"You are an autonomous coding agent working in the project directory shown below. Complete the user's task by calling tools; do not stop to ask for confirmation.

## Working Directory
{working_dir}

## Available Tools
{tool_list}

## Guidelines

- Read before modifying: inspect a file before changing it.
- Relative paths resolve against the working directory.
- When a tool fails, read the error and adjust instead of repeating the same call.
- When the task is finished and verified, call `{completion}` with a short summary of what was done. Do not call it before the work is complete."#,
        working_dir = working_dir.display(),
        tool_list = tool_list,
        completion = ATTEMPT_COMPLETION_TOOL,
    );

    if let Some(context) = codebase_context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(CODEBASE_CONTEXT_HEADING);
        prompt.push('\n');
        prompt.push_str(context);
    }

    prompt
}
