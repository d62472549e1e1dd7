//! Completion Signal Tool
//!
//! `attempt_completion` is how the model declares the task finished. The
//! session ends the turn loop when this tool succeeds, and the reflection
//! evaluator treats a completed call to it as the strongest completion
//! signal.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::info;

use taskforge_core::ToolContext;
use taskforge_llm::{ParameterSchema, ToolArguments};

use crate::executor::ToolResult;
use crate::registry::Tool;

/// Name of the completion signal tool
pub const ATTEMPT_COMPLETION_TOOL: &str = "attempt_completion";

/// Built-in tool the model calls once it believes the task is done.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptCompletionTool;

#[async_trait]
impl Tool for AttemptCompletionTool {
    fn name(&self) -> &str {
        ATTEMPT_COMPLETION_TOOL
    }

    fn description(&self) -> &str {
        "Signal that the task is complete. Call this only after every change has been \
         made and verified. Provide a short summary of what was done in `result`."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut props = HashMap::new();
        props.insert(
            "result".to_string(),
            ParameterSchema::string(Some("Summary of the completed work")),
        );
        ParameterSchema::object(None, props, vec!["result".to_string()])
    }

    async fn execute(&self, ctx: &ToolContext, args: &ToolArguments) -> ToolResult {
        let summary = match args {
            ToolArguments::Raw(raw) => Some(raw.trim().to_string()),
            ToolArguments::Structured(_) => args
                .get("result")
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string()),
        };

        match summary.filter(|s| !s.is_empty()) {
            Some(summary) => {
                info!(
                    session_id = ctx.session_id(),
                    attempt = ctx.attempt(),
                    "Model signalled task completion"
                );
                ToolResult::ok(summary)
            }
            None => ToolResult::err("attempt_completion requires a non-empty 'result' argument"),
        }
    }
}
