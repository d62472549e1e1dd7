//! Tool Executor Boundary
//!
//! The task session hands every tool call to a `ToolExecutor` and reads
//! back a `ToolResult`. The executor is opaque to the session: it only
//! sees tool names, arguments and text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use taskforge_core::{CoreError, ToolContext};
use taskforge_llm::{ToolArguments, ToolDefinition};

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the execution was successful
    pub success: bool,
    /// Output from the tool (if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful result
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    /// Create an error result
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Error text of a failed result
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("Unknown error")
    }

    /// Convert to string for LLM consumption
    pub fn to_content(&self) -> String {
        if self.success {
            self.output.clone().unwrap_or_default()
        } else {
            format!("Error: {}", self.error_message())
        }
    }
}

impl From<CoreError> for ToolResult {
    fn from(err: CoreError) -> Self {
        Self::err(err.to_string())
    }
}

/// Executes tool calls on behalf of a task session.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tool definitions offered to the model, in a stable order
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute one call. Failures are reported in the result, never raised.
    async fn execute(&self, ctx: &ToolContext, name: &str, args: &ToolArguments) -> ToolResult;
}
