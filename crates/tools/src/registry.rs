//! Tool Trait and Registry
//!
//! `Tool` is the unit of registration; `ToolRegistry` dispatches by name
//! and is the stock `ToolExecutor`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use taskforge_core::{CoreError, ToolContext};
use taskforge_llm::{ParameterSchema, ToolArguments, ToolDefinition};

use crate::completion::AttemptCompletionTool;
use crate::executor::{ToolExecutor, ToolResult};

/// A tool the model can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does
    fn description(&self) -> &str;

    /// JSON schema describing the tool's input parameters
    fn parameters_schema(&self) -> ParameterSchema;

    /// Execute the tool. Raw (undecodable) arguments are passed through
    /// untouched; each tool decides what to do with them.
    async fn execute(&self, ctx: &ToolContext, args: &ToolArguments) -> ToolResult;
}

/// Registry of available tools.
///
/// O(1) lookup by name with registration order kept for deterministic
/// definitions.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Insertion order for deterministic iteration
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registry pre-loaded with the `attempt_completion` signal tool.
    pub fn with_completion_tool() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AttemptCompletionTool));
        registry
    }

    /// Register a tool. If a tool with the same name already exists, it is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    /// Unregister a tool by name. Returns the removed tool, or None if not found.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.order.retain(|n| n != name);
        self.tools.remove(name)
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All registered tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.parameters_schema(),
            })
            .collect()
    }

    async fn execute(&self, ctx: &ToolContext, name: &str, args: &ToolArguments) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => {
                debug!(tool = name, call_id = ctx.tool_call_id(), "Executing tool");
                tool.execute(ctx, args).await
            }
            None => CoreError::ToolNotFound(name.to_string()).into(),
        }
    }
}

// ── FunctionTool ─────────────────────────────────────────────────────

/// Async handler used by `FunctionTool`.
pub type FunctionToolHandler = Box<
    dyn Fn(&ToolContext, ToolArguments) -> Pin<Box<dyn Future<Output = ToolResult> + Send + '_>>
        + Send
        + Sync,
>;

/// A tool created from an async closure.
///
/// ```ignore
/// let tool = FunctionTool::new(
///     "echo",
///     "Echoes the input",
///     ParameterSchema::object(None, HashMap::new(), vec![]),
///     |_ctx, args| Box::pin(async move {
///         let msg = args.get("message").and_then(|v| v.as_str()).unwrap_or("(empty)");
///         ToolResult::ok(msg)
///     }),
/// );
/// ```
pub struct FunctionTool {
    tool_name: String,
    tool_description: String,
    schema: ParameterSchema,
    handler: FunctionToolHandler,
}

impl FunctionTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParameterSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(&ToolContext, ToolArguments) -> Pin<Box<dyn Future<Output = ToolResult> + Send + '_>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            tool_name: name.into(),
            tool_description: description.into(),
            schema,
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.tool_description
    }

    fn parameters_schema(&self) -> ParameterSchema {
        self.schema.clone()
    }

    async fn execute(&self, ctx: &ToolContext, args: &ToolArguments) -> ToolResult {
        (self.handler)(ctx, args.clone()).await
    }
}
