//! Taskforge Tools
//!
//! The tool executor boundary used by task sessions:
//! - `ToolExecutor` - trait the session dispatches tool calls through
//! - `ToolResult` - execution result type
//! - `Tool` trait, `ToolRegistry` and `FunctionTool` - the stock executor
//! - `AttemptCompletionTool` - the built-in completion signal
//!
//! Concrete file/shell tools are supplied by the embedding application.

pub mod completion;
pub mod executor;
pub mod registry;

pub use completion::{AttemptCompletionTool, ATTEMPT_COMPLETION_TOOL};
pub use executor::{ToolExecutor, ToolResult};
pub use registry::{FunctionTool, FunctionToolHandler, Tool, ToolRegistry};
