//! Tool Execution Context
//!
//! The read-only view a tool gets of the session that invoked it. Tools
//! cannot mutate the conversation or the plan; they only see identifiers
//! and the working directory.

use std::path::{Path, PathBuf};

/// Context handed to the external tool executor for one tool call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    session_id: String,
    working_dir: PathBuf,
    tool_call_id: String,
    attempt: u32,
}

impl ToolContext {
    /// Create a new ToolContext.
    pub fn new(
        session_id: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            working_dir: working_dir.into(),
            tool_call_id: tool_call_id.into(),
            attempt: 1,
        }
    }

    /// Set the 1-based attempt number this call belongs to.
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Identifier of the owning task session.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Directory tools should resolve relative paths against.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Identifier of the tool call being executed.
    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
