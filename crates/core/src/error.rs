//! Core Error Types
//!
//! Errors shared by every workspace crate. Kept dependency-free
//! (thiserror + serde_json only) so the LLM and tools crates can use them
//! without pulling in the application layer.

use thiserror::Error;

/// Core error type for the taskforge workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// A tool name was not registered with the executor
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A tool ran and reported failure
    #[error("Tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a tool failure
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }
}
