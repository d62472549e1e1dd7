//! Error Handling
//!
//! Unified error type for the application layer.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use taskforge_llm::LlmError;

use crate::services::plan::PlanError;
use crate::services::reflection::ReflectionError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider errors that end a session (fatal or cancelled)
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Illegal plan mutation
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Reflection(#[from] ReflectionError),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error came from cancelling the session
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Llm(LlmError::Cancelled))
    }
}
