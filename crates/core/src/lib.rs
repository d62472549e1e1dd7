//! Taskforge Core
//!
//! Foundational types shared by the taskforge workspace crates. This crate has
//! no dependency on any LLM backend, HTTP client or async runtime.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `context` - Read-only context handed to tool executors (`ToolContext`)
//! - `streaming` - Unified stream event types and the `StreamAdapter` trait

pub mod context;
pub mod error;
pub mod streaming;

pub use context::ToolContext;
pub use error::{CoreError, CoreResult};
pub use streaming::{sse_data, AdapterError, StreamAdapter, StreamEvent};
