//! Taskforge LLM
//!
//! Provides a unified interface for interacting with LLM providers:
//! - Anthropic Claude
//! - OpenAI and OpenAI-compatible backends (DeepSeek, Ollama)
//!
//! Also includes the tool-choice classifier, the textual tool-calling
//! fallback, retry/backoff, streaming adapters and the provider registry.

pub mod anthropic;
pub mod http_client;
pub mod openai;
pub mod prompt_fallback;
pub mod provider;
pub mod registry;
pub mod retry;
mod sse;
pub mod stream;
pub mod streaming_adapters;
pub mod tool_choice;
pub mod types;

// Re-export main types
pub use anthropic::AnthropicProvider;
pub use http_client::build_http_client;
pub use openai::{BackendProfile, OpenAIProvider};
pub use provider::{estimate_tokens, LlmProvider};
pub use registry::ProviderRegistry;
pub use retry::{with_retry, RetryPolicy};
pub use stream::{generate_code_stream, TextStream};
pub use tool_choice::{KeywordTables, MessageIntent, ToolChoiceClassifier};
pub use types::*;

// Re-export streaming adapters
pub use streaming_adapters::{ClaudeApiAdapter, OpenAIAdapter};
