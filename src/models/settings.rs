//! Settings Models
//!
//! Application configuration and settings data structures.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use taskforge_llm::ProviderConfig;

/// Environment variables that override the provider section
pub const ENV_PROVIDER: &str = "TASKFORGE_PROVIDER";
pub const ENV_MODEL: &str = "TASKFORGE_MODEL";
pub const ENV_API_KEY: &str = "TASKFORGE_API_KEY";
pub const ENV_BASE_URL: &str = "TASKFORGE_BASE_URL";

/// Placeholder replaced with the reflection reason in continuation messages
pub const REASON_PLACEHOLDER: &str = "{reason}";

/// Application configuration stored in config.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend, credentials, model and retry policy
    pub provider: ProviderConfig,
    pub session: SessionSettings,
    pub reflection: ReflectionSettings,
    /// Extra tool-choice keyword tables (TOML) merged over the built-in ones
    pub keyword_tables: Vec<PathBuf>,
}

/// Budgets and wording for the task session loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Model turns per attempt before reflection is forced
    pub max_turns: u32,
    /// Attempts per task, including the first
    pub max_attempts: u32,
    /// User message injected before a retry; `{reason}` is substituted
    pub continuation_message: String,
    /// Tool output longer than this is truncated before entering the conversation
    pub tool_output_max_chars: usize,
    /// Directory handed to tools; the process working directory when unset
    pub working_dir: Option<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_turns: 25,
            max_attempts: 3,
            continuation_message: "The task is not finished yet: {reason}. \
                Continue working on the original task. Call attempt_completion \
                once everything is done."
                .to_string(),
            tool_output_max_chars: 20_000,
            working_dir: None,
        }
    }
}

impl SessionSettings {
    /// Continuation text for a given reflection reason
    pub fn continuation_for(&self, reason: &str) -> String {
        self.continuation_message.replace(REASON_PLACEHOLDER, reason)
    }
}

/// Reflection evaluator knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionSettings {
    /// Success rate at or above which the task counts as done
    pub completion_threshold: f64,
    /// Success rate at or above which another attempt is worthwhile
    pub retry_threshold: f64,
    /// Bound on the AI judgment call
    pub timeout_secs: u64,
    /// Ask the model before applying the rule-based fallback
    pub use_ai: bool,
}

impl Default for ReflectionSettings {
    fn default() -> Self {
        Self {
            completion_threshold: 0.75,
            retry_threshold: 0.40,
            timeout_secs: 60,
            use_ai: true,
        }
    }
}

impl AppConfig {
    /// Apply `TASKFORGE_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get(ENV_PROVIDER) {
            self.provider.provider = provider;
        }
        if let Some(model) = get(ENV_MODEL) {
            self.provider.model = model;
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.provider.base_url = Some(url);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.provider.provider.trim().is_empty() {
            return Err("provider.provider must not be empty".to_string());
        }

        if self.session.max_turns == 0 {
            return Err("session.max_turns must be at least 1".to_string());
        }
        if self.session.max_attempts == 0 {
            return Err("session.max_attempts must be at least 1".to_string());
        }
        if self.session.tool_output_max_chars == 0 {
            return Err("session.tool_output_max_chars must be at least 1".to_string());
        }

        let r = &self.reflection;
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(r.completion_threshold) || !in_unit(r.retry_threshold) {
            return Err("reflection thresholds must be between 0 and 1".to_string());
        }
        if r.retry_threshold > r.completion_threshold {
            return Err(format!(
                "reflection.retry_threshold ({}) cannot exceed completion_threshold ({})",
                r.retry_threshold, r.completion_threshold
            ));
        }
        if r.timeout_secs == 0 {
            return Err("reflection.timeout_secs must be at least 1".to_string());
        }

        Ok(())
    }
}
