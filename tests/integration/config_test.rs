//! Configuration Integration Tests
//!
//! Config file on disk -> environment overrides -> agent context.

use std::collections::HashMap;

use tempfile::TempDir;

use taskforge::models::settings::{ENV_API_KEY, ENV_BASE_URL, ENV_MODEL, ENV_PROVIDER};
use taskforge::{AgentContext, AppConfig, ConfigService};
use taskforge_llm::LlmProvider;

#[test]
fn test_first_open_writes_default_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let service = ConfigService::open(&path).unwrap();
    assert!(path.exists());
    assert_eq!(service.get_config(), &AppConfig::default());

    let reopened = ConfigService::open(&path).unwrap();
    assert_eq!(reopened.get_config(), service.get_config());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "provider": { "provider": "deepseek", "model": "deepseek-chat" }, "session": { "max_turns": 5 } }"#,
    )
    .unwrap();

    let config = ConfigService::open(&path).unwrap().get_config().clone();
    assert_eq!(config.provider.provider, "deepseek");
    assert_eq!(config.session.max_turns, 5);
    assert_eq!(config.session.max_attempts, 3);
    assert_eq!(config.reflection.completion_threshold, 0.75);
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "session": { "max_attempts": 0 } }"#).unwrap();

    let err = ConfigService::open(&path).unwrap_err();
    assert!(err.to_string().contains("max_attempts"));
}

#[test]
fn test_environment_overrides_reach_provider() {
    let dir = TempDir::new().unwrap();
    let service = ConfigService::open(dir.path().join("config.json")).unwrap();

    let env: HashMap<&str, &str> = [
        (ENV_PROVIDER, "ollama"),
        (ENV_MODEL, "llama3.1"),
        (ENV_BASE_URL, "http://127.0.0.1:11434/v1"),
        (ENV_API_KEY, "  "),
    ]
    .into_iter()
    .collect();
    let config = service
        .effective_config_with(|key| env.get(key).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.provider.provider, "ollama");
    assert_eq!(config.provider.model, "llama3.1");
    assert!(config.provider.api_key.is_none());

    let ctx = AgentContext::new(config).unwrap();
    let provider = ctx.create_provider().unwrap();
    assert_eq!(provider.name(), "ollama");
    assert!(!provider.capabilities().tool_calling);
}
