//! Task Session Integration Tests
//!
//! Runs whole tasks through `AgentContext` and `TaskSession` with the
//! Anthropic adapter pointed at a wiremock server. Tool calls go to a real
//! `ToolRegistry`; reflection asks the same mock backend.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use taskforge::services::ReflectionSource;
use taskforge::{AgentContext, AppConfig, AppError, SessionSettings, TaskStatus};
use taskforge_core::StreamEvent;
use taskforge_llm::{LlmError, ParameterSchema};
use taskforge_tools::{FunctionTool, ToolRegistry, ToolResult};

use crate::support::{
    claude_error, claude_text, claude_tool_use, provider_config, with_tools, without_tools,
};

fn config(server: &MockServer, workspace: &TempDir) -> AppConfig {
    AppConfig {
        provider: provider_config("anthropic", &server.uri()),
        session: SessionSettings {
            working_dir: Some(workspace.path().to_path_buf()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Registry with the completion tool and a `read_file` tool rooted at the
/// session working directory.
fn tools() -> Arc<ToolRegistry> {
    let mut properties = HashMap::new();
    properties.insert("path".to_string(), ParameterSchema::string(Some("File path")));

    let mut registry = ToolRegistry::with_completion_tool();
    registry.register(Arc::new(FunctionTool::new(
        "read_file",
        "Read a file relative to the working directory",
        ParameterSchema::object(None, properties, vec!["path".to_string()]),
        |ctx, args| {
            let target = args
                .get("path")
                .and_then(|v| v.as_str())
                .map(|p| ctx.working_dir().join(p));
            Box::pin(async move {
                let Some(target) = target else {
                    return ToolResult::err("path is required");
                };
                match tokio::fs::read_to_string(&target).await {
                    Ok(content) => ToolResult::ok(content),
                    Err(e) => ToolResult::err(format!("{}: {}", target.display(), e)),
                }
            })
        },
    )));
    Arc::new(registry)
}

/// Model turns, in order, for requests that carry tool definitions.
async fn mount_turns(server: &MockServer, turns: Vec<serde_json::Value>) {
    let last = turns.len();
    for (i, body) in turns.into_iter().enumerate() {
        let mock = Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(with_tools)
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .with_priority((i + 1) as u8);
        let mock = if i + 1 < last { mock.up_to_n_times(1) } else { mock };
        mock.mount(server).await;
    }
}

/// Reflection replies, in order, for tool-less requests.
async fn mount_verdicts(server: &MockServer, verdicts: &[&str]) {
    let last = verdicts.len();
    for (i, text) in verdicts.iter().enumerate() {
        let mock = Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(without_tools)
            .respond_with(ResponseTemplate::new(200).set_body_json(claude_text(text)))
            .with_priority((i + 1) as u8);
        let mock = if i + 1 < last { mock.up_to_n_times(1) } else { mock };
        mock.mount(server).await;
    }
}

#[tokio::test]
async fn test_task_completes_with_model_verdict() {
    let workspace = TempDir::new().unwrap();
    std::fs::write(workspace.path().join("main.rs"), "fn main() {}").unwrap();

    let server = MockServer::start().await;
    mount_turns(
        &server,
        vec![
            claude_tool_use("toolu_1", "read_file", json!({ "path": "main.rs" })),
            claude_tool_use(
                "toolu_2",
                "attempt_completion",
                json!({ "result": "main.rs holds an empty main" }),
            ),
        ],
    )
    .await;
    mount_verdicts(
        &server,
        &["COMPLETED: yes\nREASON: the file was read and summarized\nRETRY: no"],
    )
    .await;

    let ctx = AgentContext::new(config(&server, &workspace)).unwrap();
    let mut session = ctx.new_session("Summarize main.rs", tools()).await.unwrap();
    let outcome = session.process_task(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.plan.len(), 2);
    assert_eq!(outcome.plan.completed_count(), 2);
    assert_eq!(outcome.usage.input_tokens, 40);

    let verdict = outcome.reflection.unwrap();
    assert_eq!(verdict.source, ReflectionSource::Ai);
    assert_eq!(verdict.reason, "THE FILE WAS READ AND SUMMARIZED");

    // The second turn carried the tool result back to the model.
    let requests = server.received_requests().await.unwrap();
    let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    let last_turn = second["messages"].as_array().unwrap().last().unwrap().clone();
    assert_eq!(last_turn["role"], "user");
    assert_eq!(last_turn["content"][0]["type"], "tool_result");
    assert_eq!(last_turn["content"][0]["tool_use_id"], "toolu_1");
    assert_eq!(
        last_turn["content"][0]["content"],
        "Result of read_file:\nfn main() {}"
    );
    assert!(second["system"]
        .as_str()
        .unwrap()
        .contains("## Available Tools"));
}

#[tokio::test]
async fn test_retry_verdict_starts_second_attempt() {
    let workspace = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_turns(
        &server,
        vec![
            claude_tool_use("toolu_1", "read_file", json!({ "path": "README.md" })),
            claude_text("The task looks done to me."),
            claude_tool_use("toolu_9", "attempt_completion", json!({ "result": "done" })),
        ],
    )
    .await;
    mount_verdicts(
        &server,
        &[
            "COMPLETED: no\nREASON: nothing was changed\nRETRY: yes",
            "COMPLETED: yes\nREASON: completion confirmed\nRETRY: no",
        ],
    )
    .await;

    let ctx = AgentContext::new(config(&server, &workspace)).unwrap();
    let mut session = ctx.new_session("Add a README", tools()).await.unwrap();
    let outcome = session.process_task(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(outcome.attempts, 2);
    assert!(session
        .messages()
        .iter()
        .any(|m| m.content.contains("NOTHING WAS CHANGED")));
}

#[tokio::test]
async fn test_answer_without_tools_is_not_completed() {
    let workspace = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_turns(&server, vec![claude_text("2 + 2 is 4.")]).await;
    // Only the turn request may reach the backend.
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(without_tools)
        .respond_with(ResponseTemplate::new(200).set_body_json(claude_text(
            "COMPLETED: yes\nREASON: answered\nRETRY: no",
        )))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config(&server, &workspace);
    config.session.max_attempts = 1;
    let ctx = AgentContext::new(config).unwrap();
    let mut session = ctx.new_session("What is 2 + 2?", tools()).await.unwrap();
    let outcome = session.process_task(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.status, TaskStatus::Incomplete);
    assert!(outcome.plan.is_empty());
    let verdict = outcome.reflection.unwrap();
    assert_eq!(verdict.source, ReflectionSource::Fallback);
    assert!(!verdict.task_completed);
}

#[tokio::test]
async fn test_unreadable_verdict_uses_rule_based_fallback() {
    let workspace = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_turns(
        &server,
        vec![
            claude_tool_use("toolu_1", "read_file", json!({ "path": "missing.rs" })),
            claude_tool_use("toolu_2", "read_file", json!({ "path": "missing.rs" })),
            claude_text("I could not find the file."),
        ],
    )
    .await;
    mount_verdicts(&server, &["Looks fine to me."]).await;

    let mut config = config(&server, &workspace);
    config.session.max_attempts = 1;
    let ctx = AgentContext::new(config).unwrap();
    let mut session = ctx.new_session("Read missing.rs", tools()).await.unwrap();
    let outcome = session.process_task(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.status, TaskStatus::Incomplete);
    assert_eq!(outcome.plan.failed_count(), 2);
    let verdict = outcome.reflection.unwrap();
    assert_eq!(verdict.source, ReflectionSource::Fallback);
    assert!(!verdict.task_completed);
    assert_eq!(
        outcome.final_message.as_deref(),
        Some("I could not find the file.")
    );
}

#[tokio::test]
async fn test_authentication_failure_aborts_task() {
    let workspace = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(claude_error("authentication_error", "bad key")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ctx = AgentContext::new(config(&server, &workspace)).unwrap();
    let mut session = ctx.new_session("anything", tools()).await.unwrap();
    let err = session
        .process_task(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Llm(LlmError::AuthenticationFailed { .. })
    ));
}

#[tokio::test]
async fn test_events_follow_tool_lifecycle() {
    let workspace = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_turns(
        &server,
        vec![claude_tool_use(
            "toolu_1",
            "attempt_completion",
            json!({ "result": "nothing to do" }),
        )],
    )
    .await;
    mount_verdicts(&server, &["COMPLETED: yes\nREASON: trivial\nRETRY: no"]).await;

    let (tx, mut rx) = mpsc::channel(32);
    let ctx = AgentContext::new(config(&server, &workspace)).unwrap();
    let mut session = ctx
        .new_session("Do nothing", tools())
        .await
        .unwrap()
        .with_event_sink(tx);
    session.process_task(&CancellationToken::new()).await.unwrap();
    session.close();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(matches!(
        &events[0],
        StreamEvent::ToolStart { tool_id, tool_name, .. }
            if tool_id == "toolu_1" && tool_name == "attempt_completion"
    ));
    assert!(matches!(
        &events[1],
        StreamEvent::ToolResult { result: Some(_), error: None, .. }
    ));
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Complete {
            stop_reason: Some("completed".to_string())
        })
    );
}
