//! Task Session Controller
//!
//! Owns one conversation for the lifetime of a task and drives it through
//! one or more attempts. Each attempt is a turn loop (model call, tool
//! dispatch, tool results appended) followed by a reflection verdict that
//! decides between finishing and trying again.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use taskforge_core::{StreamEvent, ToolContext};
use taskforge_llm::{
    AiResponse, LlmError, LlmProvider, Message, PromptData, ToolCall, UsageStats,
};
use taskforge_tools::{ToolExecutor, ToolResult, ATTEMPT_COMPLETION_TOOL};

use crate::models::settings::{ReflectionSettings, SessionSettings};
use crate::services::plan::ExecutionPlan;
use crate::services::reflection::{ReflectionEvaluator, ReflectionResult};
use crate::utils::error::{AppError, AppResult};

/// Final state of a processed task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Reflection judged the task done
    Completed,
    /// Attempts ran out, or reflection advised against retrying
    Incomplete,
    /// A non-fatal provider error ended the task
    Failed,
}

/// What `process_task` reports back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    /// Attempts started, including the first
    pub attempts: u32,
    /// Verdict of the last reflection, absent when the task failed first
    pub reflection: Option<ReflectionResult>,
    /// Last non-empty assistant text
    pub final_message: Option<String>,
    /// Provider error message for `Failed` outcomes
    pub error: Option<String>,
    /// Plan of the last attempt
    pub plan: ExecutionPlan,
    /// Tokens used across all attempts
    pub usage: UsageStats,
}

/// How one attempt's turn loop ended
enum AttemptEnd {
    /// The model stopped requesting tools, signalled completion, or ran
    /// out of turns
    Settled,
    /// A non-fatal provider error
    ProviderFailed(LlmError),
}

/// One task conversation
pub struct TaskSession {
    id: String,
    provider: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolExecutor>,
    reflection: ReflectionEvaluator,
    settings: SessionSettings,
    working_dir: PathBuf,
    system_prompt: Option<String>,
    events: Option<mpsc::Sender<StreamEvent>>,
    task: Option<String>,
    messages: Vec<Message>,
    last_text: Option<String>,
    usage: UsageStats,
    closed: bool,
}

impl TaskSession {
    /// Create a session. Reflection asks `provider` with default settings
    /// until `with_reflection` replaces it.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<dyn ToolExecutor>,
        settings: SessionSettings,
    ) -> Self {
        let reflection =
            ReflectionEvaluator::new(Some(provider.clone()), ReflectionSettings::default());
        let working_dir = settings
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            provider,
            tools,
            reflection,
            settings,
            working_dir,
            system_prompt: None,
            events: None,
            task: None,
            messages: Vec::new(),
            last_text: None,
            usage: UsageStats::default(),
            closed: false,
        }
    }

    pub fn with_reflection(mut self, reflection: ReflectionEvaluator) -> Self {
        self.reflection = reflection;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Report progress events to `sink`. A dropped receiver is ignored.
    pub fn with_event_sink(mut self, sink: mpsc::Sender<StreamEvent>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    /// The conversation so far
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn working_dir(&self) -> &std::path::Path {
        &self.working_dir
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Set the original task text and open the conversation with it.
    pub fn set_task(&mut self, task: impl Into<String>) {
        let task = task.into();
        self.messages.push(Message::user(task.clone()));
        self.task = Some(task);
    }

    /// Append a user message to the conversation.
    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Run the task to a verdict.
    ///
    /// Fatal provider errors and cancellation are returned as `Err`; other
    /// provider errors end the task with `TaskStatus::Failed` and leave the
    /// session usable.
    pub async fn process_task(&mut self, cancel: &CancellationToken) -> AppResult<TaskOutcome> {
        if self.closed {
            return Err(AppError::validation("Task session is closed"));
        }
        let task = self
            .task
            .clone()
            .ok_or_else(|| AppError::validation("No task set for this session"))?;

        self.usage = UsageStats::default();
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            info!(session_id = %self.id, attempt, max_attempts, "Starting attempt");
            let mut plan = ExecutionPlan::new();

            let end = self.run_attempt(cancel, attempt, &mut plan).await?;
            if let AttemptEnd::ProviderFailed(err) = end {
                warn!(session_id = %self.id, error = %err, "Task failed on provider error");
                self.emit(StreamEvent::Error {
                    message: err.to_string(),
                    code: None,
                })
                .await;
                return Ok(self
                    .finish(TaskStatus::Failed, attempt, None, Some(err.to_string()), plan)
                    .await);
            }

            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled.into());
            }

            let verdict = self
                .reflection
                .evaluate_completion(cancel, &plan, &task)
                .await?;
            info!(
                session_id = %self.id,
                attempt,
                completed = verdict.task_completed,
                retry = verdict.should_retry,
                reason = %verdict.reason,
                "Reflection verdict"
            );

            if verdict.task_completed {
                return Ok(self
                    .finish(TaskStatus::Completed, attempt, Some(verdict), None, plan)
                    .await);
            }
            if !verdict.should_retry || attempt >= max_attempts {
                return Ok(self
                    .finish(TaskStatus::Incomplete, attempt, Some(verdict), None, plan)
                    .await);
            }

            let continuation = self.settings.continuation_for(&verdict.reason);
            self.messages.push(Message::user(continuation));
        }
    }

    /// Run `process_task` on a background task, handing the session back
    /// when it finishes.
    pub fn spawn(
        mut self,
        cancel: CancellationToken,
    ) -> JoinHandle<(TaskSession, AppResult<TaskOutcome>)> {
        tokio::spawn(async move {
            let result = self.process_task(&cancel).await;
            (self, result)
        })
    }

    /// Release the conversation and close the event sink.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        debug!(session_id = %self.id, "Closing task session");
        self.closed = true;
        self.events = None;
        self.messages.clear();
        self.last_text = None;
    }

    async fn run_attempt(
        &mut self,
        cancel: &CancellationToken,
        attempt: u32,
        plan: &mut ExecutionPlan,
    ) -> AppResult<AttemptEnd> {
        for turn in 1..=self.settings.max_turns {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled.into());
            }

            let mut prompt =
                PromptData::new(self.messages.clone()).with_tools(self.tools.definitions());
            prompt.system = self.system_prompt.clone();

            let response = match self.provider.generate_code(cancel, &prompt).await {
                Ok(response) => response,
                Err(err) if err.is_fatal() || matches!(err, LlmError::Cancelled) => {
                    return Err(err.into());
                }
                Err(err) => return Ok(AttemptEnd::ProviderFailed(err)),
            };
            debug!(
                session_id = %self.id,
                attempt,
                turn,
                tool_calls = response.tool_calls.len(),
                used_fallback = response.used_fallback,
                "Model turn"
            );

            self.record_response(&response).await;
            if !response.has_tool_calls() {
                return Ok(AttemptEnd::Settled);
            }

            let mut completion_signalled = false;
            for call in &response.tool_calls {
                let result = self.dispatch(cancel, attempt, plan, call).await?;
                if call.name == ATTEMPT_COMPLETION_TOOL && result.success {
                    completion_signalled = true;
                }
            }
            if completion_signalled {
                return Ok(AttemptEnd::Settled);
            }
        }

        warn!(
            session_id = %self.id,
            attempt,
            max_turns = self.settings.max_turns,
            "Turn budget exhausted"
        );
        Ok(AttemptEnd::Settled)
    }

    async fn record_response(&mut self, response: &AiResponse) {
        self.usage.accumulate(&response.usage);

        if !response.content.trim().is_empty() {
            self.last_text = Some(response.content.clone());
            self.emit(StreamEvent::TextDelta {
                content: response.content.clone(),
            })
            .await;
        }
        if !response.is_empty() {
            self.messages.push(Message::assistant_with_tools(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
        }
    }

    async fn dispatch(
        &mut self,
        cancel: &CancellationToken,
        attempt: u32,
        plan: &mut ExecutionPlan,
        call: &ToolCall,
    ) -> AppResult<ToolResult> {
        self.emit(StreamEvent::ToolStart {
            tool_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: Some(call.arguments.to_json_string()),
        })
        .await;

        let step = plan.add_step(call.name.clone());
        let ctx = ToolContext::new(self.id.clone(), self.working_dir.clone(), call.id.clone())
            .with_attempt(attempt);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                plan.fail_step(step, "cancelled")?;
                return Err(LlmError::Cancelled.into());
            }
            result = self.tools.execute(&ctx, &call.name, &call.arguments) => result,
        };

        let content = if result.success {
            plan.complete_step(step)?;
            let output = result.output.as_deref().unwrap_or_default();
            format!(
                "Result of {}:\n{}",
                call.name,
                truncate_output(output, self.settings.tool_output_max_chars)
            )
        } else {
            plan.fail_step(step, result.error_message())?;
            format!(
                "Error from {}: {}",
                call.name,
                truncate_output(result.error_message(), self.settings.tool_output_max_chars)
            )
        };

        self.messages
            .push(Message::tool_result(call.id.clone(), content));
        self.emit(StreamEvent::ToolResult {
            tool_id: call.id.clone(),
            result: result.output.clone(),
            error: result.error.clone(),
        })
        .await;

        Ok(result)
    }

    async fn finish(
        &mut self,
        status: TaskStatus,
        attempts: u32,
        reflection: Option<ReflectionResult>,
        error: Option<String>,
        plan: ExecutionPlan,
    ) -> TaskOutcome {
        let stop_reason = match status {
            TaskStatus::Completed => "completed",
            TaskStatus::Incomplete => "incomplete",
            TaskStatus::Failed => "failed",
        };
        self.emit(StreamEvent::Complete {
            stop_reason: Some(stop_reason.to_string()),
        })
        .await;

        TaskOutcome {
            status,
            attempts,
            reflection,
            final_message: self.last_text.clone(),
            error,
            plan,
            usage: self.usage,
        }
    }

    /// Never waits on the sink; events are dropped while it is full.
    async fn emit(&self, event: StreamEvent) {
        if let Some(tx) = &self.events {
            match tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(session_id = %self.id, "Event sink full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(session_id = %self.id, "Event receiver dropped");
                }
            }
        }
    }
}

/// Cut `text` to at most `max_chars` characters, noting how much was dropped.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}\n... [truncated {} characters]", kept, total - max_chars)
}
