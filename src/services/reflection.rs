//! Reflection Evaluator
//!
//! Decides after each attempt whether the task is done and, if not,
//! whether another attempt is worthwhile. The model is asked first; when
//! that call fails, times out or returns something unparsable, a
//! deterministic rule over the plan decides instead.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use taskforge_llm::LlmProvider;
use taskforge_tools::ATTEMPT_COMPLETION_TOOL;

use crate::models::settings::ReflectionSettings;
use crate::services::plan::ExecutionPlan;

/// Reason used when the model leaves the REASON line blank
pub const NO_REASON_GIVEN: &str = "NO REASON GIVEN";

/// Which path produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionSource {
    Ai,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionResult {
    pub task_completed: bool,
    pub should_retry: bool,
    /// Upper-cased justification, never empty
    pub reason: String,
    pub source: ReflectionSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReflectionError {
    #[error("Plan is not evaluable: {pending} step(s) still pending")]
    InvalidPlan { pending: usize },
}

fn label_regex() -> Option<&'static Regex> {
    static LABELS: OnceLock<Option<Regex>> = OnceLock::new();
    LABELS
        .get_or_init(|| {
            // Tolerates list markers and bold markup around the label.
            Regex::new(r"(?im)^[\s>*#-]*(completed|reason|retry)\**\s*:\**[ \t]*(.*)$").ok()
        })
        .as_ref()
}

fn is_affirmative(value: &str) -> bool {
    let value = value.trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '`');
    let value = value.to_lowercase();
    value.starts_with("yes") || value.starts_with("true")
}

/// Parse the three-line verdict format, located anywhere in `text`.
///
/// Returns `None` unless all of COMPLETED, REASON and RETRY are present.
/// The first occurrence of each label wins.
pub fn parse_reflection_response(text: &str) -> Option<ReflectionResult> {
    let mut completed: Option<bool> = None;
    let mut reason: Option<String> = None;
    let mut retry: Option<bool> = None;

    for caps in label_regex()?.captures_iter(text) {
        let value = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        match caps[1].to_lowercase().as_str() {
            "completed" if completed.is_none() => completed = Some(is_affirmative(value)),
            "reason" if reason.is_none() => {
                let cleaned = value.trim().trim_matches('*').trim();
                reason = Some(cleaned.to_uppercase());
            }
            "retry" if retry.is_none() => retry = Some(is_affirmative(value)),
            _ => {}
        }
    }

    let task_completed = completed?;
    let reason = reason?;
    let should_retry = retry? && !task_completed;

    Some(ReflectionResult {
        task_completed,
        should_retry,
        reason: if reason.is_empty() {
            NO_REASON_GIVEN.to_string()
        } else {
            reason
        },
        source: ReflectionSource::Ai,
    })
}

/// Judges attempts
pub struct ReflectionEvaluator {
    provider: Option<Arc<dyn LlmProvider>>,
    settings: ReflectionSettings,
}

impl ReflectionEvaluator {
    /// `provider` is ignored when `settings.use_ai` is off.
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, settings: ReflectionSettings) -> Self {
        let provider = provider.filter(|_| settings.use_ai);
        Self { provider, settings }
    }

    /// Rule-based evaluator with no model access
    pub fn rule_based(settings: ReflectionSettings) -> Self {
        Self {
            provider: None,
            settings,
        }
    }

    pub fn settings(&self) -> &ReflectionSettings {
        &self.settings
    }

    /// Evaluate a settled plan.
    ///
    /// Errors only when the plan still holds pending steps. An empty plan is
    /// never sent to the model; it is always judged not completed.
    pub async fn evaluate_completion(
        &self,
        cancel: &CancellationToken,
        plan: &ExecutionPlan,
        task: &str,
    ) -> Result<ReflectionResult, ReflectionError> {
        let pending = plan.pending_count();
        if pending > 0 {
            return Err(ReflectionError::InvalidPlan { pending });
        }

        if plan.is_empty() {
            debug!("Empty plan, skipping model reflection");
            return Ok(self.fallback_evaluation(plan));
        }

        if let Some(provider) = &self.provider {
            if let Some(result) = self.ask_model(provider.as_ref(), cancel, plan, task).await {
                return Ok(result);
            }
        }

        Ok(self.fallback_evaluation(plan))
    }

    async fn ask_model(
        &self,
        provider: &dyn LlmProvider,
        cancel: &CancellationToken,
        plan: &ExecutionPlan,
        task: &str,
    ) -> Option<ReflectionResult> {
        let prompt = build_reflection_prompt(plan, task);
        let timeout = Duration::from_secs(self.settings.timeout_secs);

        let text = match tokio::time::timeout(timeout, provider.complete_prompt(cancel, &prompt))
            .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(error = %e, "Reflection call failed, using rule-based evaluation");
                return None;
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.settings.timeout_secs,
                    "Reflection call timed out, using rule-based evaluation"
                );
                return None;
            }
        };

        let parsed = parse_reflection_response(&text);
        if parsed.is_none() {
            warn!("Reflection response missing labels, using rule-based evaluation");
        }
        parsed
    }

    /// Deterministic verdict from the plan alone.
    pub fn fallback_evaluation(&self, plan: &ExecutionPlan) -> ReflectionResult {
        let completed = plan.completed_count();
        let total = plan.len();
        let rate = plan.success_rate();

        let (task_completed, should_retry, reason) =
            if plan.has_completed_step(ATTEMPT_COMPLETION_TOOL) && plan.failed_count() == 0 {
                (
                    true,
                    false,
                    "COMPLETION SIGNALLED WITH NO FAILED STEPS".to_string(),
                )
            } else if total > 0 && rate >= self.settings.completion_threshold {
                (
                    true,
                    false,
                    format!("{} OF {} STEPS SUCCEEDED", completed, total),
                )
            } else if total > 0 && rate >= self.settings.retry_threshold {
                (
                    false,
                    true,
                    format!(
                        "ONLY {} OF {} STEPS SUCCEEDED; ANOTHER ATTEMPT MAY FINISH THE TASK",
                        completed, total
                    ),
                )
            } else if total == 0 {
                (false, false, "NO TOOL CALLS WERE MADE".to_string())
            } else {
                (
                    false,
                    false,
                    format!("ONLY {} OF {} STEPS SUCCEEDED; NOT RETRYING", completed, total),
                )
            };

        debug!(rate, task_completed, should_retry, "Rule-based reflection");
        ReflectionResult {
            task_completed,
            should_retry,
            reason,
            source: ReflectionSource::Fallback,
        }
    }
}

/// Judgment prompt sent to the model.
pub fn build_reflection_prompt(plan: &ExecutionPlan, task: &str) -> String {
    format!(
        "You are reviewing the work of a coding agent. Decide whether the task below is \
         complete based on the tool calls it made.\n\n\
         ## Task\n{task}\n\n\
         ## Tool Calls\n{summary}\n\
         Answer with exactly these three lines and nothing else:\n\
         COMPLETED: yes|no\n\
         REASON: <one short sentence>\n\
         RETRY: yes|no\n\n\
         Answer RETRY: yes only if the task is not complete and another attempt is likely \
         to finish it.",
        task = task.trim(),
        summary = plan.summary(),
    )
}
