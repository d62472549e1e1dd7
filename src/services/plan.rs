//! Execution Plan
//!
//! Append-only record of the tool invocations made during one attempt.
//! A step starts `Pending` and moves exactly once, to `Completed` or
//! `Failed`; any other transition is an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a step within its plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(usize);

impl StepId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step-{}", self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StepStatus::Pending)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One attempted tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: StepId,
    pub tool_name: String,
    pub status: StepStatus,
    /// Cause of failure, set only when `status` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Illegal plan mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Unknown plan step: {0}")]
    UnknownStep(StepId),

    #[error("Illegal transition for {id}: {from} -> {to}")]
    IllegalTransition {
        id: StepId,
        from: StepStatus,
        to: StepStatus,
    },
}

/// Steps of one attempt, in dispatch order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    steps: Vec<ExecutionStep>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new pending step.
    pub fn add_step(&mut self, tool_name: impl Into<String>) -> StepId {
        let id = StepId(self.steps.len());
        self.steps.push(ExecutionStep {
            id,
            tool_name: tool_name.into(),
            status: StepStatus::Pending,
            error: None,
        });
        id
    }

    pub fn complete_step(&mut self, id: StepId) -> Result<(), PlanError> {
        self.transition(id, StepStatus::Completed, None)
    }

    pub fn fail_step(&mut self, id: StepId, error: impl Into<String>) -> Result<(), PlanError> {
        self.transition(id, StepStatus::Failed, Some(error.into()))
    }

    fn transition(
        &mut self,
        id: StepId,
        to: StepStatus,
        error: Option<String>,
    ) -> Result<(), PlanError> {
        let step = self
            .steps
            .get_mut(id.0)
            .ok_or(PlanError::UnknownStep(id))?;
        if step.status != StepStatus::Pending {
            return Err(PlanError::IllegalTransition {
                id,
                from: step.status,
                to,
            });
        }
        step.status = to;
        step.error = error;
        Ok(())
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn step(&self, id: StepId) -> Option<&ExecutionStep> {
        self.steps.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn completed_count(&self) -> usize {
        self.count(StepStatus::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(StepStatus::Failed)
    }

    pub fn pending_count(&self) -> usize {
        self.count(StepStatus::Pending)
    }

    /// Completed steps over all steps; 0.0 for an empty plan.
    pub fn success_rate(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.completed_count() as f64 / self.steps.len() as f64
    }

    /// Whether a step for `tool_name` completed successfully
    pub fn has_completed_step(&self, tool_name: &str) -> bool {
        self.steps
            .iter()
            .any(|s| s.tool_name == tool_name && s.status == StepStatus::Completed)
    }

    /// Plain-text listing used in the reflection prompt.
    pub fn summary(&self) -> String {
        if self.steps.is_empty() {
            return "No tool calls were made.".to_string();
        }

        let mut out = format!(
            "{} steps: {} completed, {} failed, {} pending\n",
            self.len(),
            self.completed_count(),
            self.failed_count(),
            self.pending_count()
        );
        for step in &self.steps {
            out.push_str(&format!("{}. {} [{}]", step.id.0 + 1, step.tool_name, step.status));
            if let Some(error) = &step.error {
                out.push_str(&format!(" - {}", error));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_complete_steps() {
        let mut plan = ExecutionPlan::new();
        let read = plan.add_step("read_file");
        let write = plan.add_step("write_file");
        assert_eq!(plan.pending_count(), 2);

        plan.complete_step(read).unwrap();
        plan.fail_step(write, "permission denied").unwrap();

        assert_eq!(plan.completed_count(), 1);
        assert_eq!(plan.failed_count(), 1);
        assert_eq!(plan.step(write).unwrap().error.as_deref(), Some("permission denied"));
        assert_eq!(plan.success_rate(), 0.5);
    }

    #[test]
    fn test_terminal_steps_cannot_change() {
        let mut plan = ExecutionPlan::new();
        let id = plan.add_step("shell");
        plan.complete_step(id).unwrap();

        assert_eq!(
            plan.fail_step(id, "late failure"),
            Err(PlanError::IllegalTransition {
                id,
                from: StepStatus::Completed,
                to: StepStatus::Failed,
            })
        );
        assert!(plan.complete_step(id).is_err());
        assert_eq!(plan.step(id).unwrap().status, StepStatus::Completed);
        assert!(plan.step(id).unwrap().error.is_none());
    }

    #[test]
    fn test_unknown_step() {
        let mut plan = ExecutionPlan::new();
        let mut other = ExecutionPlan::new();
        other.add_step("a");
        let foreign = other.add_step("b");
        assert_eq!(
            plan.complete_step(foreign),
            Err(PlanError::UnknownStep(foreign))
        );
    }

    #[test]
    fn test_empty_plan_rate_is_zero() {
        let plan = ExecutionPlan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.success_rate(), 0.0);
        assert_eq!(plan.summary(), "No tool calls were made.");
    }

    #[test]
    fn test_has_completed_step() {
        let mut plan = ExecutionPlan::new();
        let a = plan.add_step("attempt_completion");
        assert!(!plan.has_completed_step("attempt_completion"));
        plan.complete_step(a).unwrap();
        assert!(plan.has_completed_step("attempt_completion"));
    }

    #[test]
    fn test_summary_lists_steps() {
        let mut plan = ExecutionPlan::new();
        let a = plan.add_step("read_file");
        let b = plan.add_step("shell");
        plan.complete_step(a).unwrap();
        plan.fail_step(b, "exit code 1").unwrap();

        let summary = plan.summary();
        assert!(summary.starts_with("2 steps: 1 completed, 1 failed, 0 pending"));
        assert!(summary.contains("1. read_file [completed]"));
        assert!(summary.contains("2. shell [failed] - exit code 1"));
        assert_eq!(StepId(1).to_string(), "step-2");
    }
}
