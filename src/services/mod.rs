//! Services
//!
//! Orchestration logic: plan tracking, reflection, prompt assembly and
//! the task session loop.

pub mod context;
pub mod plan;
pub mod prompt;
pub mod reflection;
pub mod session;

pub use context::AgentContext;
pub use plan::{ExecutionPlan, ExecutionStep, PlanError, StepId, StepStatus};
pub use prompt::{build_system_prompt, ContextSource, StaticContext};
pub use reflection::{ReflectionEvaluator, ReflectionResult, ReflectionSource};
pub use session::{TaskOutcome, TaskSession, TaskStatus};
