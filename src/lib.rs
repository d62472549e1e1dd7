//! Taskforge - Coding Agent Orchestration Core
//!
//! Drives a coding task against a language model:
//! - Provider adapters, retry and the textual tool fallback (`taskforge-llm`)
//! - Tool execution boundary (`taskforge-tools`)
//! - Execution plan tracking, reflection and the task session loop (`services`)
//! - Configuration file and environment overrides (`storage`, `models`)

pub mod logging;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::{AppConfig, ReflectionSettings, SessionSettings};
pub use services::{
    AgentContext, ExecutionPlan, ReflectionEvaluator, ReflectionResult, TaskOutcome, TaskSession,
    TaskStatus,
};
pub use storage::ConfigService;
pub use utils::error::{AppError, AppResult};
