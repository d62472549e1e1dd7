//! Data Models
//!
//! Configuration structures shared by the CLI and the services.

pub mod settings;

pub use settings::{AppConfig, ReflectionSettings, SessionSettings};
