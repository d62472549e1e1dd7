//! Storage Layer
//!
//! JSON configuration file handling.

pub mod config;

pub use config::ConfigService;
