//! Integration Tests Module
//!
//! End-to-end tests against mock HTTP backends (wiremock) and on-disk
//! configuration (tempfile).

// Provider adapters over HTTP: retry, fallback and streaming
mod provider_http_test;

// Full task sessions driven by a mock backend
mod session_test;

// Config file loading and environment overrides
mod config_test;

// Shared mock backend helpers
mod support;
