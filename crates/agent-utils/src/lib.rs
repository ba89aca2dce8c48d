//! Shared utilities for the analysis pipeline
//!
//! This crate provides common functionality used across the workspace,
//! including logging setup and environment-driven configuration helpers.

pub mod config;
pub mod logging;

pub use config::{ConfigError, env_duration_secs, env_parse};
pub use logging::{init_test_tracing, init_tracing, init_tracing_json};
