//! Core abstractions for the analysis pipeline
//!
//! This crate defines the capability contract every pluggable analyzer
//! implements, together with the opaque payload document analyzers exchange.

pub mod analyzer;
pub mod error;
pub mod payload;

pub use analyzer::Analyzer;
pub use error::{Error, Result};
pub use payload::Payload;

/// Cooperative cancellation signal handed to every analyzer invocation
pub use tokio_util::sync::CancellationToken;
