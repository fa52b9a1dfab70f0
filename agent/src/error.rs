//! Error types for the SessionTap Agent.
//!
//! Each module owns a focused error enum; [`AgentError`] aggregates them for
//! callers that drive the whole pipeline.

use thiserror::Error;

use crate::config::ConfigError;
use crate::delivery::DeliveryError;

/// Errors that can occur during agent operations.
///
/// Only [`AgentError::Config`] prevents a capture session from starting.
/// `Delivery` comes from building the HTTP client, and `Io`/`Json` from
/// loading a document with [`crate::content::load_document`]. Failures inside
/// a running session (delivery, snapshot) are recovered there and never
/// surface as an `AgentError`.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Batch transmission failed.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
